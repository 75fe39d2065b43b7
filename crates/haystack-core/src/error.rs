use thiserror::Error;

use crate::client::ClientError;

#[derive(Debug, Error)]
pub enum HaystackError {
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("needle ({needle} tokens) does not fit in a {window}-token window")]
    NeedleTooLarge { needle: usize, window: usize },

    #[error("backend error: {0}")]
    Backend(ClientError),

    #[error("gave up after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: ClientError },

    #[error("store error: {0}")]
    Store(String),

    #[error("corrupt result batch: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("run cancelled after {completed} cells")]
    Cancelled { completed: usize },
}

impl HaystackError {
    /// Errors that end a run no matter the failure policy. A permanent
    /// backend rejection (bad key, unknown model) would fail every cell.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ExhaustedRetries { .. })
    }
}

pub type HaystackResult<T> = Result<T, HaystackError>;
