pub mod client;
pub mod context;
pub mod error;
pub mod grid;
#[cfg(feature = "hf-tokenizer")]
pub mod hf_tokenizer;
pub mod prompt;
pub mod result;
pub mod retry;
pub mod runner;
pub mod scorer;
pub mod store;
pub mod tokenizer;

pub use client::{ClientError, ModelClient};
pub use context::{inject, sample, InjectedContext};
pub use error::{HaystackError, HaystackResult};
pub use grid::{DepthSpacing, Grid, TestCell};
#[cfg(feature = "hf-tokenizer")]
pub use hf_tokenizer::HfTokenizer;
pub use prompt::{PromptLayout, PromptTemplate};
pub use result::{ResultBatch, TestResult};
pub use retry::{RetryPolicy, RetryStats, RetryingClient, Sleeper, ThreadSleeper};
pub use runner::{CancelFlag, FailurePolicy, Progress, RunConfig, RunSummary, Runner};
pub use scorer::{ScoreSummary, Scorer};
pub use store::{MemoryResultStore, ResultStore};
pub use tokenizer::{TokenId, Tokenizer, WordTokenizer};
