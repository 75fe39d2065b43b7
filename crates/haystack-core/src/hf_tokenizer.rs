use std::path::Path;

use hf_hub::api::sync::Api;

use crate::error::{HaystackError, HaystackResult};
use crate::tokenizer::{TokenId, Tokenizer};

/// BPE tokenizer backed by a HuggingFace `tokenizer.json`.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> HaystackResult<Self> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            HaystackError::Config(format!("cannot load tokenizer {}: {e}", path.display()))
        })?;
        Ok(Self { inner })
    }

    /// Fetch `tokenizer.json` from a Hub repository (cached locally by hf-hub).
    pub fn from_hub(repo: &str) -> HaystackResult<Self> {
        let api = Api::new().map_err(|e| HaystackError::Config(format!("hf-hub init: {e}")))?;
        let path = api
            .model(repo.to_string())
            .get("tokenizer.json")
            .map_err(|e| HaystackError::Config(format!("cannot fetch tokenizer for {repo}: {e}")))?;
        Self::from_file(&path)
    }
}

impl Tokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> HaystackResult<Vec<TokenId>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| HaystackError::Encoding(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[TokenId]) -> HaystackResult<String> {
        self.inner
            .decode(tokens, false)
            .map_err(|e| HaystackError::Encoding(e.to_string()))
    }
}
