use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{HaystackError, HaystackResult};

pub type TokenId = u32;

/// Text ↔ token codec. All sizing and positioning in a run is done in token
/// units, so an implementation must return the same ids for the same text for
/// as long as it lives.
///
/// `decode(encode(x))` is allowed to differ from `x` when the sequence was
/// sliced at an arbitrary token boundary.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> HaystackResult<Vec<TokenId>>;
    fn decode(&self, tokens: &[TokenId]) -> HaystackResult<String>;

    fn count(&self, text: &str) -> HaystackResult<usize> {
        Ok(self.encode(text)?.len())
    }
}

/// Splits text into alternating runs of whitespace and non-whitespace and
/// interns each distinct run. The vocabulary only grows, so ids handed out
/// earlier in a run stay valid.
pub struct WordTokenizer {
    vocab: RwLock<Vocab>,
}

#[derive(Default)]
struct Vocab {
    ids: HashMap<String, TokenId>,
    pieces: Vec<String>,
}

impl WordTokenizer {
    pub fn new() -> Self {
        Self {
            vocab: RwLock::new(Vocab::default()),
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.read().map(|v| v.pieces.len()).unwrap_or(0)
    }
}

impl Default for WordTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

fn split_runs(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;
    for (idx, ch) in text.char_indices() {
        let ws = ch.is_whitespace();
        match current {
            Some(prev) if prev != ws => {
                pieces.push(&text[start..idx]);
                start = idx;
            }
            _ => {}
        }
        current = Some(ws);
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

impl Tokenizer for WordTokenizer {
    fn encode(&self, text: &str) -> HaystackResult<Vec<TokenId>> {
        if let Some(pos) = text.find('\0') {
            return Err(HaystackError::Encoding(format!(
                "NUL character at byte {pos} cannot be tokenized"
            )));
        }

        let mut vocab = self
            .vocab
            .write()
            .map_err(|_| HaystackError::Encoding("vocabulary lock poisoned".into()))?;
        let mut out = Vec::new();
        for piece in split_runs(text) {
            let id = match vocab.ids.get(piece) {
                Some(id) => *id,
                None => {
                    let id = TokenId::try_from(vocab.pieces.len())
                        .map_err(|_| HaystackError::Encoding("vocabulary overflow".into()))?;
                    vocab.ids.insert(piece.to_string(), id);
                    vocab.pieces.push(piece.to_string());
                    id
                }
            };
            out.push(id);
        }
        Ok(out)
    }

    fn decode(&self, tokens: &[TokenId]) -> HaystackResult<String> {
        let vocab = self
            .vocab
            .read()
            .map_err(|_| HaystackError::Encoding("vocabulary lock poisoned".into()))?;
        let mut out = String::new();
        for id in tokens {
            let piece = vocab
                .pieces
                .get(*id as usize)
                .ok_or_else(|| HaystackError::Encoding(format!("unknown token id {id}")))?;
            out.push_str(piece);
        }
        Ok(out)
    }
}
