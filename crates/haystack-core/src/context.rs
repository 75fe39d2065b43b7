//! Token-level context construction: window sampling and needle injection.
//!
//! Both operations are pure over their arguments. The only shared state is
//! the random source, which the caller passes in explicitly.

use rand::Rng;

use crate::error::{HaystackError, HaystackResult};
use crate::tokenizer::TokenId;

/// Pick a contiguous window of `size` tokens uniformly among all valid start
/// offsets. A haystack no longer than `size` is returned whole, and then the
/// rng is left untouched.
pub fn sample<R: Rng + ?Sized>(haystack: &[TokenId], size: usize, rng: &mut R) -> Vec<TokenId> {
    let start = window_start(haystack.len(), size, rng);
    haystack[start..start + size.min(haystack.len())].to_vec()
}

/// Start offset `sample` would use for a `size`-token window over a haystack
/// of `haystack_len` tokens. Draws from `rng` exactly as `sample` does, so a
/// caller can replay skipped cells without building their windows.
pub fn window_start<R: Rng + ?Sized>(haystack_len: usize, size: usize, rng: &mut R) -> usize {
    if size >= haystack_len {
        return 0;
    }
    rng.gen_range(0..=haystack_len - size)
}

/// A context window with the needle spliced in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedContext {
    pub tokens: Vec<TokenId>,
    /// Token offset where the needle starts.
    pub insert_index: usize,
}

impl InjectedContext {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Insert `needle` at `floor(depth * len(window))` and trim the result back to
/// the window length.
///
/// The insert index is capped at `len(window) - len(needle)` so the trim only
/// ever drops window tokens: the needle always survives intact, and at
/// `depth = 1.0` it fills the last `len(needle)` tokens.
pub fn inject(
    window: &[TokenId],
    needle: &[TokenId],
    depth: f64,
) -> HaystackResult<InjectedContext> {
    if needle.len() > window.len() {
        return Err(HaystackError::NeedleTooLarge {
            needle: needle.len(),
            window: window.len(),
        });
    }
    if !depth.is_finite() {
        return Err(HaystackError::Config(format!("invalid depth {depth}")));
    }

    let nominal = (depth.clamp(0.0, 1.0) * window.len() as f64).floor() as usize;
    let insert_index = nominal.min(window.len() - needle.len());

    let mut tokens = Vec::with_capacity(window.len() + needle.len());
    tokens.extend_from_slice(&window[..insert_index]);
    tokens.extend_from_slice(needle);
    tokens.extend_from_slice(&window[insert_index..]);
    tokens.truncate(window.len());

    Ok(InjectedContext {
        tokens,
        insert_index,
    })
}
