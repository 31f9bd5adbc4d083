//! Token estimation and budget truncation.
//!
//! Uses a character-based heuristic: ~4 characters per token.
//! This approximation is accurate within ~10% for BPE tokenizers on English
//! text, which is good enough for budgeting. Deployments with a real
//! tokenizer plug it in as the authoritative [`TokenCounter::count`].

use async_trait::async_trait;
use switchyard_core::error::MemoryError;
use switchyard_core::memory::TokenCounter;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// The default counter: the heuristic for both the cheap and the
/// authoritative count.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

#[async_trait]
impl TokenCounter for HeuristicTokenCounter {
    async fn count(&self, text: &str) -> Result<usize, MemoryError> {
        Ok(estimate_tokens(text))
    }

    fn estimate(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}

/// Longest prefix of `text` (cut on a char boundary) that `measure` puts at or
/// under `budget`. Text that already fits is returned whole; anything else
/// comes back as a strict prefix, possibly empty.
///
/// `measure` must be monotone in prefix length.
pub fn truncate_to_budget(text: &str, budget: usize, measure: impl Fn(&str) -> usize) -> &str {
    if text.is_empty() || measure(text) <= budget {
        return text;
    }

    let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    // Invariant: the prefix of `lo` chars fits; the answer lies in [lo, hi].
    let (mut lo, mut hi) = (0, boundaries.len() - 1);
    while lo < hi {
        let mid = (lo + hi).div_ceil(2);
        if measure(&text[..boundaries[mid]]) <= budget {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    &text[..boundaries[lo]]
}
