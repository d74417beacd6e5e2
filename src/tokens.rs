//! Token counting and budget truncation with the `cl100k_base` encoding.
//!
//! Budgets are advisory: callers truncate their input before sending, the
//! chat endpoint itself is never consulted.

use anyhow::{anyhow, Result};
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

fn encoding() -> Result<&'static CoreBPE> {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    if let Some(bpe) = BPE.get() {
        return Ok(bpe);
    }
    let bpe = tiktoken_rs::cl100k_base().map_err(|e| anyhow!("cl100k_base unavailable: {}", e))?;
    Ok(BPE.get_or_init(|| bpe))
}

/// Number of tokens in `text`.
pub fn count_tokens(text: &str) -> Result<usize> {
    Ok(encoding()?.encode_ordinary(text).len())
}

/// Returns the longest decodable prefix of `text`'s tokenization that
/// re-encodes to at most `limit` tokens.
///
/// A cut can land inside a multi-byte character (the prefix fails to decode)
/// or re-encode to more tokens than it was cut at; both shrink the prefix.
pub fn truncate_to_token_limit(text: &str, limit: usize) -> Result<String> {
    let bpe = encoding()?;
    let tokens = bpe.encode_ordinary(text);
    if tokens.len() <= limit {
        return Ok(text.to_string());
    }

    let mut end = limit;
    while end > 0 {
        if let Ok(decoded) = bpe.decode(tokens[..end].to_vec()) {
            if bpe.encode_ordinary(&decoded).len() <= limit {
                return Ok(decoded);
            }
        }
        end -= 1;
    }
    Ok(String::new())
}

/// Counts `text` and truncates it to `budget` when it is over.
///
/// Returns the (possibly shortened) text and its token count.
pub fn fit_to_budget(text: &str, budget: usize) -> Result<(String, usize)> {
    let count = count_tokens(text)?;
    if count <= budget {
        return Ok((text.to_string(), count));
    }
    tracing::warn!(tokens = count, budget, "content over token budget, truncating");
    let truncated = truncate_to_token_limit(text, budget)?;
    let kept = count_tokens(&truncated)?;
    Ok((truncated, kept))
}
