//! Deterministic token estimation for usage metering.
//!
//! The exact path uses the cl100k BPE. If the tokenizer cannot be loaded, or
//! encoding panics, the estimate degrades to `ceil(chars / 4)`. Estimation never fails.

use std::panic::{AssertUnwindSafe, catch_unwind};

use once_cell::sync::Lazy;
use switchboard_types::{ChatMessage, Usage};
use tiktoken_rs::CoreBPE;

static BPE: Lazy<Option<CoreBPE>> = Lazy::new(|| match tiktoken_rs::cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(err) => {
        tracing::warn!(error = %err, "Tokenizer unavailable, using length-based estimates");
        None
    }
});

/// Tokenizers take a moment to build; load it at startup, outside the request path.
pub fn preload() {
    Lazy::force(&BPE);
}

pub fn estimate(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }

    let exact = BPE.as_ref().and_then(|bpe| {
        catch_unwind(AssertUnwindSafe(|| bpe.encode_with_special_tokens(text).len())).ok()
    });
    let count = exact.unwrap_or_else(|| fallback_estimate(text));

    u32::try_from(count).unwrap_or(u32::MAX)
}

/// `ceil(chars / 4)`.
pub fn fallback_estimate(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Prompt tokens of a history: the sum over message contents.
pub fn estimate_messages(messages: &[ChatMessage]) -> u32 {
    messages
        .iter()
        .fold(0u32, |acc, m| acc.saturating_add(estimate(&m.content)))
}

pub fn usage_for(messages: &[ChatMessage], reply: &str) -> Usage {
    Usage::new(estimate_messages(messages), estimate(reply))
}
