use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use switchboard_types::ChatMessage;
use thiserror::Error;

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Failure of a provider call, classified into three tiers:
/// rate limit, quota, and everything else.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Upstream rate limit reached: {0}")]
    RateLimited(String),

    #[error("Upstream quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("Provider '{0}' is not configured")]
    NotConfigured(String),

    #[error("Streaming is not supported by this provider")]
    StreamingUnsupported,

    #[error("Upstream request timed out after {0}s")]
    Timeout(u64),

    #[error("Upstream error: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },
}

const MAX_ERROR_BODY_LEN: usize = 300;

impl ProviderError {
    /// Classify a non-success vendor response.
    ///
    /// 402 and any "insufficient quota" code are quota errors (vendors often send
    /// those with a 429), a remaining 429 is a rate limit, anything else passes through.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = upstream_message(body);
        let lowered = body.to_ascii_lowercase();
        let quota_code =
            lowered.contains("insufficient_quota") || lowered.contains("insufficient quota");

        if status == 402 || quota_code {
            ProviderError::QuotaExceeded(message)
        } else if status == 429 {
            ProviderError::RateLimited(message)
        } else {
            ProviderError::Upstream {
                status: Some(status),
                message,
            }
        }
    }

    /// Transport-level failure (connect, TLS, body decode).
    pub fn transport(err: reqwest::Error) -> Self {
        ProviderError::Upstream {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }

    pub fn invalid_response(detail: impl Into<String>) -> Self {
        ProviderError::Upstream {
            status: None,
            message: detail.into(),
        }
    }
}

/// Pull `error.message` (OpenAI, Anthropic, Gemini) out of a vendor error body,
/// falling back to the truncated raw body.
fn upstream_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        v.get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    });

    from_json.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.len() > MAX_ERROR_BODY_LEN {
            let mut end = MAX_ERROR_BODY_LEN;
            while !trimmed.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &trimmed[..end])
        } else {
            trimmed.to_string()
        }
    })
}

// ============================================================================
// Port Types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub reply: String,
}

/// Text deltas of a streaming completion. Dropping the stream releases the
/// upstream connection.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

// ============================================================================
// Port Trait
// ============================================================================

/// Translation layer from a normalized chat history to one vendor's API.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Human-readable provider label (e.g. "Anthropic").
    fn provider(&self) -> &str;

    async fn chat(
        &self,
        history: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatReply, ProviderError>;

    async fn chat_stream(
        &self,
        _history: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<TextStream, ProviderError> {
        Err(ProviderError::StreamingUnsupported)
    }

    fn supports_streaming(&self) -> bool {
        false
    }
}
