use async_trait::async_trait;
use switchboard_types::ChatMessage;

use crate::application::ports::provider::{
    ChatOptions, ChatReply, ProviderAdapter, ProviderError, TextStream,
};

/// Stands in for a vendor whose credentials are missing. Every call fails.
#[derive(Debug, Clone)]
pub struct UnconfiguredAdapter {
    provider: String,
    streaming: bool,
}

impl UnconfiguredAdapter {
    /// `streaming` mirrors the catalog entry so validation answers the same
    /// way whether or not the vendor is configured.
    pub fn new(provider: impl Into<String>, streaming: bool) -> Self {
        Self {
            provider: provider.into(),
            streaming,
        }
    }
}

#[async_trait]
impl ProviderAdapter for UnconfiguredAdapter {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn chat(
        &self,
        _history: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<ChatReply, ProviderError> {
        Err(ProviderError::NotConfigured(self.provider.clone()))
    }

    async fn chat_stream(
        &self,
        _history: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<TextStream, ProviderError> {
        Err(ProviderError::NotConfigured(self.provider.clone()))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }
}
