use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// External capabilities a model may invoke mid-conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum ToolKind {
    #[strum(serialize = "web_search")]
    WebSearch,
    #[strum(serialize = "text_to_speech")]
    TextToSpeech,
    #[strum(serialize = "generate_image")]
    ImageGeneration,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::WebSearch => "web_search",
            ToolKind::TextToSpeech => "text_to_speech",
            ToolKind::ImageGeneration => "generate_image",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::WebSearch => {
                "Search the web for current information. Use for recent events or facts you are unsure about."
            }
            ToolKind::TextToSpeech => {
                "Convert text to spoken audio. Returns an audio data URL to include verbatim in the reply."
            }
            ToolKind::ImageGeneration => {
                "Generate an image from a text prompt. Returns an image data URL to include verbatim in the reply."
            }
        }
    }

    /// JSON schema of the tool's arguments.
    pub fn parameters(&self) -> Value {
        match self {
            ToolKind::WebSearch => json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "The search query" }
                },
                "required": ["query"]
            }),
            ToolKind::TextToSpeech => json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "The text to speak" }
                },
                "required": ["text"]
            }),
            ToolKind::ImageGeneration => json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "Description of the image" }
                },
                "required": ["prompt"]
            }),
        }
    }
}

/// A structured tool invocation returned by a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("missing argument '{0}'")]
    MissingArgument(&'static str),

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

impl ToolError {
    /// Read a required string argument.
    pub fn require_str<'a>(arguments: &'a Value, name: &'static str) -> Result<&'a str, ToolError> {
        arguments
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or(ToolError::MissingArgument(name))
    }
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// Run the tool. The returned text is fed back to the model as the tool result.
    async fn execute(&self, arguments: &Value) -> Result<String, ToolError>;
}

/// The set of tools with configured credentials.
#[derive(Clone, Default)]
pub struct ToolBox {
    executors: HashMap<ToolKind, Arc<dyn ToolExecutor>>,
}

impl ToolBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executors.insert(executor.kind(), executor);
        self
    }

    /// The subset of `wanted` that can actually run.
    pub fn available(&self, wanted: &[ToolKind]) -> Vec<ToolKind> {
        wanted
            .iter()
            .copied()
            .filter(|kind| self.executors.contains_key(kind))
            .collect()
    }

    /// Execute a call. Failures are reported back to the model as text, never raised.
    pub async fn dispatch(&self, call: &ToolCall) -> String {
        let Ok(kind) = call.name.parse::<ToolKind>() else {
            return format!("Error: unknown tool '{}'", call.name);
        };
        let Some(executor) = self.executors.get(&kind) else {
            return format!("Error: tool '{}' is not available", call.name);
        };

        match executor.execute(&call.arguments).await {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(tool = %kind, error = %err, "Tool execution failed");
                format!("Error: {} failed: {err}", kind.name())
            }
        }
    }
}
