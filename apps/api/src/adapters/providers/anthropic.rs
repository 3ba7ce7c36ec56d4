//! Anthropic Messages API.

use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use switchboard_types::{ChatMessage, Role};
use url::Url;

use super::openai_compat::join_path;
use crate::application::ports::provider::{
    ChatOptions, ChatReply, ProviderAdapter, ProviderError, TextStream,
};
use crate::application::ports::tools::{ToolBox, ToolCall, ToolKind};
use crate::application::tool_loop::{ModelTurn, ToolLoop, Turn, TurnDriver};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
/// `max_tokens` is mandatory on this API.
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Clone)]
pub struct AnthropicAdapter {
    client: Client,
    endpoint: Url,
    api_key: SecretString,
    model: String,
    streaming: bool,
    tools: ToolBox,
    tool_kinds: Vec<ToolKind>,
    max_tool_rounds: u32,
}

impl AnthropicAdapter {
    /// `base_url` is the API root, e.g. `https://api.anthropic.com/v1`.
    pub fn new(
        client: Client,
        base_url: &Url,
        api_key: SecretString,
        model: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            endpoint: join_path(base_url, "messages")?,
            api_key,
            model: model.into(),
            streaming: false,
            tools: ToolBox::new(),
            tool_kinds: Vec::new(),
            max_tool_rounds: 1,
        })
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_tools(mut self, tools: ToolBox, wanted: &[ToolKind], max_rounds: u32) -> Self {
        self.tool_kinds = tools.available(wanted);
        self.tools = tools;
        self.max_tool_rounds = max_rounds;
        self
    }

    fn request_body(&self, conversation: &[Turn], options: &ChatOptions, stream: bool) -> Value {
        let (system, messages) = split_system(conversation);

        let mut body = Map::new();
        body.insert("model".into(), json!(self.model));
        body.insert(
            "max_tokens".into(),
            json!(options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        );
        body.insert("messages".into(), Value::Array(messages));
        if let Some(system) = system {
            body.insert("system".into(), json!(system));
        }
        if let Some(temperature) = options.temperature {
            // Anthropic accepts 0..=1.
            body.insert("temperature".into(), json!(temperature.min(1.0)));
        }
        if stream {
            body.insert("stream".into(), Value::Bool(true));
        } else if !self.tool_kinds.is_empty() {
            let tools: Vec<Value> = self
                .tool_kinds
                .iter()
                .map(|kind| {
                    json!({
                        "name": kind.name(),
                        "description": kind.description(),
                        "input_schema": kind.parameters(),
                    })
                })
                .collect();
            body.insert("tools".into(), Value::Array(tools));
        }
        Value::Object(body)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &text));
        }

        Ok(response)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider(&self) -> &str {
        "anthropic"
    }

    async fn chat(
        &self,
        history: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatReply, ProviderError> {
        let driver = AnthropicTurns {
            adapter: self,
            options,
        };
        let reply = ToolLoop::new(&self.tools, self.max_tool_rounds)
            .run(&driver, history)
            .await?;
        Ok(ChatReply { reply })
    }

    async fn chat_stream(
        &self,
        history: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<TextStream, ProviderError> {
        if !self.streaming {
            return Err(ProviderError::StreamingUnsupported);
        }

        let conversation: Vec<Turn> = history.iter().cloned().map(Turn::Message).collect();
        let body = self.request_body(&conversation, options, true);
        let response = self.post(&body).await?;

        let mut events = response.bytes_stream().eventsource();
        Ok(Box::pin(try_stream! {
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| ProviderError::invalid_response(e.to_string()))?;
                match event.event.as_str() {
                    "message_stop" => break,
                    "error" => {
                        Err(stream_error(&event.data))?;
                    }
                    "content_block_delta" => {
                        let delta: BlockDelta = serde_json::from_str(&event.data)
                            .map_err(|e| ProviderError::invalid_response(format!("bad stream event: {e}")))?;
                        if let Some(text) = delta.delta.text {
                            yield text;
                        }
                    }
                    _ => {}
                }
            }
        }))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }
}

struct AnthropicTurns<'a> {
    adapter: &'a AnthropicAdapter,
    options: &'a ChatOptions,
}

#[async_trait]
impl TurnDriver for AnthropicTurns<'_> {
    async fn next_turn(&self, conversation: &[Turn]) -> Result<ModelTurn, ProviderError> {
        let body = self.adapter.request_body(conversation, self.options, false);
        let response = self.adapter.post(&body).await?;

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(e.to_string()))?;

        let mut text = String::new();
        let mut calls = Vec::new();
        for block in message.content {
            match block {
                ContentBlock::Text { text: part } => text.push_str(&part),
                ContentBlock::ToolUse { id, name, input } => calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                ContentBlock::Other => {}
            }
        }

        if calls.is_empty() {
            return Ok(ModelTurn::Answer(text));
        }

        Ok(ModelTurn::ToolCalls {
            text: (!text.is_empty()).then_some(text),
            calls,
        })
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct BlockDelta {
    delta: DeltaBody,
}

#[derive(Deserialize)]
struct DeltaBody {
    text: Option<String>,
}

#[derive(Deserialize)]
struct StreamErrorEvent {
    error: StreamErrorBody,
}

#[derive(Deserialize)]
struct StreamErrorBody {
    #[serde(rename = "type")]
    kind: String,
}

/// Mid-stream errors carry no HTTP status; recover it from the error type.
fn stream_error(data: &str) -> ProviderError {
    let status = match serde_json::from_str::<StreamErrorEvent>(data) {
        Ok(event) if event.error.kind == "rate_limit_error" => 429,
        Ok(event) if event.error.kind == "billing_error" => 402,
        _ => 500,
    };
    ProviderError::from_status(status, data)
}

/// System prompts go in a separate field; consecutive tool results are
/// merged into one user message so roles keep alternating.
fn split_system(conversation: &[Turn]) -> (Option<String>, Vec<Value>) {
    let mut system: Vec<&str> = Vec::new();
    let mut messages: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    for turn in conversation {
        if !matches!(turn, Turn::ToolResult { .. }) && !pending_results.is_empty() {
            messages.push(json!({ "role": "user", "content": std::mem::take(&mut pending_results) }));
        }

        match turn {
            Turn::Message(message) if message.role == Role::System => {
                system.push(&message.content);
            }
            Turn::Message(message) => {
                messages.push(json!({ "role": message.role, "content": message.content }));
            }
            Turn::ToolCalls { text, calls } => {
                let mut content = Vec::with_capacity(calls.len() + 1);
                if let Some(text) = text {
                    content.push(json!({ "type": "text", "text": text }));
                }
                content.extend(calls.iter().map(|call| {
                    json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    })
                }));
                messages.push(json!({ "role": "assistant", "content": content }));
            }
            Turn::ToolResult {
                call_id, content, ..
            } => {
                pending_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": content,
                }));
            }
        }
    }

    if !pending_results.is_empty() {
        messages.push(json!({ "role": "user", "content": pending_results }));
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, messages)
}
