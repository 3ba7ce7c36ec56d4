//! OpenAI chat-completions wire format.
//!
//! Serves OpenAI itself and every vendor exposing the same endpoint shape
//! (Gemini's OpenAI endpoint, Groq, Cloudflare Workers AI).

use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use switchboard_types::ChatMessage;
use url::Url;

use crate::application::ports::provider::{
    ChatOptions, ChatReply, ProviderAdapter, ProviderError, TextStream,
};
use crate::application::ports::tools::{ToolBox, ToolCall, ToolKind};
use crate::application::tool_loop::{ModelTurn, ToolLoop, Turn, TurnDriver};

#[derive(Clone)]
pub struct OpenAiCompatAdapter {
    client: Client,
    provider: String,
    endpoint: Url,
    api_key: SecretString,
    model: String,
    streaming: bool,
    tools: ToolBox,
    tool_kinds: Vec<ToolKind>,
    max_tool_rounds: u32,
}

impl OpenAiCompatAdapter {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(
        client: Client,
        provider: impl Into<String>,
        base_url: &Url,
        api_key: SecretString,
        model: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            provider: provider.into(),
            endpoint: join_path(base_url, "chat/completions")?,
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

    /// Advertise the tools of `wanted` that `tools` can actually run.
    pub fn with_tools(mut self, tools: ToolBox, wanted: &[ToolKind], max_rounds: u32) -> Self {
        self.tool_kinds = tools.available(wanted);
        self.tools = tools;
        self.max_tool_rounds = max_rounds;
        self
    }

    fn request_body(&self, messages: Vec<Value>, options: &ChatOptions, stream: bool) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), json!(self.model));
        body.insert("messages".into(), Value::Array(messages));
        if let Some(temperature) = options.temperature {
            body.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = options.max_tokens {
            body.insert("max_tokens".into(), json!(max_tokens));
        }
        if stream {
            body.insert("stream".into(), Value::Bool(true));
        } else if !self.tool_kinds.is_empty() {
            let tools: Vec<Value> = self
                .tool_kinds
                .iter()
                .map(|kind| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": kind.name(),
                            "description": kind.description(),
                            "parameters": kind.parameters(),
                        }
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
            .bearer_auth(self.api_key.expose_secret())
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
impl ProviderAdapter for OpenAiCompatAdapter {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn chat(
        &self,
        history: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatReply, ProviderError> {
        let driver = OpenAiTurns {
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

        let messages = history.iter().map(message_json).collect();
        let body = self.request_body(messages, options, true);
        let response = self.post(&body).await?;

        let mut events = response.bytes_stream().eventsource();
        Ok(Box::pin(try_stream! {
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| ProviderError::invalid_response(e.to_string()))?;
                let data = event.data.trim();
                if data == "[DONE]" {
                    break;
                }
                if data.is_empty() {
                    continue;
                }

                let chunk: StreamChunk = serde_json::from_str(data)
                    .map_err(|e| ProviderError::invalid_response(format!("bad stream chunk: {e}")))?;
                if let Some(error) = chunk.error {
                    Err(ProviderError::Upstream { status: None, message: error.message })?;
                }
                if let Some(text) = chunk
                    .choices
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta)
                    .and_then(|delta| delta.content)
                {
                    yield text;
                }
            }
        }))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }
}

/// One synchronous completion request per model submission of the tool loop.
struct OpenAiTurns<'a> {
    adapter: &'a OpenAiCompatAdapter,
    options: &'a ChatOptions,
}

#[async_trait]
impl TurnDriver for OpenAiTurns<'_> {
    async fn next_turn(&self, conversation: &[Turn]) -> Result<ModelTurn, ProviderError> {
        let messages = conversation.iter().map(turn_json).collect();
        let body = self.adapter.request_body(messages, self.options, false);
        let response = self.adapter.post(&body).await?;

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(e.to_string()))?;
        let message = completion
            .choices
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ProviderError::invalid_response("no choices in completion"))?;

        let tool_calls = message.tool_calls.unwrap_or_default();
        if tool_calls.is_empty() {
            return Ok(ModelTurn::Answer(message.content.unwrap_or_default()));
        }

        let calls = tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| Value::Object(Map::new())),
            })
            .collect();

        Ok(ModelTurn::ToolCalls {
            text: message.content.filter(|t| !t.is_empty()),
            calls,
        })
    }
}

// ============================================================================
// Wire Types
// ============================================================================

// Some OpenAI-compatible backends send explicit nulls for empty lists, so
// every optional collection is an `Option`.

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Option<Vec<ResponseChoice>>,
}

#[derive(Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Option<Vec<StreamChoice>>,
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    message: String,
}

fn message_json(message: &ChatMessage) -> Value {
    json!({ "role": message.role, "content": message.content })
}

fn turn_json(turn: &Turn) -> Value {
    match turn {
        Turn::Message(message) => message_json(message),
        Turn::ToolCalls { text, calls } => json!({
            "role": "assistant",
            "content": text,
            "tool_calls": calls
                .iter()
                .map(|call| json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    }
                }))
                .collect::<Vec<_>>(),
        }),
        Turn::ToolResult {
            call_id,
            name,
            content,
        } => json!({
            "role": "tool",
            "tool_call_id": call_id,
            "name": name,
            "content": content,
        }),
    }
}

/// Append `path` to `base` keeping whatever path `base` already has.
pub(crate) fn join_path(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut root = base.clone();
    if !root.path().ends_with('/') {
        let with_slash = format!("{}/", root.path());
        root.set_path(&with_slash);
    }
    root.join(path)
}
