//! Scripted stand-ins for vendors and tools.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use serde_json::Value;
use switchboard_types::ChatMessage;

use crate::application::{
    ports::{
        provider::{ChatOptions, ChatReply, ProviderAdapter, ProviderError, TextStream},
        tools::{ToolError, ToolExecutor, ToolKind},
    },
    tool_loop::{ModelTurn, Turn, TurnDriver},
};

// ============================================================================
// ScriptedProvider
// ============================================================================

#[derive(Clone)]
enum Script {
    Reply(String),
    Stream(Vec<String>),
    Fail(ProviderError),
    StreamThenFail(Vec<String>, ProviderError),
    /// One chunk, then silence.
    Stall(String),
}

/// Provider adapter with a fixed behaviour. Clones share call records.
#[derive(Clone)]
pub struct ScriptedProvider {
    script: Script,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    last_history: Arc<Mutex<Option<Vec<ChatMessage>>>>,
    last_options: Arc<Mutex<Option<ChatOptions>>>,
}

impl ScriptedProvider {
    fn scripted(script: Script) -> Self {
        Self {
            script,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            last_history: Arc::new(Mutex::new(None)),
            last_options: Arc::new(Mutex::new(None)),
        }
    }

    /// Answers every chat call with `reply`. Cannot stream.
    pub fn replying(reply: &str) -> Self {
        Self::scripted(Script::Reply(reply.to_string()))
    }

    /// Streams `chunks`; a chat call answers with their concatenation.
    pub fn streaming<const N: usize>(chunks: [&str; N]) -> Self {
        Self::scripted(Script::Stream(chunks.iter().map(|c| c.to_string()).collect()))
    }

    pub fn failing(err: ProviderError) -> Self {
        Self::scripted(Script::Fail(err))
    }

    pub fn streaming_then_fail<const N: usize>(chunks: [&str; N], err: ProviderError) -> Self {
        Self::scripted(Script::StreamThenFail(
            chunks.iter().map(|c| c.to_string()).collect(),
            err,
        ))
    }

    pub fn stalling(first_chunk: &str) -> Self {
        Self::scripted(Script::Stall(first_chunk.to_string()))
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_history(&self) -> Option<Vec<ChatMessage>> {
        self.last_history.lock().unwrap().clone()
    }

    pub fn last_options(&self) -> Option<ChatOptions> {
        *self.last_options.lock().unwrap()
    }

    async fn record(&self, history: &[ChatMessage], options: &ChatOptions) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_history.lock().unwrap() = Some(history.to_vec());
        *self.last_options.lock().unwrap() = Some(*options);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn provider(&self) -> &str {
        "Scripted"
    }

    async fn chat(
        &self,
        history: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatReply, ProviderError> {
        self.record(history, options).await;
        match &self.script {
            Script::Reply(reply) => Ok(ChatReply {
                reply: reply.clone(),
            }),
            Script::Stream(chunks) => Ok(ChatReply {
                reply: chunks.concat(),
            }),
            Script::Fail(err) | Script::StreamThenFail(_, err) => Err(err.clone()),
            Script::Stall(_) => futures::future::pending().await,
        }
    }

    async fn chat_stream(
        &self,
        history: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<TextStream, ProviderError> {
        self.record(history, options).await;
        match &self.script {
            Script::Stream(chunks) => Ok(Box::pin(stream::iter(
                chunks.clone().into_iter().map(Ok::<String, ProviderError>),
            ))),
            Script::StreamThenFail(chunks, err) => {
                let items: Vec<Result<String, ProviderError>> = chunks
                    .iter()
                    .cloned()
                    .map(Ok)
                    .chain(std::iter::once(Err(err.clone())))
                    .collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Script::Stall(first) => Ok(Box::pin(
                stream::once(futures::future::ready(Ok::<String, ProviderError>(first.clone())))
                    .chain(stream::pending()),
            )),
            Script::Reply(_) => Err(ProviderError::StreamingUnsupported),
            Script::Fail(err) => Err(err.clone()),
        }
    }

    fn supports_streaming(&self) -> bool {
        matches!(
            self.script,
            Script::Stream(_) | Script::StreamThenFail(..) | Script::Stall(_)
        )
    }
}

// ============================================================================
// ScriptedTurns
// ============================================================================

/// Turn driver that replays a fixed list of model turns.
pub struct ScriptedTurns {
    script: Mutex<VecDeque<ModelTurn>>,
    repeat: Option<Result<ModelTurn, ProviderError>>,
    submissions: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedTurns {
    pub fn new(turns: Vec<ModelTurn>) -> Self {
        Self {
            script: Mutex::new(turns.into()),
            repeat: None,
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Answer every submission with the same turn.
    pub fn repeating(turn: ModelTurn) -> Self {
        Self {
            repeat: Some(Ok(turn)),
            ..Self::new(Vec::new())
        }
    }

    pub fn failing(err: ProviderError) -> Self {
        Self {
            repeat: Some(Err(err)),
            ..Self::new(Vec::new())
        }
    }

    /// The conversation as it was at each submission.
    pub fn submissions(&self) -> Vec<Vec<Turn>> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl TurnDriver for ScriptedTurns {
    async fn next_turn(&self, conversation: &[Turn]) -> Result<ModelTurn, ProviderError> {
        self.submissions.lock().unwrap().push(conversation.to_vec());

        if let Some(turn) = self.script.lock().unwrap().pop_front() {
            return Ok(turn);
        }
        match &self.repeat {
            Some(outcome) => outcome.clone(),
            None => Err(ProviderError::invalid_response("script exhausted")),
        }
    }
}

// ============================================================================
// EchoTool
// ============================================================================

/// Tool that echoes its required argument back.
pub struct EchoTool {
    kind: ToolKind,
    calls: AtomicUsize,
}

impl EchoTool {
    pub fn new(kind: ToolKind) -> Self {
        Self {
            kind,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolExecutor for EchoTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    async fn execute(&self, arguments: &Value) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let arg = match self.kind {
            ToolKind::WebSearch => "query",
            ToolKind::TextToSpeech => "text",
            ToolKind::ImageGeneration => "prompt",
        };
        let value = ToolError::require_str(arguments, arg)?;
        Ok(format!("{} result for: {value}", self.kind.name()))
    }
}
