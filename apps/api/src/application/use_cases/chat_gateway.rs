use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde_json::Value;
use switchboard_types::{ChatCompletion, ChatCompletionChunk, ChatMessage, ErrorEnvelope, Role};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::model_registry::{ModelEntry, ModelRegistry};
use crate::application::persona::with_persona;
use crate::application::ports::provider::{ChatOptions, ProviderAdapter, ProviderError};
use crate::application::token_estimator::usage_for;
use crate::application::use_cases::api_key::{ApiKeyUseCases, KeyVerification};
use crate::application::use_cases::model_access::ModelAccessUseCases;
use crate::application::use_cases::usage::UsageLedger;
use crate::domain::entities::{api_key::ApiKey, request_log::NewRequestLog};

/// Status recorded when the client goes away mid-stream.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;
const UNKNOWN_MODEL: &str = "unknown";
const STREAM_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct GatewaySettings {
    /// Bound on a synchronous vendor call and on opening a stream.
    pub vendor_timeout: Duration,
    /// Bound on the wait for each streamed chunk.
    pub stream_idle_timeout: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            vendor_timeout: Duration::from_secs(60),
            stream_idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Caller details recorded in the request log.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub endpoint: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(ChatCompletionChunk),
    /// Terminal. No `Done` follows an error.
    Error(ErrorEnvelope),
    Done,
}

#[derive(Debug)]
pub enum Completion {
    Full(ChatCompletion),
    Stream(ReceiverStream<StreamEvent>),
}

/// A request body that passed validation.
#[derive(Debug, Clone)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    options: ChatOptions,
    stream: bool,
}

enum StreamEnd {
    Completed,
    Failed(ProviderError),
    Disconnected,
}

struct StreamJob {
    key: ApiKey,
    model: String,
    adapter: Arc<dyn ProviderAdapter>,
    messages: Vec<ChatMessage>,
    history: Vec<ChatMessage>,
    options: ChatOptions,
    meta: RequestMeta,
    id: String,
    created: i64,
    started: Instant,
}

/// `POST /v1/chat/completions`: admission, validation, dispatch and metering.
#[derive(Clone)]
pub struct ChatGatewayUseCases {
    api_keys: ApiKeyUseCases,
    model_access: ModelAccessUseCases,
    ledger: UsageLedger,
    registry: Arc<ModelRegistry>,
    settings: GatewaySettings,
}

impl ChatGatewayUseCases {
    pub fn new(
        api_keys: ApiKeyUseCases,
        model_access: ModelAccessUseCases,
        ledger: UsageLedger,
        registry: Arc<ModelRegistry>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            api_keys,
            model_access,
            ledger,
            registry,
            settings,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub async fn complete(
        &self,
        bearer: Option<&str>,
        body: &[u8],
        meta: RequestMeta,
    ) -> AppResult<Completion> {
        let raw_key = bearer
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(AppError::MissingApiKey)?;

        let parsed: Result<Value, serde_json::Error> = serde_json::from_slice(body);

        let key = match self.api_keys.verify(raw_key).await? {
            None => return Err(AppError::InvalidApiKey),
            Some(KeyVerification::RateLimited(key)) => {
                let model = parsed
                    .as_ref()
                    .ok()
                    .and_then(|v| v.get("model"))
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN_MODEL);
                tracing::info!(key_id = %key.id, rate_limit = key.rate_limit, "API key over quota");
                return Err(self.reject(&key, model, &meta, AppError::KeyQuotaExceeded).await);
            }
            Some(KeyVerification::Admitted(key)) => key,
        };

        let body = match parsed {
            Ok(body) => body,
            Err(e) => {
                let err = AppError::InvalidInput(format!(
                    "We could not parse the JSON body of your request: {e}"
                ));
                return Err(self.reject(&key, UNKNOWN_MODEL, &meta, err).await);
            }
        };

        let model = match parse_model(&body) {
            Ok(model) => model,
            Err(err) => return Err(self.reject(&key, UNKNOWN_MODEL, &meta, err).await),
        };

        let access = match self.model_access.check_model_access(key.user_id, &model).await {
            Ok(access) => access,
            Err(err) => return Err(self.reject(&key, &model, &meta, err).await),
        };
        if !access.allowed {
            let reason = access
                .reason
                .unwrap_or_else(|| format!("Model '{model}' is not available on your plan."));
            let err = AppError::ModelAccessDenied(reason);
            return Err(self.reject(&key, &model, &meta, err).await);
        }

        let request = match parse_request(model, &body) {
            Ok(request) => request,
            Err((model, err)) => return Err(self.reject(&key, &model, &meta, err).await),
        };

        let Some(entry) = self.registry.get(&request.model) else {
            let err = AppError::ModelNotFound {
                model: request.model.clone(),
                available: self.registry.ids(),
            };
            return Err(self.reject(&key, &request.model, &meta, err).await);
        };

        if request.stream && !entry.supports_streaming() {
            let err = AppError::StreamingUnsupported(request.model.clone());
            return Err(self.reject(&key, &request.model, &meta, err).await);
        }

        tracing::debug!(
            key_id = %key.id,
            model = %request.model,
            provider = %entry.provider,
            stream = request.stream,
            "Dispatching chat completion"
        );

        if request.stream {
            Ok(Completion::Stream(self.spawn_stream(key, entry, request, meta)))
        } else {
            self.complete_sync(key, entry, request, meta)
                .await
                .map(Completion::Full)
        }
    }

    // ========================================================================
    // Synchronous Path
    // ========================================================================

    async fn complete_sync(
        &self,
        key: ApiKey,
        entry: &ModelEntry,
        request: ChatRequest,
        meta: RequestMeta,
    ) -> AppResult<ChatCompletion> {
        let history = with_persona(&request.messages, entry.persona);
        let started = Instant::now();

        let result = match tokio::time::timeout(
            self.settings.vendor_timeout,
            entry.adapter.chat(&history, &request.options),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.settings.vendor_timeout.as_secs())),
        };
        let latency_ms = elapsed_ms(started);

        match result {
            Ok(reply) => {
                let usage = usage_for(&request.messages, &reply.reply);
                self.record_success(&key, &request.model, &meta, latency_ms, usage.total_tokens)
                    .await;

                Ok(ChatCompletion::new(
                    completion_id(),
                    chrono::Utc::now().timestamp(),
                    request.model,
                    reply.reply,
                    usage,
                ))
            }
            Err(e) => {
                let err = AppError::Provider(e);
                self.record_failure(&key, &request.model, &meta, latency_ms, &err)
                    .await;
                Err(err)
            }
        }
    }

    // ========================================================================
    // Streaming Path
    // ========================================================================

    fn spawn_stream(
        &self,
        key: ApiKey,
        entry: &ModelEntry,
        request: ChatRequest,
        meta: RequestMeta,
    ) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let job = StreamJob {
            key,
            history: with_persona(&request.messages, entry.persona),
            adapter: entry.adapter.clone(),
            model: request.model,
            messages: request.messages,
            options: request.options,
            meta,
            id: completion_id(),
            created: chrono::Utc::now().timestamp(),
            started: Instant::now(),
        };

        let gateway = self.clone();
        tokio::spawn(async move { gateway.pump_stream(job, tx).await });

        ReceiverStream::new(rx)
    }

    /// Forward vendor chunks until the vendor finishes, fails, or the client leaves.
    async fn pump_stream(&self, job: StreamJob, tx: mpsc::Sender<StreamEvent>) {
        let mut reply = String::new();
        let end = self.forward_chunks(&job, &tx, &mut reply).await;
        let latency_ms = elapsed_ms(job.started);

        // The client's stream ends when the last sender drops, so the ledger
        // writes below run after it has closed.

        match end {
            StreamEnd::Completed => {
                let usage = usage_for(&job.messages, &reply);
                let finish = ChatCompletionChunk::finish(&job.id, job.created, &job.model, usage);
                let _ = tx.send(StreamEvent::Chunk(finish)).await;
                let _ = tx.send(StreamEvent::Done).await;
                drop(tx);

                self.record_success(&job.key, &job.model, &job.meta, latency_ms, usage.total_tokens)
                    .await;
            }
            StreamEnd::Failed(e) => {
                let err = AppError::Provider(e);
                let _ = tx.send(StreamEvent::Error(err.envelope())).await;
                drop(tx);

                self.record_failure(&job.key, &job.model, &job.meta, latency_ms, &err)
                    .await;
            }
            StreamEnd::Disconnected => {
                drop(tx);
                let tokens = usage_for(&job.messages, &reply).total_tokens;
                tracing::info!(
                    key_id = %job.key.id,
                    model = %job.model,
                    tokens,
                    "Client disconnected mid-stream"
                );

                self.increment_usage(&job.key).await;
                self.ledger
                    .update_daily_usage(job.key.id, job.key.user_id, i64::from(tokens), false)
                    .await;
                self.ledger
                    .log_request(log_entry(
                        &job.key,
                        &job.model,
                        &job.meta,
                        CLIENT_CLOSED_REQUEST,
                        Some(latency_ms),
                        i64::from(tokens),
                        Some("Client closed the connection".to_string()),
                    ))
                    .await;
            }
        }
    }

    async fn forward_chunks(
        &self,
        job: &StreamJob,
        tx: &mpsc::Sender<StreamEvent>,
        reply: &mut String,
    ) -> StreamEnd {
        let opened = tokio::select! {
            _ = tx.closed() => return StreamEnd::Disconnected,
            opened = tokio::time::timeout(
                self.settings.vendor_timeout,
                job.adapter.chat_stream(&job.history, &job.options),
            ) => opened,
        };

        let mut upstream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return StreamEnd::Failed(e),
            Err(_) => {
                return StreamEnd::Failed(ProviderError::Timeout(
                    self.settings.vendor_timeout.as_secs(),
                ));
            }
        };

        let mut first = true;
        loop {
            let next = tokio::select! {
                _ = tx.closed() => return StreamEnd::Disconnected,
                next = tokio::time::timeout(self.settings.stream_idle_timeout, upstream.next()) => next,
            };

            let text = match next {
                Err(_) => {
                    return StreamEnd::Failed(ProviderError::Timeout(
                        self.settings.stream_idle_timeout.as_secs(),
                    ));
                }
                Ok(None) => return StreamEnd::Completed,
                Ok(Some(Err(e))) => return StreamEnd::Failed(e),
                Ok(Some(Ok(text))) => text,
            };

            if text.is_empty() {
                continue;
            }

            reply.push_str(&text);
            let chunk = ChatCompletionChunk::content(&job.id, job.created, &job.model, text, first);
            first = false;

            if tx.send(StreamEvent::Chunk(chunk)).await.is_err() {
                return StreamEnd::Disconnected;
            }
        }
    }

    // ========================================================================
    // Ledger Helpers
    // ========================================================================

    /// Log a rejected request and hand the error back.
    async fn reject(&self, key: &ApiKey, model: &str, meta: &RequestMeta, err: AppError) -> AppError {
        tracing::info!(
            key_id = %key.id,
            model = %model,
            status = err.status_code(),
            code = err.code().as_str(),
            "Chat completion rejected"
        );
        self.ledger
            .log_request(log_entry(
                key,
                model,
                meta,
                err.status_code(),
                None,
                0,
                Some(err.public_message()),
            ))
            .await;
        err
    }

    async fn record_success(
        &self,
        key: &ApiKey,
        model: &str,
        meta: &RequestMeta,
        latency_ms: i64,
        tokens: u32,
    ) {
        self.increment_usage(key).await;
        self.ledger
            .update_daily_usage(key.id, key.user_id, i64::from(tokens), true)
            .await;
        self.ledger
            .log_request(log_entry(
                key,
                model,
                meta,
                200,
                Some(latency_ms),
                i64::from(tokens),
                None,
            ))
            .await;
    }

    async fn record_failure(
        &self,
        key: &ApiKey,
        model: &str,
        meta: &RequestMeta,
        latency_ms: i64,
        err: &AppError,
    ) {
        tracing::warn!(
            key_id = %key.id,
            model = %model,
            status = err.status_code(),
            error = %err,
            latency_ms,
            "Provider call failed"
        );
        self.ledger
            .update_daily_usage(key.id, key.user_id, 0, false)
            .await;
        self.ledger
            .log_request(log_entry(
                key,
                model,
                meta,
                err.status_code(),
                Some(latency_ms),
                0,
                Some(err.to_string()),
            ))
            .await;
    }

    async fn increment_usage(&self, key: &ApiKey) {
        if let Err(e) = self.api_keys.increment_usage(key.id).await {
            tracing::error!(key_id = %key.id, error = %e, "Failed to increment key usage");
        }
    }
}

// ============================================================================
// Body Validation
// ============================================================================

fn parse_model(body: &Value) -> AppResult<String> {
    match body.get("model") {
        None | Some(Value::Null) => Err(AppError::MissingParameter("model")),
        Some(Value::String(model)) if model.trim().is_empty() => {
            Err(AppError::MissingParameter("model"))
        }
        Some(Value::String(model)) => Ok(model.clone()),
        Some(_) => Err(AppError::InvalidParameter {
            param: "model",
            reason: "expected a string".to_string(),
        }),
    }
}

/// Validate everything after the model id. On failure the model is handed
/// back so the rejection can be logged against it.
fn parse_request(model: String, body: &Value) -> Result<ChatRequest, (String, AppError)> {
    let parsed = parse_messages(body).and_then(|messages| {
        Ok((messages, parse_options(body)?, parse_stream(body)?))
    });

    match parsed {
        Ok((messages, options, stream)) => Ok(ChatRequest {
            model,
            messages,
            options,
            stream,
        }),
        Err(err) => Err((model, err)),
    }
}

fn parse_messages(body: &Value) -> AppResult<Vec<ChatMessage>> {
    let items = match body.get("messages") {
        None | Some(Value::Null) => return Err(AppError::MissingParameter("messages")),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(AppError::InvalidParameter {
                param: "messages",
                reason: "expected an array of messages".to_string(),
            });
        }
    };

    if items.is_empty() {
        return Err(AppError::InvalidParameter {
            param: "messages",
            reason: "at least one message is required".to_string(),
        });
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let invalid = |reason: String| AppError::InvalidParameter {
                param: "messages",
                reason: format!("message {index}: {reason}"),
            };

            let role = item
                .get("role")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("'role' must be a string".to_string()))?;
            let role = Role::from_str(role).map_err(|_| {
                invalid(format!(
                    "unsupported role '{role}', expected system, user or assistant"
                ))
            })?;
            let content = item
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("'content' must be a string".to_string()))?;

            Ok(ChatMessage::new(role, content))
        })
        .collect()
}

fn parse_options(body: &Value) -> AppResult<ChatOptions> {
    let temperature = match body.get("temperature") {
        None | Some(Value::Null) => None,
        Some(value) => match value.as_f64() {
            Some(t) if (0.0..=2.0).contains(&t) => Some(t as f32),
            _ => {
                return Err(AppError::InvalidParameter {
                    param: "temperature",
                    reason: "expected a number between 0 and 2".to_string(),
                });
            }
        },
    };

    let max_tokens = match body.get("max_tokens") {
        None | Some(Value::Null) => None,
        Some(value) => match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) if n > 0 => Some(n),
            _ => {
                return Err(AppError::InvalidParameter {
                    param: "max_tokens",
                    reason: "expected a positive integer".to_string(),
                });
            }
        },
    };

    Ok(ChatOptions {
        temperature,
        max_tokens,
    })
}

fn parse_stream(body: &Value) -> AppResult<bool> {
    match body.get("stream") {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(stream)) => Ok(*stream),
        Some(_) => Err(AppError::InvalidParameter {
            param: "stream",
            reason: "expected a boolean".to_string(),
        }),
    }
}

// ============================================================================
// Private Helpers
// ============================================================================

fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4().simple())
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

fn log_entry(
    key: &ApiKey,
    model: &str,
    meta: &RequestMeta,
    status_code: u16,
    latency_ms: Option<i64>,
    tokens_used: i64,
    error_message: Option<String>,
) -> NewRequestLog {
    NewRequestLog {
        api_key_id: key.id,
        user_id: key.user_id,
        model: model.to_string(),
        endpoint: meta.endpoint.clone(),
        status_code,
        latency_ms,
        tokens_used,
        error_message,
        ip_address: meta.ip_address.clone(),
        user_agent: meta.user_agent.clone(),
    }
}
