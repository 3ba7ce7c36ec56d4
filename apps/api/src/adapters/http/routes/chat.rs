use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{OriginalUri, State},
    http::{HeaderMap, header::USER_AGENT},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::post,
};
use futures::StreamExt;

use crate::{
    adapters::http::{
        app_state::AppState,
        middleware::{ClientIp, bearer_token},
    },
    app_error::AppResult,
    application::use_cases::chat_gateway::{Completion, RequestMeta, StreamEvent},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/chat/completions", post(chat_completions))
}

/// POST /api/v1/chat/completions
///
/// The body is taken raw so that malformed JSON is reported in the OpenAI
/// envelope, after key verification.
async fn chat_completions(
    State(app_state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    client_ip: Option<Extension<ClientIp>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let meta = RequestMeta {
        endpoint: uri.path().to_string(),
        ip_address: client_ip.and_then(|Extension(ClientIp(ip))| ip),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let completion = app_state
        .chat_gateway
        .complete(bearer_token(&headers), &body, meta)
        .await?;

    Ok(match completion {
        Completion::Full(completion) => Json(completion).into_response(),
        Completion::Stream(events) => Sse::new(events.map(sse_event)).into_response(),
    })
}

fn sse_event(event: StreamEvent) -> Result<Event, axum::Error> {
    match event {
        StreamEvent::Chunk(chunk) => Event::default().json_data(chunk),
        StreamEvent::Error(envelope) => Event::default().json_data(envelope),
        StreamEvent::Done => Ok(Event::default().data("[DONE]")),
    }
}
