use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    adapters::http::{app_state::AppState, middleware::SessionUser},
    app_error::{AppError, AppResult},
    domain::entities::api_key::ApiKey,
};

/// Returns a router for the key console.
/// Note: session authentication is applied in mod.rs when nesting this router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/keys", get(list_keys).post(create_key))
        .route("/keys/{key_id}", delete(revoke_key).patch(rename_key))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize, Default)]
struct CreateKeyPayload {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RenameKeyPayload {
    name: String,
}

/// A key as shown in the console. The secret itself is never included.
#[derive(Serialize)]
struct KeyResponse {
    id: Uuid,
    name: String,
    key_prefix: String,
    is_active: bool,
    rate_limit: i64,
    requests_used: i64,
    last_reset_at: Option<NaiveDateTime>,
    created_at: Option<NaiveDateTime>,
}

impl From<ApiKey> for KeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            key_prefix: key.key_prefix,
            is_active: key.is_active,
            rate_limit: key.rate_limit,
            requests_used: key.requests_used,
            last_reset_at: key.last_reset_at,
            created_at: key.created_at,
        }
    }
}

#[derive(Serialize)]
struct KeyListResponse {
    data: Vec<KeyResponse>,
}

#[derive(Serialize)]
struct CreatedKeyResponse {
    #[serde(flatten)]
    key: KeyResponse,
    /// Returned exactly once.
    secret: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/console/keys
async fn list_keys(
    State(app_state): State<AppState>,
    Extension(SessionUser(user_id)): Extension<SessionUser>,
) -> AppResult<impl IntoResponse> {
    let keys = app_state.api_key_use_cases.list_api_keys(user_id).await?;
    Ok(Json(KeyListResponse {
        data: keys.into_iter().map(KeyResponse::from).collect(),
    }))
}

/// POST /api/console/keys
async fn create_key(
    State(app_state): State<AppState>,
    Extension(SessionUser(user_id)): Extension<SessionUser>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    // The body is optional here.
    let payload: CreateKeyPayload = if body.is_empty() {
        CreateKeyPayload::default()
    } else {
        parse_body(&body)?
    };
    let (key, secret) = app_state
        .api_key_use_cases
        .create_api_key(user_id, payload.name.as_deref().unwrap_or_default())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedKeyResponse {
            key: key.into(),
            secret,
        }),
    ))
}

/// DELETE /api/console/keys/{key_id}
async fn revoke_key(
    State(app_state): State<AppState>,
    Extension(SessionUser(user_id)): Extension<SessionUser>,
    Path(key_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    app_state
        .api_key_use_cases
        .revoke_api_key(user_id, key_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/console/keys/{key_id}
async fn rename_key(
    State(app_state): State<AppState>,
    Extension(SessionUser(user_id)): Extension<SessionUser>,
    Path(key_id): Path<Uuid>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let payload: RenameKeyPayload = parse_body(&body)?;
    let key = app_state
        .api_key_use_cases
        .rename_api_key(user_id, key_id, &payload.name)
        .await?;
    Ok(Json(KeyResponse::from(key)))
}

/// JSON body errors are reported in the error envelope like every other failure.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> AppResult<T> {
    serde_json::from_slice(body).map_err(|e| AppError::InvalidInput(format!("Invalid request body: {e}")))
}
