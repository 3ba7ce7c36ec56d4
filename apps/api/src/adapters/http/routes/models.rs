use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};

use crate::adapters::http::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/models", get(list_models))
}

/// GET /api/v1/models
async fn list_models(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(app_state.chat_gateway.registry().to_model_list())
}
