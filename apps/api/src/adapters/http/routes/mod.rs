pub mod chat;
pub mod keys;
pub mod models;

use axum::{Router, middleware};

use crate::adapters::http::{app_state::AppState, middleware::session_auth_middleware};

pub fn router(app_state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/v1", chat::router().merge(models::router()))
        .nest(
            "/console",
            keys::router().route_layer(middleware::from_fn_with_state(
                app_state,
                session_auth_middleware,
            )),
        )
}
