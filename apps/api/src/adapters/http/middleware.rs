use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{adapters::http::app_state::AppState, app_error::AppError, application::jwt};

/// Client address as seen by the ingress limiter, made available to handlers.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

/// Account behind a verified console session.
#[derive(Debug, Clone, Copy)]
pub struct SessionUser(pub Uuid);

pub async fn rate_limit_middleware(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let connect_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    // Only trust forwarded headers if explicitly configured (when behind a reverse proxy)
    let ip = if app_state.config.trust_proxy {
        forwarded_ip(request.headers()).or(connect_ip)
    } else {
        connect_ip
    };

    let path = request.uri().path().to_string();
    let limit_key = ip.as_deref().unwrap_or("unknown");

    tracing::debug!(
        trust_proxy = app_state.config.trust_proxy,
        using_ip = %limit_key,
        path = %path,
        "Rate limiting request"
    );

    app_state.rate_limiter.check(&path, limit_key).await?;

    request.extensions_mut().insert(ClientIp(ip));

    Ok(next.run(request).await)
}

/// Require a console session token in `Authorization: Bearer <jwt>`.
pub async fn session_auth_middleware(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AppError::InvalidCredentials)?;
    let user_id = jwt::verify_session(
        token,
        &app_state.config.session_secret,
        app_state.config.session_audience.as_deref(),
    )?;

    request.extensions_mut().insert(SessionUser(user_id));

    Ok(next.run(request).await)
}

/// The token of an `Authorization: Bearer <token>` header, if present and non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    // Extract IP from X-Forwarded-For or X-Real-IP headers
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(first) = val.split(',').next()
    {
        let trimmed = first.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    if let Some(real) = headers.get("x-real-ip")
        && let Ok(val) = real.to_str()
        && !val.trim().is_empty()
    {
        return Some(val.trim().to_string());
    }
    None
}
