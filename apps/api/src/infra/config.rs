use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;

use crate::{
    adapters::providers::ProviderSettings,
    application::use_cases::chat_gateway::GatewaySettings,
    infra::rate_limit::{DEFAULT_WINDOW_SECS, PathRule, default_rules, parse_rules},
};

pub struct AppConfig {
    /// HS256 secret of console session tokens.
    pub session_secret: SecretString,
    /// Expected `aud` of session tokens. Unchecked when unset.
    pub session_audience: Option<String>,
    pub cors_origin: HeaderValue,
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_rules: Vec<PathRule>,
    /// Whether to trust X-Forwarded-For headers. Set to true when behind a reverse proxy (Caddy, nginx).
    /// SECURITY: Only enable this when the API is not directly exposed to the internet.
    pub trust_proxy: bool,
    pub gateway: GatewaySettings,
    /// Destination of the JSON log stream.
    pub log_file: String,
    pub providers: ProviderSettings,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let session_secret = SecretString::new(get_env::<String>("SESSION_SECRET").into());
        let session_audience = optional_env("SESSION_AUDIENCE");

        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .context("CORS_ORIGIN must be a valid header value")?;

        let bind_addr: SocketAddr =
            get_env_default("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3001)));
        let database_url: String = get_env("DATABASE_URL");
        let database_max_connections: u32 = get_env_default("DATABASE_MAX_CONNECTIONS", 10);
        let redis_url: String = get_env_default("REDIS_URL", "redis://127.0.0.1:6379".to_string());

        let rate_limit_window_secs: u64 =
            get_env_default("RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS);
        let rate_limit_rules = match optional_env("RATE_LIMIT_RULES") {
            Some(raw) => {
                let rules = parse_rules(&raw);
                if rules.is_empty() {
                    tracing::warn!(raw = %raw, "RATE_LIMIT_RULES has no valid entries, using defaults");
                    default_rules()
                } else {
                    rules
                }
            }
            None => default_rules(),
        };

        // Default to false for security - must explicitly enable when behind a trusted proxy
        let trust_proxy: bool = get_env_default("TRUST_PROXY", false);

        let vendor_timeout_secs: u64 = get_env_default("VENDOR_TIMEOUT_SECS", 60);
        let stream_idle_timeout_secs: u64 = get_env_default("STREAM_IDLE_TIMEOUT_SECS", 30);

        let log_file: String = get_env_default("LOG_FILE", "app.log".to_string());

        let providers = ProviderSettings::from_lookup(|name| std::env::var(name).ok());

        Ok(Self {
            session_secret,
            session_audience,
            cors_origin,
            bind_addr,
            database_url,
            database_max_connections,
            redis_url,
            rate_limit_window_secs,
            rate_limit_rules,
            trust_proxy,
            gateway: GatewaySettings {
                vendor_timeout: Duration::from_secs(vendor_timeout_secs),
                stream_idle_timeout: Duration::from_secs(stream_idle_timeout_secs),
            },
            log_file,
            providers,
        })
    }
}

/// A set, non-blank variable.
fn optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
