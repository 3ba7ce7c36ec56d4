use async_trait::async_trait;
use redis::{Script, aio::ConnectionManager};

use super::InfraError;
use crate::app_error::{AppError, AppResult};

/// Fixed window length for ingress limits.
pub const DEFAULT_WINDOW_SECS: u64 = 3600;

/// Ceiling for every request path starting with `prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRule {
    pub prefix: String,
    pub max_requests: u64,
}

impl PathRule {
    pub fn new(prefix: impl Into<String>, max_requests: u64) -> Self {
        Self {
            prefix: prefix.into(),
            max_requests,
        }
    }
}

/// `/api/v1/` → 1000/h, `/api/` → 100/h.
pub fn default_rules() -> Vec<PathRule> {
    vec![PathRule::new("/api/v1/", 1000), PathRule::new("/api/", 100)]
}

/// Longest matching prefix wins. `None` means the path is not limited.
pub fn match_rule<'a>(rules: &'a [PathRule], path: &str) -> Option<&'a PathRule> {
    rules
        .iter()
        .filter(|rule| path.starts_with(&rule.prefix))
        .max_by_key(|rule| rule.prefix.len())
}

/// Parse `"/api/v1/=1000,/api/=100"`. Malformed entries are skipped.
pub fn parse_rules(raw: &str) -> Vec<PathRule> {
    raw.split(',')
        .filter_map(|entry| {
            let (prefix, max) = entry.trim().rsplit_once('=')?;
            let max = max.trim().parse().ok()?;
            let prefix = prefix.trim();
            (!prefix.is_empty()).then(|| PathRule::new(prefix, max))
        })
        .collect()
}

fn window_key(rule: &PathRule, ip: &str) -> String {
    format!("rate:{}:{ip}", rule.prefix)
}

/// Trait for rate limiting implementations.
#[async_trait]
pub trait RateLimiterTrait: Send + Sync {
    /// Count one hit for the rule matching `path` and the client `ip`.
    /// Returns Ok(()) if within limits or unmatched, Err(AppError::RateLimited) if exceeded.
    async fn check(&self, path: &str, ip: &str) -> AppResult<()>;
}

/// Lua script for atomic increment with TTL.
/// Returns the new count after increment.
/// If the key doesn't exist, it's created with TTL.
/// If the key exists but has no TTL, TTL is set.
const INCR_WITH_TTL_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
elseif redis.call('TTL', KEYS[1]) == -1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return current
"#;

/// Redis-backed rate limiter for production use.
#[derive(Clone)]
pub struct RedisRateLimiter {
    manager: ConnectionManager,
    window_secs: u64,
    rules: Vec<PathRule>,
    script: Script,
}

impl RedisRateLimiter {
    pub async fn new(
        redis_url: &str,
        window_secs: u64,
        rules: Vec<PathRule>,
    ) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url).map_err(InfraError::RedisConnection)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(InfraError::RedisConnection)?;
        let script = Script::new(INCR_WITH_TTL_SCRIPT);
        Ok(Self {
            manager,
            window_secs,
            rules,
            script,
        })
    }
}

#[async_trait]
impl RateLimiterTrait for RedisRateLimiter {
    async fn check(&self, path: &str, ip: &str) -> AppResult<()> {
        let Some(rule) = match_rule(&self.rules, path) else {
            return Ok(());
        };

        let mut conn = self.manager.clone();
        let current: u64 = self
            .script
            .key(window_key(rule, ip))
            .arg(self.window_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        if current > rule.max_requests {
            tracing::info!(prefix = %rule.prefix, ip = %ip, count = current, "Ingress rate limit hit");
            return Err(AppError::RateLimited);
        }

        Ok(())
    }
}
