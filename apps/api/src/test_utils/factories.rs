//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::domain::entities::{api_key::ApiKey, request_log::NewRequestLog};

/// Create an active free-tier key with sensible defaults.
pub fn create_test_api_key(user_id: Uuid, overrides: impl FnOnce(&mut ApiKey)) -> ApiKey {
    let id = Uuid::new_v4();
    let mut key = ApiKey {
        id,
        user_id,
        key_prefix: "sk-sb-test00".to_string(),
        key_hash: format!("hash-{id}"),
        name: "Default".to_string(),
        is_active: true,
        rate_limit: 100,
        requests_used: 0,
        last_reset_at: Some(test_datetime()),
        created_at: Some(test_datetime()),
        updated_at: Some(test_datetime()),
    };
    overrides(&mut key);
    key
}

/// Create a successful request log entry with sensible defaults.
pub fn create_test_request_log(overrides: impl FnOnce(&mut NewRequestLog)) -> NewRequestLog {
    let mut entry = NewRequestLog {
        api_key_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        model: "llama-3.1-8b".to_string(),
        endpoint: "/api/v1/chat/completions".to_string(),
        status_code: 200,
        latency_ms: Some(120),
        tokens_used: 42,
        error_message: None,
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: Some("test-agent".to_string()),
    };
    overrides(&mut entry);
    entry
}

/// A fixed point in time well outside any cooldown window.
pub fn test_datetime() -> NaiveDateTime {
    chrono::DateTime::from_timestamp(1_700_000_000, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}
