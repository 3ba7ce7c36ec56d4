use uuid::Uuid;

/// An audit row for one inbound API call. Append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequestLog {
    pub api_key_id: Uuid,
    pub user_id: Uuid,
    pub model: String,
    pub endpoint: String,
    pub status_code: u16,
    pub latency_ms: Option<i64>,
    pub tokens_used: i64,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
