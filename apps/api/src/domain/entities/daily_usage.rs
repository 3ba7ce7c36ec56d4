use chrono::NaiveDate;
use uuid::Uuid;

/// Per-key, per-day rollup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyUsage {
    pub id: Uuid,
    pub api_key_id: Uuid,
    pub user_id: Uuid,
    pub usage_date: NaiveDate,
    pub requests_count: i64,
    pub tokens_used: i64,
    pub success_count: i64,
    pub error_count: i64,
}
