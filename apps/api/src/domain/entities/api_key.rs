use chrono::NaiveDateTime;
use uuid::Uuid;

/// A caller credential. Only the SHA-256 digest of the secret is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub key_prefix: String,
    pub key_hash: String,
    pub name: String,
    pub is_active: bool,
    pub rate_limit: i64,
    pub requests_used: i64,
    pub last_reset_at: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl ApiKey {
    /// `requests_used >= rate_limit` is the admission boundary.
    pub fn is_over_quota(&self) -> bool {
        self.requests_used >= self.rate_limit
    }
}
