//! In-memory implementations of the repository and limiter traits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        api_key::{ApiKeyRepoTrait, hash_api_key},
        model_access::UserPlanRepoTrait,
        usage::UsageRepoTrait,
    },
    domain::entities::{
        api_key::ApiKey,
        daily_usage::DailyUsage,
        request_log::NewRequestLog,
        user_plan::{Plan, UserPlan},
    },
    infra::rate_limit::{PathRule, RateLimiterTrait, default_rules, match_rule},
};

// ============================================================================
// InMemoryApiKeyRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryApiKeyRepo {
    pub keys: Mutex<HashMap<Uuid, ApiKey>>,
}

impl InMemoryApiKeyRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `key` so that `raw_key` resolves to it.
    pub fn insert_raw(&self, raw_key: &str, mut key: ApiKey) {
        key.key_hash = hash_api_key(raw_key);
        self.keys.lock().unwrap().insert(key.id, key);
    }
}

#[async_trait]
impl ApiKeyRepoTrait for InMemoryApiKeyRepo {
    async fn create(
        &self,
        user_id: Uuid,
        key_prefix: &str,
        key_hash: &str,
        name: &str,
        rate_limit: i64,
    ) -> AppResult<ApiKey> {
        let now = chrono::Utc::now().naive_utc();
        let key = ApiKey {
            id: Uuid::new_v4(),
            user_id,
            key_prefix: key_prefix.to_string(),
            key_hash: key_hash.to_string(),
            name: name.to_string(),
            is_active: true,
            rate_limit,
            requests_used: 0,
            last_reset_at: Some(now),
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.keys.lock().unwrap().insert(key.id, key.clone());
        Ok(key)
    }

    async fn get_active_by_hash(&self, key_hash: &str) -> AppResult<Option<ApiKey>> {
        Ok(self
            .keys
            .lock()
            .unwrap()
            .values()
            .find(|k| k.key_hash == key_hash && k.is_active)
            .cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<ApiKey>> {
        Ok(self.keys.lock().unwrap().get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<ApiKey>> {
        let mut keys: Vec<ApiKey> = self
            .keys
            .lock()
            .unwrap()
            .values()
            .filter(|k| k.user_id == user_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn revoke(&self, id: Uuid) -> AppResult<()> {
        if let Some(key) = self.keys.lock().unwrap().get_mut(&id) {
            key.is_active = false;
        }
        Ok(())
    }

    async fn rename(&self, id: Uuid, name: &str) -> AppResult<ApiKey> {
        let mut keys = self.keys.lock().unwrap();
        let key = keys.get_mut(&id).ok_or(AppError::NotFound)?;
        key.name = name.to_string();
        Ok(key.clone())
    }

    async fn increment_requests_used(&self, id: Uuid) -> AppResult<i64> {
        let mut keys = self.keys.lock().unwrap();
        let key = keys.get_mut(&id).ok_or(AppError::NotFound)?;
        key.requests_used += 1;
        Ok(key.requests_used)
    }
}

// ============================================================================
// InMemoryUserPlanRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryUserPlanRepo {
    pub plans: Mutex<HashMap<Uuid, UserPlan>>,
}

impl InMemoryUserPlanRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_plan(&self, user_id: Uuid, plan: Plan, expires_at: Option<NaiveDateTime>) {
        self.plans.lock().unwrap().insert(
            user_id,
            UserPlan {
                user_id,
                plan,
                expires_at,
            },
        );
    }
}

#[async_trait]
impl UserPlanRepoTrait for InMemoryUserPlanRepo {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<UserPlan>> {
        Ok(self.plans.lock().unwrap().get(&user_id).cloned())
    }
}

// ============================================================================
// InMemoryUsageRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryUsageRepo {
    logs: Mutex<Vec<NewRequestLog>>,
    daily: Mutex<HashMap<Uuid, DailyUsage>>,
}

impl InMemoryUsageRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request log rows in insertion order.
    pub fn request_logs(&self) -> Vec<NewRequestLog> {
        self.logs.lock().unwrap().clone()
    }

    pub fn daily_rows(&self) -> Vec<DailyUsage> {
        self.daily.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl UsageRepoTrait for InMemoryUsageRepo {
    async fn insert_request_log(&self, entry: &NewRequestLog) -> AppResult<()> {
        self.logs.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn get_daily_usage(
        &self,
        api_key_id: Uuid,
        usage_date: NaiveDate,
    ) -> AppResult<Option<DailyUsage>> {
        Ok(self
            .daily
            .lock()
            .unwrap()
            .values()
            .find(|row| row.api_key_id == api_key_id && row.usage_date == usage_date)
            .cloned())
    }

    async fn insert_daily_usage(&self, row: &DailyUsage) -> AppResult<()> {
        let mut daily = self.daily.lock().unwrap();
        if daily
            .values()
            .any(|r| r.api_key_id == row.api_key_id && r.usage_date == row.usage_date)
        {
            return Err(AppError::InvalidInput(
                "A record with this value already exists".into(),
            ));
        }
        daily.insert(row.id, row.clone());
        Ok(())
    }

    async fn increment_daily_usage(&self, id: Uuid, tokens: i64, success: bool) -> AppResult<()> {
        let mut daily = self.daily.lock().unwrap();
        let row = daily.get_mut(&id).ok_or(AppError::NotFound)?;
        row.requests_count += 1;
        row.tokens_used += tokens;
        if success {
            row.success_count += 1;
        } else {
            row.error_count += 1;
        }
        Ok(())
    }
}

/// Usage repo whose every write fails, for checking that ledger errors are swallowed.
pub struct FailingUsageRepo;

#[async_trait]
impl UsageRepoTrait for FailingUsageRepo {
    async fn insert_request_log(&self, _entry: &NewRequestLog) -> AppResult<()> {
        Err(AppError::Database("connection refused".into()))
    }

    async fn get_daily_usage(
        &self,
        _api_key_id: Uuid,
        _usage_date: NaiveDate,
    ) -> AppResult<Option<DailyUsage>> {
        Err(AppError::Database("connection refused".into()))
    }

    async fn insert_daily_usage(&self, _row: &DailyUsage) -> AppResult<()> {
        Err(AppError::Database("connection refused".into()))
    }

    async fn increment_daily_usage(&self, _id: Uuid, _tokens: i64, _success: bool) -> AppResult<()> {
        Err(AppError::Database("connection refused".into()))
    }
}

/// Wraps an in-memory usage repo and sleeps before every write.
pub struct SlowUsageRepo {
    inner: Arc<InMemoryUsageRepo>,
    delay: Duration,
}

impl SlowUsageRepo {
    pub fn new(inner: Arc<InMemoryUsageRepo>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl UsageRepoTrait for SlowUsageRepo {
    async fn insert_request_log(&self, entry: &NewRequestLog) -> AppResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_request_log(entry).await
    }

    async fn get_daily_usage(
        &self,
        api_key_id: Uuid,
        usage_date: NaiveDate,
    ) -> AppResult<Option<DailyUsage>> {
        self.inner.get_daily_usage(api_key_id, usage_date).await
    }

    async fn insert_daily_usage(&self, row: &DailyUsage) -> AppResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_daily_usage(row).await
    }

    async fn increment_daily_usage(&self, id: Uuid, tokens: i64, success: bool) -> AppResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.increment_daily_usage(id, tokens, success).await
    }
}

/// Plan store that is always unreachable.
pub struct FailingUserPlanRepo;

#[async_trait]
impl UserPlanRepoTrait for FailingUserPlanRepo {
    async fn get_by_user(&self, _user_id: Uuid) -> AppResult<Option<UserPlan>> {
        Err(AppError::Database("connection refused".into()))
    }
}

// ============================================================================
// InMemoryRateLimiter
// ============================================================================

/// In-memory rate limiter for testing.
/// Counts hits per (rule prefix, ip) without ever expiring them.
pub struct InMemoryRateLimiter {
    counts: Mutex<HashMap<String, u64>>,
    rules: Vec<PathRule>,
}

impl InMemoryRateLimiter {
    pub fn with_rules(rules: Vec<PathRule>) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            rules,
        }
    }

    /// Create a permissive rate limiter that never blocks (for most tests).
    pub fn permissive() -> Self {
        Self::with_rules(Vec::new())
    }

    pub fn with_default_rules() -> Self {
        Self::with_rules(default_rules())
    }
}

#[async_trait]
impl RateLimiterTrait for InMemoryRateLimiter {
    async fn check(&self, path: &str, ip: &str) -> AppResult<()> {
        let Some(rule) = match_rule(&self.rules, path) else {
            return Ok(());
        };

        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(format!("{}:{ip}", rule.prefix)).or_insert(0);
        *count += 1;
        if *count > rule.max_requests {
            return Err(AppError::RateLimited);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limiter_counts_per_prefix_and_ip() {
        let limiter = InMemoryRateLimiter::with_rules(vec![PathRule::new("/api/", 2)]);

        assert!(limiter.check("/api/console/keys", "1.1.1.1").await.is_ok());
        assert!(limiter.check("/api/console/keys", "1.1.1.1").await.is_ok());
        assert!(limiter.check("/api/console/keys", "1.1.1.1").await.is_err());
        assert!(limiter.check("/api/console/keys", "2.2.2.2").await.is_ok());
        assert!(limiter.check("/health", "1.1.1.1").await.is_ok());
    }

    #[tokio::test]
    async fn daily_rows_are_unique_per_key_and_date() {
        let repo = InMemoryUsageRepo::new();
        let row = DailyUsage {
            id: Uuid::new_v4(),
            api_key_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            usage_date: chrono::Utc::now().date_naive(),
            requests_count: 1,
            tokens_used: 0,
            success_count: 1,
            error_count: 0,
        };
        repo.insert_daily_usage(&row).await.unwrap();

        let duplicate = DailyUsage {
            id: Uuid::new_v4(),
            ..row.clone()
        };
        assert!(repo.insert_daily_usage(&duplicate).await.is_err());
    }
}
