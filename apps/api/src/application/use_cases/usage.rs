use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::app_error::AppResult;
use crate::domain::entities::{daily_usage::DailyUsage, request_log::NewRequestLog};

#[async_trait]
pub trait UsageRepoTrait: Send + Sync {
    async fn insert_request_log(&self, entry: &NewRequestLog) -> AppResult<()>;

    async fn get_daily_usage(
        &self,
        api_key_id: Uuid,
        usage_date: NaiveDate,
    ) -> AppResult<Option<DailyUsage>>;

    async fn insert_daily_usage(&self, row: &DailyUsage) -> AppResult<()>;

    async fn increment_daily_usage(&self, id: Uuid, tokens: i64, success: bool) -> AppResult<()>;
}

/// Request log and daily rollup writer. Nothing here ever fails the caller.
#[derive(Clone)]
pub struct UsageLedger {
    repo: Arc<dyn UsageRepoTrait>,
}

impl UsageLedger {
    pub fn new(repo: Arc<dyn UsageRepoTrait>) -> Self {
        Self { repo }
    }

    pub async fn log_request(&self, entry: NewRequestLog) {
        if let Err(e) = self.repo.insert_request_log(&entry).await {
            tracing::error!(
                api_key_id = %entry.api_key_id,
                model = %entry.model,
                status = entry.status_code,
                error = %e,
                "Failed to write request log"
            );
        }
    }

    /// Read today's row, then increment it or insert a fresh one.
    ///
    /// Two concurrent first-requests of the day can both miss the read; the
    /// loser's insert hits the unique (key, date) constraint and is dropped.
    pub async fn update_daily_usage(&self, api_key_id: Uuid, user_id: Uuid, tokens: i64, success: bool) {
        let today = chrono::Utc::now().date_naive();
        if let Err(e) = self
            .upsert_daily_usage(api_key_id, user_id, today, tokens, success)
            .await
        {
            tracing::error!(api_key_id = %api_key_id, error = %e, "Failed to update daily usage");
        }
    }

    async fn upsert_daily_usage(
        &self,
        api_key_id: Uuid,
        user_id: Uuid,
        usage_date: NaiveDate,
        tokens: i64,
        success: bool,
    ) -> AppResult<()> {
        match self.repo.get_daily_usage(api_key_id, usage_date).await? {
            Some(row) => self.repo.increment_daily_usage(row.id, tokens, success).await,
            None => {
                let row = DailyUsage {
                    id: Uuid::new_v4(),
                    api_key_id,
                    user_id,
                    usage_date,
                    requests_count: 1,
                    tokens_used: tokens,
                    success_count: i64::from(success),
                    error_count: i64::from(!success),
                };
                self.repo.insert_daily_usage(&row).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FailingUsageRepo, InMemoryUsageRepo, create_test_request_log};

    #[tokio::test]
    async fn first_request_of_day_inserts_row() {
        let repo = Arc::new(InMemoryUsageRepo::new());
        let ledger = UsageLedger::new(repo.clone());
        let (key_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());

        ledger.update_daily_usage(key_id, user_id, 42, true).await;

        let row = repo.daily_rows().pop().unwrap();
        assert_eq!(row.requests_count, 1);
        assert_eq!(row.tokens_used, 42);
        assert_eq!(row.success_count, 1);
        assert_eq!(row.error_count, 0);
    }

    #[tokio::test]
    async fn later_requests_increment_existing_row() {
        let repo = Arc::new(InMemoryUsageRepo::new());
        let ledger = UsageLedger::new(repo.clone());
        let (key_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());

        ledger.update_daily_usage(key_id, user_id, 10, true).await;
        ledger.update_daily_usage(key_id, user_id, 0, false).await;
        ledger.update_daily_usage(key_id, user_id, 5, true).await;

        let rows = repo.daily_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].requests_count, 3);
        assert_eq!(rows[0].tokens_used, 15);
        assert_eq!(rows[0].success_count, 2);
        assert_eq!(rows[0].error_count, 1);
    }

    #[tokio::test]
    async fn log_request_appends() {
        let repo = Arc::new(InMemoryUsageRepo::new());
        let ledger = UsageLedger::new(repo.clone());

        ledger
            .log_request(create_test_request_log(|e| e.status_code = 429))
            .await;

        let logs = repo.request_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status_code, 429);
    }

    #[tokio::test]
    async fn storage_failures_are_swallowed() {
        let ledger = UsageLedger::new(Arc::new(FailingUsageRepo));

        ledger.log_request(create_test_request_log(|_| {})).await;
        ledger
            .update_daily_usage(Uuid::new_v4(), Uuid::new_v4(), 1, true)
            .await;
    }
}
