use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::usage::UsageRepoTrait,
    domain::entities::{daily_usage::DailyUsage, request_log::NewRequestLog},
};

fn row_to_daily_usage(row: sqlx::postgres::PgRow) -> DailyUsage {
    DailyUsage {
        id: row.get("id"),
        api_key_id: row.get("api_key_id"),
        user_id: row.get("user_id"),
        usage_date: row.get("usage_date"),
        requests_count: row.get("requests_count"),
        tokens_used: row.get("tokens_used"),
        success_count: row.get("success_count"),
        error_count: row.get("error_count"),
    }
}

#[async_trait]
impl UsageRepoTrait for PostgresPersistence {
    async fn insert_request_log(&self, entry: &NewRequestLog) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO request_logs
                (api_key_id, user_id, model, endpoint, status_code, latency_ms,
                 tokens_used, error_message, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.api_key_id)
        .bind(entry.user_id)
        .bind(&entry.model)
        .bind(&entry.endpoint)
        .bind(i32::from(entry.status_code))
        .bind(entry.latency_ms)
        .bind(entry.tokens_used)
        .bind(&entry.error_message)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(())
    }

    async fn get_daily_usage(
        &self,
        api_key_id: Uuid,
        usage_date: NaiveDate,
    ) -> AppResult<Option<DailyUsage>> {
        let row = sqlx::query(
            r#"
            SELECT id, api_key_id, user_id, usage_date, requests_count, tokens_used,
                   success_count, error_count
            FROM daily_usage
            WHERE api_key_id = $1 AND usage_date = $2
            "#,
        )
        .bind(api_key_id)
        .bind(usage_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_daily_usage))
    }

    async fn insert_daily_usage(&self, row: &DailyUsage) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_usage
                (id, api_key_id, user_id, usage_date, requests_count, tokens_used,
                 success_count, error_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(row.id)
        .bind(row.api_key_id)
        .bind(row.user_id)
        .bind(row.usage_date)
        .bind(row.requests_count)
        .bind(row.tokens_used)
        .bind(row.success_count)
        .bind(row.error_count)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(())
    }

    async fn increment_daily_usage(&self, id: Uuid, tokens: i64, success: bool) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE daily_usage
            SET requests_count = requests_count + 1,
                tokens_used = tokens_used + $2,
                success_count = success_count + CASE WHEN $3 THEN 1 ELSE 0 END,
                error_count = error_count + CASE WHEN $3 THEN 0 ELSE 1 END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(tokens)
        .bind(success)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(())
    }
}
