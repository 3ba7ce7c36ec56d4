use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::api_key::ApiKeyRepoTrait,
    domain::entities::api_key::ApiKey,
};

const KEY_COLUMNS: &str = "id, user_id, key_prefix, key_hash, name, is_active, rate_limit, \
     requests_used, last_reset_at, created_at, updated_at";

fn row_to_api_key(row: sqlx::postgres::PgRow) -> ApiKey {
    ApiKey {
        id: row.get("id"),
        user_id: row.get("user_id"),
        key_prefix: row.get("key_prefix"),
        key_hash: row.get("key_hash"),
        name: row.get("name"),
        is_active: row.get("is_active"),
        rate_limit: row.get("rate_limit"),
        requests_used: row.get("requests_used"),
        last_reset_at: row.get("last_reset_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl ApiKeyRepoTrait for PostgresPersistence {
    async fn create(
        &self,
        user_id: Uuid,
        key_prefix: &str,
        key_hash: &str,
        name: &str,
        rate_limit: i64,
    ) -> AppResult<ApiKey> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO api_keys (user_id, key_prefix, key_hash, name, rate_limit, last_reset_at)
            VALUES ($1, $2, $3, $4, $5, CURRENT_TIMESTAMP)
            RETURNING {KEY_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(key_prefix)
        .bind(key_hash)
        .bind(name)
        .bind(rate_limit)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row_to_api_key(row))
    }

    async fn get_active_by_hash(&self, key_hash: &str) -> AppResult<Option<ApiKey>> {
        let row = sqlx::query(&format!(
            "SELECT {KEY_COLUMNS} FROM api_keys WHERE key_hash = $1 AND is_active = TRUE"
        ))
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_api_key))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<ApiKey>> {
        let row = sqlx::query(&format!("SELECT {KEY_COLUMNS} FROM api_keys WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(row.map(row_to_api_key))
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<ApiKey>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {KEY_COLUMNS}
            FROM api_keys
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_api_key).collect())
    }

    async fn revoke(&self, id: Uuid) -> AppResult<()> {
        sqlx::query(
            "UPDATE api_keys SET is_active = FALSE, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(())
    }

    async fn rename(&self, id: Uuid, name: &str) -> AppResult<ApiKey> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE api_keys SET name = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING {KEY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row_to_api_key(row))
    }

    async fn increment_requests_used(&self, id: Uuid) -> AppResult<i64> {
        let row = sqlx::query(
            r#"
            UPDATE api_keys
            SET requests_used = requests_used + 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING requests_used
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.get("requests_used"))
    }
}
