use std::str::FromStr;

use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::model_access::UserPlanRepoTrait,
    domain::entities::user_plan::{Plan, UserPlan},
};

#[async_trait]
impl UserPlanRepoTrait for PostgresPersistence {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<UserPlan>> {
        let row = sqlx::query("SELECT user_id, plan, expires_at FROM user_plans WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(row.map(|row| {
            let raw: String = row.get("plan");
            let plan = Plan::from_str(&raw).unwrap_or_else(|_| {
                tracing::warn!(user_id = %user_id, plan = %raw, "Unknown plan value, treating as free");
                Plan::Free
            });
            UserPlan {
                user_id: row.get("user_id"),
                plan,
                expires_at: row.get("expires_at"),
            }
        }))
    }
}
