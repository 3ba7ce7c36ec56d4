use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::app_error::AppResult;
use crate::domain::entities::user_plan::{Plan, UserPlan};

#[async_trait]
pub trait UserPlanRepoTrait: Send + Sync {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<UserPlan>>;
}

/// Plan in force right now. Missing rows and expired paid plans count as free.
pub async fn effective_plan(repo: &dyn UserPlanRepoTrait, user_id: Uuid) -> AppResult<Plan> {
    let now = chrono::Utc::now().naive_utc();
    Ok(repo
        .get_by_user(user_id)
        .await?
        .map(|plan| plan.effective_plan(now))
        .unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAccess {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl ModelAccess {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn denied(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

#[derive(Clone)]
pub struct ModelAccessUseCases {
    plan_repo: Arc<dyn UserPlanRepoTrait>,
    premium_models: Arc<HashSet<String>>,
}

impl ModelAccessUseCases {
    pub fn new(
        plan_repo: Arc<dyn UserPlanRepoTrait>,
        premium_models: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            plan_repo,
            premium_models: Arc::new(premium_models.into_iter().collect()),
        }
    }

    pub fn is_premium(&self, model_id: &str) -> bool {
        self.premium_models.contains(model_id)
    }

    /// Free plans are denied the premium model set. Unknown models pass here
    /// and are rejected later by the registry lookup.
    #[tracing::instrument(skip(self))]
    pub async fn check_model_access(&self, user_id: Uuid, model_id: &str) -> AppResult<ModelAccess> {
        if !self.is_premium(model_id) {
            return Ok(ModelAccess::allowed());
        }

        let plan = effective_plan(self.plan_repo.as_ref(), user_id).await?;
        if plan.can_use_premium_models() {
            return Ok(ModelAccess::allowed());
        }

        Ok(ModelAccess::denied(format!(
            "Model '{model_id}' requires a Pro or Enterprise plan. Your current plan is '{plan}'."
        )))
    }
}
