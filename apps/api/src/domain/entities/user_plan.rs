use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    /// Requests per reset window granted to keys created under this plan.
    pub fn default_rate_limit(&self) -> i64 {
        match self {
            Plan::Free => 100,
            Plan::Pro => 1_000,
            Plan::Enterprise => 10_000,
        }
    }

    pub fn can_use_premium_models(&self) -> bool {
        !matches!(self, Plan::Free)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPlan {
    pub user_id: Uuid,
    pub plan: Plan,
    pub expires_at: Option<NaiveDateTime>,
}

impl UserPlan {
    /// The plan in force at `now`. A lapsed paid plan falls back to free.
    pub fn effective_plan(&self, now: NaiveDateTime) -> Plan {
        match self.expires_at {
            Some(expires_at) if expires_at <= now => Plan::Free,
            _ => self.plan,
        }
    }
}
