use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::use_cases::model_access::{UserPlanRepoTrait, effective_plan};
use crate::domain::entities::api_key::ApiKey;

/// Active keys an account may hold at once.
pub const MAX_ACTIVE_KEYS_PER_USER: usize = 2;
/// Minimum time between two key creations by the same account.
pub const KEY_CREATION_COOLDOWN_HOURS: i64 = 24;
pub const MAX_KEY_NAME_LEN: usize = 64;

const KEY_PREFIX: &str = "sk-sb-";
const DISPLAY_PREFIX_LEN: usize = 12;

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait ApiKeyRepoTrait: Send + Sync {
    async fn create(
        &self,
        user_id: Uuid,
        key_prefix: &str,
        key_hash: &str,
        name: &str,
        rate_limit: i64,
    ) -> AppResult<ApiKey>;

    /// Revoked keys are never returned.
    async fn get_active_by_hash(&self, key_hash: &str) -> AppResult<Option<ApiKey>>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<ApiKey>>;

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<ApiKey>>;

    async fn revoke(&self, id: Uuid) -> AppResult<()>;

    async fn rename(&self, id: Uuid, name: &str) -> AppResult<ApiKey>;

    /// Single server-side `requests_used = requests_used + 1`. Returns the new value.
    async fn increment_requests_used(&self, id: Uuid) -> AppResult<i64>;
}

// ============================================================================
// Admission Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyVerification {
    Admitted(ApiKey),
    /// The key exists but `requests_used >= rate_limit`.
    RateLimited(ApiKey),
}

impl KeyVerification {
    pub fn key(&self) -> &ApiKey {
        match self {
            KeyVerification::Admitted(key) | KeyVerification::RateLimited(key) => key,
        }
    }
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct ApiKeyUseCases {
    api_key_repo: Arc<dyn ApiKeyRepoTrait>,
    plan_repo: Arc<dyn UserPlanRepoTrait>,
}

impl ApiKeyUseCases {
    pub fn new(
        api_key_repo: Arc<dyn ApiKeyRepoTrait>,
        plan_repo: Arc<dyn UserPlanRepoTrait>,
    ) -> Self {
        Self {
            api_key_repo,
            plan_repo,
        }
    }

    // ========================================================================
    // Gateway Operations
    // ========================================================================

    /// Resolve a raw bearer key.
    ///
    /// `None` means unknown or revoked. The check is not atomic with
    /// `increment_usage`: two concurrent requests at the last free slot can both pass.
    pub async fn verify(&self, raw_key: &str) -> AppResult<Option<KeyVerification>> {
        let key_hash = hash_api_key(raw_key);

        let Some(key) = self.api_key_repo.get_active_by_hash(&key_hash).await? else {
            return Ok(None);
        };

        if key.is_over_quota() {
            return Ok(Some(KeyVerification::RateLimited(key)));
        }

        Ok(Some(KeyVerification::Admitted(key)))
    }

    pub async fn increment_usage(&self, key_id: Uuid) -> AppResult<i64> {
        self.api_key_repo.increment_requests_used(key_id).await
    }

    // ========================================================================
    // Console Operations (require a session)
    // ========================================================================

    pub async fn list_api_keys(&self, user_id: Uuid) -> AppResult<Vec<ApiKey>> {
        self.api_key_repo.list_by_user(user_id).await
    }

    /// Create a key named `name` for `user_id`.
    /// Returns the stored key and the raw secret (shown only once).
    pub async fn create_api_key(&self, user_id: Uuid, name: &str) -> AppResult<(ApiKey, String)> {
        let name = sanitize_name(name)?;

        let existing = self.api_key_repo.list_by_user(user_id).await?;
        let active = existing.iter().filter(|k| k.is_active).count();
        if active >= MAX_ACTIVE_KEYS_PER_USER {
            return Err(AppError::KeyLimitReached(format!(
                "You can have at most {MAX_ACTIVE_KEYS_PER_USER} active API keys. Revoke one first."
            )));
        }

        let now = chrono::Utc::now().naive_utc();
        let cooldown = chrono::Duration::hours(KEY_CREATION_COOLDOWN_HOURS);
        if let Some(last_created) = existing.iter().filter_map(|k| k.created_at).max()
            && now - last_created < cooldown
        {
            return Err(AppError::KeyLimitReached(format!(
                "You can create one API key every {KEY_CREATION_COOLDOWN_HOURS} hours."
            )));
        }

        let plan = effective_plan(self.plan_repo.as_ref(), user_id).await?;
        let raw_key = generate_api_key();
        let key_prefix = &raw_key[..DISPLAY_PREFIX_LEN];
        let key_hash = hash_api_key(&raw_key);

        let key = self
            .api_key_repo
            .create(
                user_id,
                key_prefix,
                &key_hash,
                &name,
                plan.default_rate_limit(),
            )
            .await?;

        tracing::info!(user_id = %user_id, key_id = %key.id, plan = %plan, "API key created");
        Ok((key, raw_key))
    }

    /// Soft-revoke a key. The row is kept with `is_active = false`.
    pub async fn revoke_api_key(&self, user_id: Uuid, key_id: Uuid) -> AppResult<()> {
        self.owned_key(user_id, key_id).await?;
        self.api_key_repo.revoke(key_id).await?;
        tracing::info!(user_id = %user_id, key_id = %key_id, "API key revoked");
        Ok(())
    }

    pub async fn rename_api_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        name: &str,
    ) -> AppResult<ApiKey> {
        let name = sanitize_name(name)?;
        self.owned_key(user_id, key_id).await?;
        self.api_key_repo.rename(key_id, &name).await
    }

    // ========================================================================
    // Private Helpers
    // ========================================================================

    async fn owned_key(&self, user_id: Uuid, key_id: Uuid) -> AppResult<ApiKey> {
        let key = self
            .api_key_repo
            .get_by_id(key_id)
            .await?
            .ok_or(AppError::NotFound)?;

        // Someone else's key looks the same as a missing one.
        if key.user_id != user_id {
            return Err(AppError::NotFound);
        }

        Ok(key)
    }
}

fn sanitize_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.chars().count() > MAX_KEY_NAME_LEN {
        return Err(AppError::InvalidInput(format!(
            "Key name must be at most {MAX_KEY_NAME_LEN} characters"
        )));
    }
    Ok(if name.is_empty() { "Default" } else { name }.to_string())
}

// ============================================================================
// Key Generation
// ============================================================================

/// Generate a new API key with format: sk-sb-<base64url_24_bytes>
fn generate_api_key() -> String {
    let mut bytes = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("{KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// SHA-256 of the raw key, hex-encoded.
pub fn hash_api_key(raw_key: &str) -> String {
    hex::encode(Sha256::digest(raw_key.as_bytes()))
}
