//! Test app state builder for HTTP-level integration testing.
//!
//! This module provides `TestAppStateBuilder` which creates a minimal `AppState`
//! with in-memory mocks for testing HTTP endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use secrecy::SecretString;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    adapters::providers::ProviderSettings,
    application::{
        jwt,
        model_registry::{ModelEntry, ModelRegistry},
        persona::PersonaTag,
        use_cases::{
            api_key::ApiKeyUseCases,
            chat_gateway::{ChatGatewayUseCases, GatewaySettings},
            model_access::ModelAccessUseCases,
            usage::UsageLedger,
        },
    },
    domain::entities::{api_key::ApiKey, user_plan::Plan},
    infra::{RateLimiterTrait, config::AppConfig, rate_limit::default_rules},
    test_utils::{
        InMemoryApiKeyRepo, InMemoryRateLimiter, InMemoryUsageRepo, InMemoryUserPlanRepo,
        ScriptedProvider,
    },
};

pub const TEST_SESSION_SECRET: &str = "test_session_secret";

/// A console session token accepted by states built with `TestAppStateBuilder`.
pub fn test_session_token(user_id: Uuid) -> String {
    jwt::issue_session(
        user_id,
        &SecretString::new(TEST_SESSION_SECRET.into()),
        None,
        time::Duration::hours(1),
    )
    .unwrap()
}

/// Handles on the in-memory stores behind a built `AppState`, for assertions.
pub struct TestMocks {
    pub api_keys: Arc<InMemoryApiKeyRepo>,
    pub plans: Arc<InMemoryUserPlanRepo>,
    pub usage: Arc<InMemoryUsageRepo>,
}

/// Builder for creating `AppState` with in-memory mocks for testing.
///
/// # Example
///
/// ```ignore
/// let key = create_test_api_key(user_id, |k| k.rate_limit = 10);
///
/// let app_state = TestAppStateBuilder::new()
///     .with_model("llama-3.1-8b", false, ScriptedProvider::replying("hi"))
///     .with_api_key("sk-sb-test", key)
///     .build();
/// ```
pub struct TestAppStateBuilder {
    registry: ModelRegistry,
    api_keys: Vec<(String, ApiKey)>,
    plans: Vec<(Uuid, Plan)>,
    rate_limiter: Option<Arc<dyn RateLimiterTrait>>,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            registry: ModelRegistry::new(),
            api_keys: vec![],
            plans: vec![],
            rate_limiter: None,
        }
    }

    /// Register a model served by a scripted provider.
    pub fn with_model(mut self, id: &str, premium: bool, provider: ScriptedProvider) -> Self {
        self.registry.register(ModelEntry {
            id: id.to_string(),
            provider: "scripted".to_string(),
            premium,
            persona: PersonaTag::Default,
            adapter: Arc::new(provider),
        });
        self
    }

    /// Store `key` so that the bearer `raw_key` resolves to it.
    pub fn with_api_key(mut self, raw_key: &str, key: ApiKey) -> Self {
        self.api_keys.push((raw_key.to_string(), key));
        self
    }

    pub fn with_plan(mut self, user_id: Uuid, plan: Plan) -> Self {
        self.plans.push((user_id, plan));
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiterTrait>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub fn build(self) -> AppState {
        self.build_with_mocks().0
    }

    /// Build the AppState and return the stores behind it.
    pub fn build_with_mocks(self) -> (AppState, TestMocks) {
        let api_key_repo = Arc::new(InMemoryApiKeyRepo::new());
        for (raw_key, key) in self.api_keys {
            api_key_repo.insert_raw(&raw_key, key);
        }

        let plan_repo = Arc::new(InMemoryUserPlanRepo::new());
        for (user_id, plan) in self.plans {
            plan_repo.set_plan(user_id, plan, None);
        }

        let usage_repo = Arc::new(InMemoryUsageRepo::new());

        let api_key_use_cases = ApiKeyUseCases::new(api_key_repo.clone(), plan_repo.clone());
        let model_access =
            ModelAccessUseCases::new(plan_repo.clone(), self.registry.premium_ids());
        let gateway = GatewaySettings {
            vendor_timeout: Duration::from_secs(5),
            stream_idle_timeout: Duration::from_secs(5),
        };
        let chat_gateway = ChatGatewayUseCases::new(
            api_key_use_cases.clone(),
            model_access,
            UsageLedger::new(usage_repo.clone()),
            Arc::new(self.registry),
            gateway,
        );

        // Create minimal config for testing
        let config = Arc::new(AppConfig {
            session_secret: SecretString::new(TEST_SESSION_SECRET.into()),
            session_audience: None,
            cors_origin: HeaderValue::from_static("http://localhost:3000"),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            database_url: String::new(),
            database_max_connections: 1,
            redis_url: String::new(),
            rate_limit_window_secs: 3600,
            rate_limit_rules: default_rules(),
            trust_proxy: false,
            gateway,
            log_file: String::new(),
            providers: ProviderSettings::default(),
        });

        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(InMemoryRateLimiter::permissive()));

        let app_state = AppState {
            config,
            api_key_use_cases: Arc::new(api_key_use_cases),
            chat_gateway: Arc::new(chat_gateway),
            rate_limiter,
        };

        (
            app_state,
            TestMocks {
                api_keys: api_key_repo,
                plans: plan_repo,
                usage: usage_repo,
            },
        )
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
