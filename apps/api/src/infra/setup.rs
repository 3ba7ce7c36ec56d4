use std::fs::File;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{
        http::app_state::AppState,
        persistence::PostgresPersistence,
        providers::build_registry,
        tools::build_toolbox,
    },
    application::{
        token_estimator,
        use_cases::{
            api_key::{ApiKeyRepoTrait, ApiKeyUseCases},
            chat_gateway::ChatGatewayUseCases,
            model_access::{ModelAccessUseCases, UserPlanRepoTrait},
            usage::{UsageLedger, UsageRepoTrait},
        },
    },
    infra::{
        InfraError,
        config::AppConfig,
        db::{init_db, run_migrations},
        http_client::{try_build_client, try_build_vendor_client},
        rate_limit::{RateLimiterTrait, RedisRateLimiter},
    },
};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.log_file);

    let pool = init_db(&config.database_url, config.database_max_connections).await?;
    run_migrations(&pool).await?;
    let postgres_arc = Arc::new(PostgresPersistence::new(pool));

    let rate_limiter: Arc<dyn RateLimiterTrait> = Arc::new(
        RedisRateLimiter::new(
            &config.redis_url,
            config.rate_limit_window_secs,
            config.rate_limit_rules.clone(),
        )
        .await?,
    );

    let tool_client = try_build_client().map_err(InfraError::HttpClient)?;
    let vendor_client = try_build_vendor_client().map_err(InfraError::HttpClient)?;

    let toolbox = build_toolbox(&config.providers.tools, &tool_client);
    let (registry, report) = build_registry(&config.providers, &vendor_client, &toolbox);
    report.log();

    token_estimator::preload();

    let api_key_repo_arc = postgres_arc.clone() as Arc<dyn ApiKeyRepoTrait>;
    let plan_repo_arc = postgres_arc.clone() as Arc<dyn UserPlanRepoTrait>;
    let usage_repo_arc = postgres_arc.clone() as Arc<dyn UsageRepoTrait>;

    let api_key_use_cases = ApiKeyUseCases::new(api_key_repo_arc, plan_repo_arc.clone());
    let model_access = ModelAccessUseCases::new(plan_repo_arc, registry.premium_ids());

    let chat_gateway = ChatGatewayUseCases::new(
        api_key_use_cases.clone(),
        model_access,
        UsageLedger::new(usage_repo_arc),
        Arc::new(registry),
        config.gateway,
    );

    Ok(AppState {
        config: Arc::new(config),
        api_key_use_cases: Arc::new(api_key_use_cases),
        chat_gateway: Arc::new(chat_gateway),
        rate_limiter,
    })
}

pub fn init_tracing(log_file: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "switchboard_api=debug,switchboard=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false) // don’t show target (module path)
        .with_level(true) // show log level
        .pretty(); // human-friendly, with colors

    // File (structured JSON logs)
    let (json_layer, file_error) = match File::create(log_file) {
        Ok(file) => (
            Some(
                fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_current_span(true)
                    .with_span_list(true),
            ),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();

    if let Some(e) = file_error {
        tracing::warn!(path = %log_file, error = %e, "Cannot create log file, logging to console only");
    }
}
