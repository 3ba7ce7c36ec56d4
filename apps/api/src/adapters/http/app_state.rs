use std::sync::Arc;

use crate::{
    application::use_cases::{api_key::ApiKeyUseCases, chat_gateway::ChatGatewayUseCases},
    infra::{config::AppConfig, rate_limit::RateLimiterTrait},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub api_key_use_cases: Arc<ApiKeyUseCases>,
    pub chat_gateway: Arc<ChatGatewayUseCases>,
    pub rate_limiter: Arc<dyn RateLimiterTrait>,
}
