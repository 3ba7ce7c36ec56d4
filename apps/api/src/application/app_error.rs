use switchboard_types::{ErrorEnvelope, ErrorType};
use thiserror::Error;

use crate::application::ports::provider::ProviderError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Too many requests. Please slow down.")]
    RateLimited,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    KeyLimitReached(String),

    #[error("You didn't provide an API key. Provide it in the Authorization header (Bearer <key>).")]
    MissingApiKey,

    #[error("Incorrect API key provided.")]
    InvalidApiKey,

    #[error("Rate limit exceeded for this API key.")]
    KeyQuotaExceeded,

    #[error("Missing required parameter: '{0}'.")]
    MissingParameter(&'static str),

    #[error("Invalid '{param}': {reason}")]
    InvalidParameter { param: &'static str, reason: String },

    #[error("{0}")]
    ModelAccessDenied(String),

    #[error("The model '{model}' does not exist. Available models: {}", available.join(", "))]
    ModelNotFound {
        model: String,
        available: Vec<String>,
    },

    #[error("The model '{0}' does not support streaming.")]
    StreamingUnsupported(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    DatabaseError,
    InvalidSession,
    InvalidRequest,
    NotFound,
    InternalError,
    KeyLimitReached,
    MissingApiKey,
    InvalidApiKey,
    RateLimitExceeded,
    MissingRequiredParameter,
    InvalidParameter,
    ModelAccessDenied,
    ModelNotFound,
    StreamingNotSupported,
    InsufficientQuota,
    ServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "database_error",
            ErrorCode::InvalidSession => "invalid_session",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::KeyLimitReached => "key_limit_reached",
            ErrorCode::MissingApiKey => "missing_api_key",
            ErrorCode::InvalidApiKey => "invalid_api_key",
            ErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            ErrorCode::MissingRequiredParameter => "missing_required_parameter",
            ErrorCode::InvalidParameter => "invalid_parameter",
            ErrorCode::ModelAccessDenied => "model_access_denied",
            ErrorCode::ModelNotFound => "model_not_found",
            ErrorCode::StreamingNotSupported => "streaming_not_supported",
            ErrorCode::InsufficientQuota => "insufficient_quota",
            ErrorCode::ServerError => "server_error",
        }
    }
}

impl AppError {
    /// HTTP status this error is reported with.
    ///
    /// Upstream quota exhaustion is reported as 429, not 402.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Database(_) | AppError::Internal(_) => 500,
            AppError::RateLimited | AppError::KeyQuotaExceeded => 429,
            AppError::InvalidCredentials | AppError::MissingApiKey | AppError::InvalidApiKey => {
                401
            }
            AppError::InvalidInput(_)
            | AppError::KeyLimitReached(_)
            | AppError::MissingParameter(_)
            | AppError::InvalidParameter { .. }
            | AppError::ModelNotFound { .. }
            | AppError::StreamingUnsupported(_) => 400,
            AppError::NotFound => 404,
            AppError::ModelAccessDenied(_) => 403,
            AppError::Provider(err) => match err {
                ProviderError::RateLimited(_) | ProviderError::QuotaExceeded(_) => 429,
                _ => 500,
            },
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            AppError::Database(_) | AppError::Internal(_) => ErrorType::ServerError,
            AppError::RateLimited | AppError::KeyQuotaExceeded => ErrorType::RateLimitError,
            AppError::ModelAccessDenied(_) => ErrorType::InsufficientQuota,
            AppError::Provider(err) => match err {
                ProviderError::RateLimited(_) => ErrorType::RateLimitError,
                ProviderError::QuotaExceeded(_) => ErrorType::InsufficientQuota,
                _ => ErrorType::ServerError,
            },
            _ => ErrorType::InvalidRequestError,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::RateLimited | AppError::KeyQuotaExceeded => ErrorCode::RateLimitExceeded,
            AppError::InvalidCredentials => ErrorCode::InvalidSession,
            AppError::InvalidInput(_) => ErrorCode::InvalidRequest,
            AppError::NotFound => ErrorCode::NotFound,
            AppError::Internal(_) => ErrorCode::InternalError,
            AppError::KeyLimitReached(_) => ErrorCode::KeyLimitReached,
            AppError::MissingApiKey => ErrorCode::MissingApiKey,
            AppError::InvalidApiKey => ErrorCode::InvalidApiKey,
            AppError::MissingParameter(_) => ErrorCode::MissingRequiredParameter,
            AppError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            AppError::ModelAccessDenied(_) => ErrorCode::ModelAccessDenied,
            AppError::ModelNotFound { .. } => ErrorCode::ModelNotFound,
            AppError::StreamingUnsupported(_) => ErrorCode::StreamingNotSupported,
            AppError::Provider(err) => match err {
                ProviderError::RateLimited(_) => ErrorCode::RateLimitExceeded,
                ProviderError::QuotaExceeded(_) => ErrorCode::InsufficientQuota,
                _ => ErrorCode::ServerError,
            },
        }
    }

    pub fn param(&self) -> Option<&'static str> {
        match self {
            AppError::MissingParameter(param) => Some(param),
            AppError::InvalidParameter { param, .. } => Some(param),
            AppError::ModelAccessDenied(_) | AppError::ModelNotFound { .. } => Some("model"),
            AppError::StreamingUnsupported(_) => Some("stream"),
            _ => None,
        }
    }

    /// Message shown to API callers. Storage and internal failures are not detailed.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) => "Database operation failed".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(
            self.public_message(),
            self.error_type(),
            self.param(),
            Some(self.code().as_str()),
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
