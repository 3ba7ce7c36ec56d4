use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};

// ============================================================================
// Dashboard Session Claims
// ============================================================================

/// Claims of a dashboard session token. These are distinct from gateway API keys.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

pub fn issue_session(
    user_id: Uuid,
    secret: &SecretString,
    audience: Option<&str>,
    ttl: Duration,
) -> AppResult<String> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let claims = SessionClaims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + ttl.whole_seconds(),
        aud: audience.map(str::to_string),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.to_string()))
}

/// Verify a session token and return the account it belongs to.
///
/// The audience is only checked when one is configured.
pub fn verify_session(
    token: &str,
    secret: &SecretString,
    audience: Option<&str>,
) -> AppResult<Uuid> {
    let mut validation = Validation::new(Algorithm::HS256);
    match audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }

    let claims = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "Session token rejected");
        AppError::InvalidCredentials
    })?;

    Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidCredentials)
}
