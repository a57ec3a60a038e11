//! Gateway error taxonomy and status mapping.
//!
//! Everything a request handler can fail with funnels into [`GatewayError`]; the HTTP
//! surface maps each variant to a status code and a uniform JSON body
//! `{error, error_type, provider?, model?, request_id?}`.  Errors raised inside the
//! tool-execute phase never reach this type — they are captured as tool results and fed
//! back to the model.

use thiserror::Error;

use crate::ledgerllm::auth::AuthError;
use crate::ledgerllm::memory::MemoryError;
use crate::ledgerllm::provider::ProviderError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("token expired")]
    AuthExpired,
    #[error("invalid credential: {0}")]
    AuthInvalid(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Expired => GatewayError::AuthExpired,
            AuthError::Invalid(message) => GatewayError::AuthInvalid(message),
            AuthError::System(message) => GatewayError::Internal(message),
        }
    }
}

impl GatewayError {
    /// HTTP status this error surfaces as.
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::AuthExpired | GatewayError::AuthInvalid(_) => 401,
            GatewayError::Forbidden(_) => 403,
            GatewayError::InvalidInput(_) => 400,
            GatewayError::Provider(ProviderError::Auth { .. }) => 401,
            GatewayError::Provider(ProviderError::RateLimit { .. }) => 429,
            GatewayError::Provider(ProviderError::ModelNotFound { .. }) => 404,
            GatewayError::Provider(ProviderError::Connection { .. }) => 502,
            GatewayError::Provider(ProviderError::Api { .. }) => 500,
            GatewayError::Memory(_) | GatewayError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable error kind for the JSON body.
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::AuthExpired => "auth_expired",
            GatewayError::AuthInvalid(_) => "auth_invalid",
            GatewayError::Forbidden(_) => "forbidden",
            GatewayError::InvalidInput(_) => "input_invalid",
            GatewayError::Provider(ProviderError::Auth { .. }) => "provider_auth",
            GatewayError::Provider(ProviderError::RateLimit { .. }) => "provider_rate_limit",
            GatewayError::Provider(ProviderError::ModelNotFound { .. }) => {
                "provider_model_not_found"
            }
            GatewayError::Provider(ProviderError::Connection { .. }) => "provider_connection",
            GatewayError::Provider(ProviderError::Api { .. }) => "provider_error",
            GatewayError::Memory(_) => "memory_error",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// Provider name when the failure originated in an adapter.
    pub fn provider(&self) -> Option<&str> {
        match self {
            GatewayError::Provider(err) => Some(err.provider()),
            _ => None,
        }
    }
}
