//! Social login error types.

use ras_identity_core::{IdentityError, ProviderKey};
use thiserror::Error;

pub type SocialResult<T> = Result<T, SocialError>;

#[derive(Debug, Error)]
pub enum SocialError {
    /// The round-tripped state is missing, empty or does not match the one
    /// issued. The caller has to restart the flow.
    #[error("Invalid state parameter")]
    InvalidState,

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Missing authorization code")]
    MissingAuthorizationCode,

    #[error("Authorization denied by provider: {0}")]
    AuthorizationDenied(String),

    /// Transport failure, timeout or non-2xx status from a provider endpoint.
    #[error("Request to {provider} endpoint {endpoint} failed: {message}")]
    ProviderCommunication {
        provider: ProviderKey,
        endpoint: String,
        message: String,
    },

    /// A required field is missing from a provider payload.
    #[error("Malformed {provider} response: missing or invalid `{field}`")]
    MalformedResponse {
        provider: ProviderKey,
        field: String,
    },

    #[error("Request signing failed: {0}")]
    SigningError(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] IdentityError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl SocialError {
    pub(crate) fn malformed(provider: ProviderKey, field: impl Into<String>) -> Self {
        SocialError::MalformedResponse {
            provider,
            field: field.into(),
        }
    }
}

impl From<config::ConfigError> for SocialError {
    fn from(err: config::ConfigError) -> Self {
        SocialError::ConfigError(err.to_string())
    }
}
