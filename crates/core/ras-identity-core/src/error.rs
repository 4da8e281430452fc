use crate::ProviderKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Identity not found: {provider}/{external_id}")]
    NotFound {
        provider: ProviderKey,
        external_id: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type IdentityResult<T> = Result<T, IdentityError>;
