//! Social login for third-party OAuth2 providers.
//!
//! Each supported provider is a [`Dialect`]: a small set of endpoint, scope,
//! token and profile hooks over shared default behavior. An
//! [`AuthorizationFlow`] drives one round trip (redirect with a CSRF state,
//! callback, code exchange, profile fetch) and hands the normalized profile to
//! the [`IdentityReconciler`], which persists it as a [`CanonicalIdentity`].
//! [`SocialService`] ties a configured [`DialectRegistry`] to a store for
//! callers.

mod config;
mod dialect;
pub mod dialects;
mod error;
mod flow;
mod http;
mod profile;
mod registry;
mod service;
mod signing;
mod state;
mod types;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use config::{
    DEFAULT_CONFIG_FILE, MAX_HTTP_TIMEOUT_SECONDS, MAX_STATE_TTL_SECONDS, ProviderConfig,
    SocialConfig,
};
pub use dialect::{
    Dialect, DialectCore, DialectSettings, base_fields, build_url, default_authorization_parameters,
    default_token_fields, default_token_request, fetch_json, fetch_optional, remove_param,
    set_param,
};
pub use error::{SocialError, SocialResult};
pub use flow::{AuthorizationFlow, AuthorizationRequest, FlowStage};
pub use http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use registry::{DialectConstructor, DialectRegistry};
pub use service::SocialService;
pub use signing::{RsaSigner, canonical_message, hmac_sha256_hex};
pub use state::{InMemorySessionStore, STATE_LENGTH, SessionStore, generate_state, state_key};
pub use types::{CallbackParams, DEFAULT_EXPIRES_IN, MAX_EXPIRES_IN, Scopes, TokenSet};

// Re-export common types for convenience
pub use ras_identity_core::{
    AccountId, CanonicalIdentity, IdentityFields, IdentityReconciler, IdentityStore,
    InMemoryIdentityStore, ProviderKey,
};
