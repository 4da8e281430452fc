//! The provider dialect contract and the shared OAuth2 behaviour dialects
//! compose.
//!
//! Every provider speaks a slightly different version of the authorization
//! code flow. A [`Dialect`] describes one provider: its endpoints, how it
//! formats scopes and authorization parameters, how the code is exchanged for
//! tokens, how the raw profile is fetched, and how that profile maps onto an
//! [`IdentityFields`] record. The default methods implement plain OAuth2 so a
//! dialect only overrides what its provider does differently.

use crate::error::SocialResult;
use crate::http::{HttpRequest, HttpTransport, send_checked};
use crate::profile::{decode_json, decode_object};
use crate::types::{Scopes, TokenSet};
use async_trait::async_trait;
use chrono::Utc;
use ras_identity_core::{IdentityFields, ProviderKey};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use url::Url;

/// Client credentials and per-flow options of a dialect instance.
#[derive(Debug, Clone, Default)]
pub struct DialectSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub scopes: Scopes,
    /// Skips the anti-CSRF state check. Only for flows that never pass
    /// through a browser.
    pub stateless: bool,
    /// Extra authorization parameters, merged over the standard ones.
    pub parameters: Vec<(String, String)>,
}

/// State shared by every dialect: settings plus the injected transport.
#[derive(Clone)]
pub struct DialectCore {
    pub settings: DialectSettings,
    pub http: Arc<dyn HttpTransport>,
}

impl DialectCore {
    pub fn new(settings: DialectSettings, http: Arc<dyn HttpTransport>) -> Self {
        Self { settings, http }
    }

    /// Applies a provider's default scopes unless scopes were configured.
    pub fn with_default_scopes(mut self, scopes: &[&str]) -> Self {
        if self.settings.scopes.is_empty() {
            self.settings.scopes = Scopes::new(scopes.iter().copied());
        }
        self
    }
}

#[async_trait]
pub trait Dialect: Send + Sync {
    fn provider(&self) -> ProviderKey;

    fn core(&self) -> &DialectCore;

    fn core_mut(&mut self) -> &mut DialectCore;

    fn authorization_endpoint(&self) -> String;

    fn token_endpoint(&self) -> String;

    fn scope_separator(&self) -> &'static str {
        ","
    }

    /// Name of the callback parameter carrying the authorization code.
    fn code_parameter(&self) -> &'static str {
        "code"
    }

    fn authorization_parameters(&self, state: Option<&str>) -> Vec<(String, String)> {
        default_authorization_parameters(self, state)
    }

    fn authorization_url(&self, state: Option<&str>) -> SocialResult<String> {
        build_url(
            &self.authorization_endpoint(),
            &self.authorization_parameters(state),
        )
    }

    fn token_request(&self, code: &str) -> SocialResult<HttpRequest> {
        Ok(default_token_request(self, code))
    }

    fn parse_token_response(&self, body: &str) -> SocialResult<TokenSet> {
        TokenSet::from_payload(self.provider(), decode_object(self.provider(), body)?)
    }

    async fn exchange_code(&self, code: &str) -> SocialResult<TokenSet> {
        let request = self.token_request(code)?;
        let response = send_checked(self.http(), self.provider(), request).await?;
        self.parse_token_response(&response.body)
    }

    /// Fetches the provider's profile payload, possibly over several calls.
    async fn fetch_raw_profile(&self, tokens: &TokenSet) -> SocialResult<Value>;

    /// Maps the raw profile onto canonical fields. Missing optional fields
    /// stay `None`; only a missing external id is an error.
    fn normalize_profile(&self, raw: Value, tokens: &TokenSet) -> SocialResult<IdentityFields>;

    fn settings(&self) -> &DialectSettings {
        &self.core().settings
    }

    fn http(&self) -> &dyn HttpTransport {
        self.core().http.as_ref()
    }

    fn is_stateless(&self) -> bool {
        self.settings().stateless
    }

    fn set_stateless(&mut self, stateless: bool) {
        self.core_mut().settings.stateless = stateless;
    }

    /// Replaces the requested scopes.
    fn set_scopes(&mut self, scopes: Vec<String>) {
        self.core_mut().settings.scopes = Scopes::new(scopes);
    }

    /// Adds scopes to the requested ones, keeping order and uniqueness.
    fn add_scopes(&mut self, scopes: Vec<String>) {
        self.core_mut().settings.scopes.extend(scopes);
    }

    fn with_parameters(&mut self, parameters: Vec<(String, String)>) {
        self.core_mut().settings.parameters = parameters;
    }

    fn set_redirect_url(&mut self, redirect_url: String) {
        self.core_mut().settings.redirect_url = redirect_url;
    }
}

/// The standard authorization parameters merged with the custom ones.
pub fn default_authorization_parameters<D: Dialect + ?Sized>(
    dialect: &D,
    state: Option<&str>,
) -> Vec<(String, String)> {
    let settings = dialect.settings();
    let mut params = vec![
        ("client_id".to_string(), settings.client_id.clone()),
        ("redirect_uri".to_string(), settings.redirect_url.clone()),
        (
            "scope".to_string(),
            settings.scopes.join(dialect.scope_separator()),
        ),
        ("response_type".to_string(), "code".to_string()),
    ];

    if let Some(state) = state {
        params.push(("state".to_string(), state.to_string()));
    }

    for (key, value) in &settings.parameters {
        set_param(&mut params, key, value.clone());
    }

    params
}

/// Form-encoded POST with the client secret, accepting JSON.
pub fn default_token_request<D: Dialect + ?Sized>(dialect: &D, code: &str) -> HttpRequest {
    let settings = dialect.settings();
    HttpRequest::post(dialect.token_endpoint())
        .accept_json()
        .form(default_token_fields(settings, code))
}

pub fn default_token_fields(settings: &DialectSettings, code: &str) -> Vec<(String, String)> {
    vec![
        ("grant_type".to_string(), "authorization_code".to_string()),
        ("client_id".to_string(), settings.client_id.clone()),
        ("client_secret".to_string(), settings.client_secret.clone()),
        ("code".to_string(), code.to_string()),
        ("redirect_uri".to_string(), settings.redirect_url.clone()),
    ]
}

/// Sets `key`, replacing an existing value in place.
pub fn set_param(params: &mut Vec<(String, String)>, key: &str, value: String) {
    match params.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value,
        None => params.push((key.to_string(), value)),
    }
}

pub fn remove_param(params: &mut Vec<(String, String)>, key: &str) {
    params.retain(|(k, _)| k != key);
}

pub fn build_url(base: &str, params: &[(String, String)]) -> SocialResult<String> {
    let mut url = Url::parse(base)?;
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    Ok(url.to_string())
}

/// Sends a profile request and decodes its JSON body.
pub async fn fetch_json(
    http: &dyn HttpTransport,
    provider: ProviderKey,
    request: HttpRequest,
) -> SocialResult<Value> {
    let response = send_checked(http, provider, request).await?;
    decode_json(provider, &response.body)
}

/// Secondary profile call whose failure only leaves a field empty.
pub async fn fetch_optional(
    http: &dyn HttpTransport,
    provider: ProviderKey,
    request: HttpRequest,
) -> Option<Value> {
    let endpoint = request.endpoint().to_string();
    match fetch_json(http, provider, request).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Optional {} call to {} failed: {}", provider, endpoint, e);
            None
        }
    }
}

/// Canonical fields carrying the token data, ready for profile mapping.
pub fn base_fields(
    provider: ProviderKey,
    external_id: String,
    tokens: &TokenSet,
) -> IdentityFields {
    let mut fields = IdentityFields::new(provider, external_id);
    fields.access_token = Some(tokens.access_token.clone());
    fields.refresh_token = tokens.refresh_token.clone();
    fields.token_expires_at = tokens.expires_at(Utc::now());
    fields
}

/// Implements the accessor half of [`Dialect`] for a struct with a `core`
/// field.
macro_rules! dialect_accessors {
    ($provider:expr) => {
        fn provider(&self) -> ras_identity_core::ProviderKey {
            $provider
        }

        fn core(&self) -> &$crate::dialect::DialectCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut $crate::dialect::DialectCore {
            &mut self.core
        }
    };
}

pub(crate) use dialect_accessors;
