//! Social login configuration.
//!
//! Settings are layered the usual way:
//! - an optional TOML file (`SOCIAL_CONFIG_FILE`, default `social.toml`)
//! - environment variables prefixed with `SOCIAL`, using `__` for nesting,
//!   e.g. `SOCIAL__PROVIDERS__GITHUB__CLIENT_ID`
//!
//! Environment variables take precedence over file values.

use crate::error::{SocialError, SocialResult};
use config::{Config as ConfigBuilder, Environment, File};
use ras_identity_core::ProviderKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "social.toml";

pub const MAX_HTTP_TIMEOUT_SECONDS: u64 = 600;
pub const MAX_STATE_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Top-level social login configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    /// Application base URL that root-relative redirects resolve against.
    pub base_url: Option<String>,

    /// Timeout for every provider request
    pub http_timeout_seconds: u64,

    /// How long an issued state token stays valid
    pub state_ttl_seconds: u64,

    /// Provider settings keyed by provider name (`github`, `wechat_web`, ...)
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            http_timeout_seconds: 30,
            state_ttl_seconds: 600, // 10 minutes
            providers: HashMap::new(),
        }
    }
}

/// Credentials and options of one provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub client_id: String,

    /// Client secret, or the RSA private key for providers that sign requests.
    pub client_secret: String,

    /// Absolute callback URL, or a path resolved against `base_url`
    pub redirect: String,

    /// Replaces the provider's default scopes when set
    pub scopes: Option<Vec<String>>,

    /// Disables the state check. Only for server-to-server flows.
    pub stateless: bool,

    /// Self-hosted instance base URL
    pub host: Option<String>,

    /// Provider-specific extension fields
    pub extra: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect: redirect.into(),
            ..Default::default()
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn stateless(mut self, stateless: bool) -> Self {
        self.stateless = stateless;
        self
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Reads a boolean extension field (`true`, `1`, `yes`, `on`).
    pub fn extra_flag(&self, key: &str) -> bool {
        matches!(
            self.extra(key).map(str::to_ascii_lowercase).as_deref(),
            Some("true" | "1" | "yes" | "on")
        )
    }

    pub fn validate(&self, name: &str) -> SocialResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(SocialError::ConfigError(format!(
                "Provider {} is missing client_id",
                name
            )));
        }
        if self.client_secret.trim().is_empty() {
            return Err(SocialError::ConfigError(format!(
                "Provider {} is missing client_secret",
                name
            )));
        }
        Ok(())
    }
}

impl SocialConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads from `SOCIAL_CONFIG_FILE` (or `social.toml`) and the environment.
    pub fn load() -> SocialResult<Self> {
        let config_path = std::env::var("SOCIAL_CONFIG_FILE")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Loads from `path` when it exists, then applies environment overrides.
    pub fn load_from(path: &Path) -> SocialResult<Self> {
        let mut builder = ConfigBuilder::builder();

        if path.exists() {
            info!("Loading social login configuration from {}", path.display());
            builder = builder.add_source(File::from(path));
        } else {
            debug!("No config file found at {}, using defaults", path.display());
        }

        builder = builder.add_source(
            Environment::with_prefix("SOCIAL")
                .separator("__")
                .try_parsing(true),
        );

        let settings: SocialConfig = builder.build()?.try_deserialize()?;
        settings.validate()?;

        info!(
            "Configured social login providers: {:?}",
            settings.providers.keys().collect::<Vec<_>>()
        );
        Ok(settings)
    }

    pub fn with_provider(mut self, name: impl Into<String>, provider: ProviderConfig) -> Self {
        self.providers
            .insert(name.into().to_ascii_lowercase(), provider);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    pub fn with_state_ttl(mut self, seconds: u64) -> Self {
        self.state_ttl_seconds = seconds;
        self
    }

    pub fn provider(&self, key: ProviderKey) -> Option<&ProviderConfig> {
        self.providers.get(key.as_str())
    }

    pub fn validate(&self) -> SocialResult<()> {
        if !(1..=MAX_HTTP_TIMEOUT_SECONDS).contains(&self.http_timeout_seconds) {
            return Err(SocialError::ConfigError(format!(
                "HTTP timeout must be between 1 and {} seconds",
                MAX_HTTP_TIMEOUT_SECONDS
            )));
        }

        if !(1..=MAX_STATE_TTL_SECONDS).contains(&self.state_ttl_seconds) {
            return Err(SocialError::ConfigError(format!(
                "State TTL must be between 1 and {} seconds",
                MAX_STATE_TTL_SECONDS
            )));
        }

        if let Some(base_url) = &self.base_url {
            Url::parse(base_url).map_err(|e| {
                SocialError::ConfigError(format!("Invalid base_url {}: {}", base_url, e))
            })?;
        }

        for (name, provider) in &self.providers {
            name.parse::<ProviderKey>()
                .map_err(|e| SocialError::ConfigError(e.to_string()))?;
            provider.validate(name)?;
        }

        Ok(())
    }

    /// Resolves a configured redirect: absolute URLs pass through, paths
    /// starting with `/` are joined to `base_url`.
    pub fn resolve_redirect(&self, redirect: &str) -> SocialResult<String> {
        if !redirect.starts_with('/') {
            return Ok(redirect.to_string());
        }

        let base_url = self.base_url.as_deref().ok_or_else(|| {
            SocialError::ConfigError(format!(
                "Relative redirect {} requires base_url",
                redirect
            ))
        })?;

        let resolved = format!("{}{}", base_url.trim_end_matches('/'), redirect);
        Url::parse(&resolved)?;
        Ok(resolved)
    }
}
