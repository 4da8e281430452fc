//! Resolves provider names to configured dialect instances.

use crate::config::{ProviderConfig, SocialConfig};
use crate::dialect::{Dialect, DialectCore, DialectSettings};
use crate::dialects::{
    AlipayDialect, BaiduDialect, BitbucketDialect, FacebookDialect, GithubDialect, GitlabDialect,
    GoogleDialect, LinkedinDialect, PassportDialect, QqDialect, WechatWebDialect, WeiboDialect,
};
use crate::error::{SocialError, SocialResult};
use crate::http::HttpTransport;
use crate::types::Scopes;
use ras_identity_core::ProviderKey;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds a dialect from its core and the provider's configuration, applying
/// any provider-specific options.
pub type DialectConstructor = fn(DialectCore, &ProviderConfig) -> SocialResult<Box<dyn Dialect>>;

/// Maps provider keys to dialect constructors and wires each resolved dialect
/// with its configuration and the shared transport. Read-only once built.
pub struct DialectRegistry {
    constructors: HashMap<ProviderKey, DialectConstructor>,
    config: SocialConfig,
    http: Arc<dyn HttpTransport>,
}

impl DialectRegistry {
    /// An empty registry.
    pub fn new(config: SocialConfig, http: Arc<dyn HttpTransport>) -> Self {
        Self {
            constructors: HashMap::new(),
            config,
            http,
        }
    }

    /// A registry with every built-in dialect.
    pub fn builtin(config: SocialConfig, http: Arc<dyn HttpTransport>) -> Self {
        let mut registry = Self::new(config, http);
        registry.register(ProviderKey::Larva, larva);
        registry.register(ProviderKey::Librespeed, librespeed);
        registry.register(ProviderKey::Weibo, weibo);
        registry.register(ProviderKey::Qq, qq);
        registry.register(ProviderKey::Alipay, alipay);
        registry.register(ProviderKey::Baidu, baidu);
        registry.register(ProviderKey::WechatWeb, wechat_web);
        registry.register(ProviderKey::Github, github);
        registry.register(ProviderKey::Facebook, facebook);
        registry.register(ProviderKey::Google, google);
        registry.register(ProviderKey::Linkedin, linkedin);
        registry.register(ProviderKey::Bitbucket, bitbucket);
        registry.register(ProviderKey::Gitlab, gitlab);
        registry
    }

    /// Adds or replaces the constructor for `provider`.
    pub fn register(&mut self, provider: ProviderKey, constructor: DialectConstructor) {
        self.constructors.insert(provider, constructor);
    }

    pub fn config(&self) -> &SocialConfig {
        &self.config
    }

    pub fn is_registered(&self, provider: ProviderKey) -> bool {
        self.constructors.contains_key(&provider)
    }

    /// Registered provider keys, in the canonical key order.
    pub fn supported_providers(&self) -> Vec<ProviderKey> {
        ProviderKey::ALL
            .into_iter()
            .filter(|key| self.is_registered(*key))
            .collect()
    }

    /// Builds a configured dialect for the provider named `name`.
    pub fn resolve(&self, name: &str) -> SocialResult<Box<dyn Dialect>> {
        let provider: ProviderKey = name
            .parse()
            .map_err(|_| SocialError::UnknownProvider(name.to_string()))?;

        let constructor = self
            .constructors
            .get(&provider)
            .ok_or_else(|| SocialError::UnknownProvider(name.to_string()))?;

        let provider_config = self.config.provider(provider).ok_or_else(|| {
            SocialError::ConfigError(format!("No configuration for provider {}", provider))
        })?;
        provider_config.validate(provider.as_str())?;

        let settings = DialectSettings {
            client_id: provider_config.client_id.clone(),
            client_secret: provider_config.client_secret.clone(),
            redirect_url: self.config.resolve_redirect(&provider_config.redirect)?,
            scopes: provider_config
                .scopes
                .as_ref()
                .map(|scopes| Scopes::new(scopes.iter().cloned()))
                .unwrap_or_default(),
            stateless: provider_config.stateless,
            parameters: Vec::new(),
        };

        if settings.stateless {
            warn!("Provider {} is configured stateless; state checks are disabled", provider);
        }

        let dialect = constructor(
            DialectCore::new(settings, self.http.clone()),
            provider_config,
        )?;
        info!("Resolved {} dialect", provider);
        Ok(dialect)
    }
}

fn larva(core: DialectCore, _: &ProviderConfig) -> SocialResult<Box<dyn Dialect>> {
    Ok(Box::new(PassportDialect::larva(core)))
}

fn librespeed(core: DialectCore, _: &ProviderConfig) -> SocialResult<Box<dyn Dialect>> {
    Ok(Box::new(PassportDialect::librespeed(core)))
}

fn weibo(core: DialectCore, _: &ProviderConfig) -> SocialResult<Box<dyn Dialect>> {
    Ok(Box::new(WeiboDialect::new(core)))
}

fn qq(core: DialectCore, config: &ProviderConfig) -> SocialResult<Box<dyn Dialect>> {
    Ok(Box::new(
        QqDialect::new(core).with_union_id(config.extra_flag("with_union_id")),
    ))
}

fn alipay(core: DialectCore, _: &ProviderConfig) -> SocialResult<Box<dyn Dialect>> {
    Ok(Box::new(AlipayDialect::new(core)?))
}

fn baidu(core: DialectCore, _: &ProviderConfig) -> SocialResult<Box<dyn Dialect>> {
    Ok(Box::new(BaiduDialect::new(core)))
}

fn wechat_web(core: DialectCore, _: &ProviderConfig) -> SocialResult<Box<dyn Dialect>> {
    Ok(Box::new(WechatWebDialect::new(core)))
}

fn github(core: DialectCore, _: &ProviderConfig) -> SocialResult<Box<dyn Dialect>> {
    Ok(Box::new(GithubDialect::new(core)))
}

fn facebook(core: DialectCore, config: &ProviderConfig) -> SocialResult<Box<dyn Dialect>> {
    let mut dialect = FacebookDialect::new(core);
    if let Some(version) = config.extra("graph_version") {
        dialect = dialect.with_graph_version(version);
    }
    if let Some(fields) = config.extra("fields") {
        dialect = dialect.with_fields(
            fields
                .split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty()),
        );
    }
    if config.extra_flag("popup") {
        dialect = dialect.as_popup();
    }
    if config.extra_flag("rerequest") {
        dialect = dialect.rerequest();
    }
    Ok(Box::new(dialect))
}

fn google(core: DialectCore, _: &ProviderConfig) -> SocialResult<Box<dyn Dialect>> {
    Ok(Box::new(GoogleDialect::new(core)))
}

fn linkedin(core: DialectCore, _: &ProviderConfig) -> SocialResult<Box<dyn Dialect>> {
    Ok(Box::new(LinkedinDialect::new(core)))
}

fn bitbucket(core: DialectCore, _: &ProviderConfig) -> SocialResult<Box<dyn Dialect>> {
    Ok(Box::new(BitbucketDialect::new(core)))
}

fn gitlab(core: DialectCore, config: &ProviderConfig) -> SocialResult<Box<dyn Dialect>> {
    Ok(Box::new(
        GitlabDialect::new(core).with_host(config.host.as_deref().unwrap_or_default()),
    ))
}
