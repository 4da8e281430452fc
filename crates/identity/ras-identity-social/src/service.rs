//! Caller-facing entry point: one configured registry and reconciler shared by
//! every flow.

use crate::config::SocialConfig;
use crate::dialect::Dialect;
use crate::dialects::map_wechat_profile;
use crate::error::SocialResult;
use crate::flow::AuthorizationFlow;
use crate::http::ReqwestTransport;
use crate::registry::DialectRegistry;
use crate::state::SessionStore;
use crate::types::{CallbackParams, TokenSet};
use async_trait::async_trait;
use ras_identity_core::{
    AccountId, CanonicalIdentity, IdentityReconciler, IdentityStore, ProviderKey,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub struct SocialService {
    registry: DialectRegistry,
    reconciler: IdentityReconciler,
}

impl SocialService {
    pub fn new(registry: DialectRegistry, store: Arc<dyn IdentityStore>) -> Self {
        Self {
            registry,
            reconciler: IdentityReconciler::new(store),
        }
    }

    /// Built-in dialects over a reqwest transport configured from `config`.
    pub fn from_config(config: SocialConfig, store: Arc<dyn IdentityStore>) -> SocialResult<Self> {
        config.validate()?;
        let http = Arc::new(ReqwestTransport::new(config.http_timeout_seconds)?);
        Ok(Self::new(DialectRegistry::builtin(config, http), store))
    }

    pub fn registry(&self) -> &DialectRegistry {
        &self.registry
    }

    pub fn reconciler(&self) -> &IdentityReconciler {
        &self.reconciler
    }

    /// Starts a flow: issues the state into `session` and returns the URL to
    /// redirect the user to. `scopes` replaces the configured scopes.
    pub async fn authorization_url(
        &self,
        provider: &str,
        scopes: Option<Vec<String>>,
        parameters: Vec<(String, String)>,
        session: Arc<dyn SessionStore>,
    ) -> SocialResult<String> {
        let mut flow = self.flow(provider, session)?;

        let dialect = flow.dialect_mut();
        if let Some(scopes) = scopes {
            dialect.set_scopes(scopes);
        }
        if !parameters.is_empty() {
            dialect.with_parameters(parameters);
        }

        Ok(flow.build_authorization_request().await?.url)
    }

    /// Finishes a flow from the provider's redirect back to the application.
    pub async fn handle_callback(
        &self,
        provider: &str,
        params: &CallbackParams,
        session: Arc<dyn SessionStore>,
    ) -> SocialResult<CanonicalIdentity> {
        self.flow(provider, session)?
            .complete_authorization(params)
            .await
    }

    /// Reconciles the identity behind an access token obtained out of band.
    pub async fn identity_from_token(
        &self,
        provider: &str,
        access_token: &str,
    ) -> SocialResult<CanonicalIdentity> {
        self.identity_from_token_set(provider, TokenSet::bearer(access_token))
            .await
    }

    pub async fn identity_from_token_set(
        &self,
        provider: &str,
        tokens: TokenSet,
    ) -> SocialResult<CanonicalIdentity> {
        let dialect = self.registry.resolve(provider)?;
        AuthorizationFlow::new(dialect, Arc::new(NoSession), self.reconciler.clone())
            .complete_authorization_from_tokens(tokens)
            .await
    }

    /// Reconciles a WeChat official-account profile obtained out of band.
    pub async fn identity_from_wechat_mp_profile(
        &self,
        raw: Value,
    ) -> SocialResult<CanonicalIdentity> {
        let mut fields = map_wechat_profile(ProviderKey::Wechat, raw)?;
        fields.display_name = fields.nickname.clone();
        Ok(self.reconciler.upsert(fields).await?)
    }

    pub async fn connect(
        &self,
        identity: &mut CanonicalIdentity,
        account_id: AccountId,
    ) -> SocialResult<()> {
        Ok(self.reconciler.connect(identity, account_id).await?)
    }

    pub async fn disconnect(&self, identity: &mut CanonicalIdentity) -> SocialResult<()> {
        Ok(self.reconciler.disconnect(identity).await?)
    }

    /// The provider open id held by a local account, if it is linked.
    pub async fn external_id_for_account(
        &self,
        provider: ProviderKey,
        account_id: AccountId,
    ) -> SocialResult<Option<String>> {
        Ok(self
            .reconciler
            .external_id_for_account(provider, account_id)
            .await?)
    }

    pub fn supported_providers(&self) -> Vec<ProviderKey> {
        self.registry.supported_providers()
    }

    fn flow(&self, provider: &str, session: Arc<dyn SessionStore>) -> SocialResult<AuthorizationFlow> {
        let dialect = self.registry.resolve(provider)?;
        info!("Starting {} flow", dialect.provider());
        Ok(AuthorizationFlow::new(dialect, session, self.reconciler.clone()))
    }
}

/// Session for token-based completions, which never touch the state.
struct NoSession;

#[async_trait]
impl SessionStore for NoSession {
    async fn put(&self, _key: &str, _value: String) {}

    async fn pull(&self, _key: &str) -> Option<String> {
        None
    }
}
