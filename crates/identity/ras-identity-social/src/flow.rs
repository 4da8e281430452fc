//! One authorization-code round trip against a single dialect.

use crate::dialect::Dialect;
use crate::error::{SocialError, SocialResult};
use crate::state::{SessionStore, generate_state, state_key};
use crate::types::{CallbackParams, TokenSet};
use ras_identity_core::{CanonicalIdentity, IdentityReconciler};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress of a flow. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FlowStage {
    Init,
    /// Redirect issued, state stored in the session.
    Redirected,
    CodeReceived,
    TokenExchanged,
    ProfileFetched,
    /// Identity persisted; the flow is complete.
    Reconciled,
}

/// Where to send the user, and the state token issued for the round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: Option<String>,
}

/// Drives one flow. A flow is short-lived: build one per redirect or per
/// callback and drop it afterwards.
pub struct AuthorizationFlow {
    dialect: Box<dyn Dialect>,
    session: Arc<dyn SessionStore>,
    reconciler: IdentityReconciler,
    stage: FlowStage,
    identity: Option<CanonicalIdentity>,
}

impl AuthorizationFlow {
    pub fn new(
        dialect: Box<dyn Dialect>,
        session: Arc<dyn SessionStore>,
        reconciler: IdentityReconciler,
    ) -> Self {
        Self {
            dialect,
            session,
            reconciler,
            stage: FlowStage::Init,
            identity: None,
        }
    }

    pub fn stage(&self) -> FlowStage {
        self.stage
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Scope, parameter and redirect customisation before the redirect.
    pub fn dialect_mut(&mut self) -> &mut dyn Dialect {
        self.dialect.as_mut()
    }

    /// Issues a fresh state token (unless stateless), stores it in the
    /// session and returns the provider authorization URL.
    pub async fn build_authorization_request(&mut self) -> SocialResult<AuthorizationRequest> {
        let provider = self.dialect.provider();

        let state = if self.dialect.is_stateless() {
            None
        } else {
            let state = generate_state();
            self.session.put(&state_key(provider), state.clone()).await;
            debug!("Issued state token for {}", provider);
            Some(state)
        };

        let url = self.dialect.authorization_url(state.as_deref())?;
        self.stage = FlowStage::Redirected;

        Ok(AuthorizationRequest { url, state })
    }

    /// Validates the callback, exchanges the code and reconciles the
    /// resulting identity. Later calls return the first result.
    pub async fn complete_authorization(
        &mut self,
        params: &CallbackParams,
    ) -> SocialResult<CanonicalIdentity> {
        if let Some(identity) = &self.identity {
            return Ok(identity.clone());
        }

        let provider = self.dialect.provider();

        if !self.dialect.is_stateless() {
            let expected = self.session.pull(&state_key(provider)).await;
            let valid = match (expected.as_deref(), params.get("state")) {
                (Some(expected), Some(incoming)) => !expected.is_empty() && expected == incoming,
                _ => false,
            };
            if !valid {
                warn!("State validation failed for {} callback", provider);
                return Err(SocialError::InvalidState);
            }
        }

        if let Some(error) = params.get("error") {
            let reason = match params.get("error_description") {
                Some(description) => format!("{}: {}", error, description),
                None => error.to_string(),
            };
            warn!("{} denied authorization: {}", provider, reason);
            return Err(SocialError::AuthorizationDenied(reason));
        }

        let code = params
            .get(self.dialect.code_parameter())
            .filter(|code| !code.is_empty())
            .ok_or(SocialError::MissingAuthorizationCode)?;
        self.stage = FlowStage::CodeReceived;

        let tokens = self.dialect.exchange_code(code).await?;
        self.stage = FlowStage::TokenExchanged;

        self.finish(tokens).await
    }

    /// Completes the flow with an access token obtained out of band.
    pub async fn complete_authorization_from_token(
        &mut self,
        access_token: &str,
    ) -> SocialResult<CanonicalIdentity> {
        self.complete_authorization_from_tokens(TokenSet::bearer(access_token))
            .await
    }

    /// Completes the flow with a token set obtained out of band.
    pub async fn complete_authorization_from_tokens(
        &mut self,
        tokens: TokenSet,
    ) -> SocialResult<CanonicalIdentity> {
        if let Some(identity) = &self.identity {
            return Ok(identity.clone());
        }

        self.stage = FlowStage::TokenExchanged;
        self.finish(tokens).await
    }

    async fn finish(&mut self, tokens: TokenSet) -> SocialResult<CanonicalIdentity> {
        let raw = self.dialect.fetch_raw_profile(&tokens).await?;
        self.stage = FlowStage::ProfileFetched;

        let fields = self.dialect.normalize_profile(raw, &tokens)?;
        let identity = self.reconciler.upsert(fields).await?;
        self.stage = FlowStage::Reconciled;

        info!(
            "Completed {} authorization for identity {}",
            identity.provider, identity.id
        );
        self.identity = Some(identity.clone());
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialects::PassportDialect;
    use crate::http::HttpMethod;
    use crate::state::InMemorySessionStore;
    use crate::testing::{ScriptedTransport, core_with};
    use ras_identity_core::{InMemoryIdentityStore, ProviderKey};

    const TOKEN_URL: &str = "https://www.larva.com.cn/oauth/token";
    const PROFILE_URL: &str = "https://www.larva.com.cn/api/v1/user/profile";

    struct Harness {
        flow: AuthorizationFlow,
        session: InMemorySessionStore,
        store: InMemoryIdentityStore,
        transport: Arc<ScriptedTransport>,
    }

    fn harness(transport: ScriptedTransport) -> Harness {
        let (core, transport) = core_with(transport);
        let session = InMemorySessionStore::new();
        let store = InMemoryIdentityStore::new();
        let flow = AuthorizationFlow::new(
            Box::new(PassportDialect::larva(core)),
            Arc::new(session.clone()),
            IdentityReconciler::new(Arc::new(store.clone())),
        );
        Harness {
            flow,
            session,
            store,
            transport,
        }
    }

    fn provider_responses() -> ScriptedTransport {
        ScriptedTransport::new()
            .post(TOKEN_URL, r#"{"access_token": "T", "expires_in": 3600}"#)
            .get(PROFILE_URL, r#"{"id": 42, "username": "larva"}"#)
    }

    #[tokio::test]
    async fn test_full_round_trip_walks_every_stage() {
        let mut h = harness(provider_responses());
        assert_eq!(h.flow.stage(), FlowStage::Init);

        let request = h.flow.build_authorization_request().await.unwrap();
        assert_eq!(h.flow.stage(), FlowStage::Redirected);
        let state = request.state.clone().unwrap();
        assert!(request.url.contains(&format!("state={}", state)));

        let params = CallbackParams::new().with("code", "abc").with("state", state);
        let identity = h.flow.complete_authorization(&params).await.unwrap();

        assert_eq!(h.flow.stage(), FlowStage::Reconciled);
        assert_eq!(identity.provider, ProviderKey::Larva);
        assert_eq!(identity.external_id, "42");
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_result_is_cached() {
        let mut h = harness(provider_responses());
        let request = h.flow.build_authorization_request().await.unwrap();
        let params = CallbackParams::new()
            .with("code", "abc")
            .with("state", request.state.unwrap());

        let first = h.flow.complete_authorization(&params).await.unwrap();
        let second = h.flow.complete_authorization(&params).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_mismatched_state_never_reaches_token_exchange() {
        let mut h = harness(provider_responses());
        h.flow.build_authorization_request().await.unwrap();

        let params = CallbackParams::new()
            .with("code", "abc")
            .with("state", "forged");
        let err = h.flow.complete_authorization(&params).await.unwrap_err();

        assert!(matches!(err, SocialError::InvalidState));
        assert!(h.transport.requests().is_empty());
        assert_eq!(h.flow.stage(), FlowStage::Redirected);
    }

    #[tokio::test]
    async fn test_state_without_issued_value_is_rejected() {
        let mut h = harness(provider_responses());

        let params = CallbackParams::new().with("code", "abc").with("state", "x");
        let err = h.flow.complete_authorization(&params).await.unwrap_err();

        assert!(matches!(err, SocialError::InvalidState));
        assert!(h.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_stored_state_is_rejected() {
        let mut h = harness(provider_responses());
        h.session
            .put(&state_key(ProviderKey::Larva), String::new())
            .await;

        let params = CallbackParams::new().with("code", "abc").with("state", "");
        let err = h.flow.complete_authorization(&params).await.unwrap_err();
        assert!(matches!(err, SocialError::InvalidState));
    }

    #[tokio::test]
    async fn test_state_is_single_use() {
        let mut h = harness(
            ScriptedTransport::new().on(HttpMethod::Post, TOKEN_URL, 400, "{}"),
        );
        let request = h.flow.build_authorization_request().await.unwrap();
        let params = CallbackParams::new()
            .with("code", "abc")
            .with("state", request.state.unwrap());

        let first = h.flow.complete_authorization(&params).await.unwrap_err();
        assert!(matches!(first, SocialError::ProviderCommunication { .. }));

        let second = h.flow.complete_authorization(&params).await.unwrap_err();
        assert!(matches!(second, SocialError::InvalidState));
    }

    #[tokio::test]
    async fn test_provider_error_and_missing_code() {
        let mut h = harness(provider_responses());
        let state = h.flow.build_authorization_request().await.unwrap().state.unwrap();
        let params = CallbackParams::new()
            .with("state", state)
            .with("error", "access_denied")
            .with("error_description", "The user denied access");

        let err = h.flow.complete_authorization(&params).await.unwrap_err();
        assert!(matches!(
            err,
            SocialError::AuthorizationDenied(reason) if reason.starts_with("access_denied")
        ));

        let state = h.flow.build_authorization_request().await.unwrap().state.unwrap();
        let params = CallbackParams::new().with("state", state);
        let err = h.flow.complete_authorization(&params).await.unwrap_err();
        assert!(matches!(err, SocialError::MissingAuthorizationCode));
        assert!(h.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_stateless_flow_skips_state() {
        let mut h = harness(provider_responses());
        h.flow.dialect_mut().set_stateless(true);

        let request = h.flow.build_authorization_request().await.unwrap();
        assert_eq!(request.state, None);
        assert!(!request.url.contains("state="));

        let params = CallbackParams::new().with("code", "abc");
        assert!(h.flow.complete_authorization(&params).await.is_ok());
    }

    #[tokio::test]
    async fn test_out_of_band_token_has_no_expiry() {
        let mut h = harness(provider_responses());
        let identity = h
            .flow
            .complete_authorization_from_token("oob-token")
            .await
            .unwrap();

        assert_eq!(identity.access_token.as_deref(), Some("oob-token"));
        assert_eq!(identity.token_expires_at, None);
        assert_eq!(
            h.transport
                .request_to(PROFILE_URL)
                .header_value("Authorization"),
            Some("Bearer oob-token")
        );
        assert!(
            h.transport
                .requests()
                .iter()
                .all(|r| r.endpoint() != TOKEN_URL)
        );
    }
}
