//! End-to-end flows through the service facade.

#[cfg(test)]
mod integration_tests {
    use crate::testing::{ScriptedTransport, query_of};
    use crate::{
        CallbackParams, DialectRegistry, InMemorySessionStore, ProviderConfig, SessionStore,
        SocialConfig, SocialError, SocialService,
    };
    use chrono::{Duration, Utc};
    use ras_identity_core::{InMemoryIdentityStore, ProviderKey};
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gitlab_config(mock_server: &MockServer) -> SocialConfig {
        SocialConfig::new()
            .with_base_url("http://localhost:3000")
            .with_http_timeout(5)
            .with_provider(
                "gitlab",
                ProviderConfig::new("gitlab_client", "gitlab_secret", "/auth/gitlab/callback")
                    .with_host(format!("{}/", mock_server.uri())),
            )
    }

    async fn setup_gitlab_server() -> (MockServer, SocialService, InMemoryIdentityStore) {
        let mock_server = MockServer::start().await;
        let store = InMemoryIdentityStore::new();
        let service =
            SocialService::from_config(gitlab_config(&mock_server), Arc::new(store.clone()))
                .unwrap();
        (mock_server, service, store)
    }

    async fn mount_token_endpoint(mock_server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("client_secret=gitlab_secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "T",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(expected_calls)
            .mount(mock_server)
            .await;
    }

    async fn mount_user_endpoint(mock_server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .and(query_param("access_token", "T"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1001,
                "username": "alice",
                "name": "Alice Example",
                "avatar_url": "https://gitlab.example.com/uploads/alice.png"
            })))
            .mount(mock_server)
            .await;
    }

    /// Issues a state into `session` and returns the matching callback.
    async fn callback_for(
        service: &SocialService,
        session: Arc<dyn SessionStore>,
    ) -> CallbackParams {
        let url = service
            .authorization_url("gitlab", None, Vec::new(), session)
            .await
            .unwrap();
        CallbackParams::new()
            .with("code", "gitlab_code")
            .with("state", query_of(&url)["state"].clone())
    }

    #[tokio::test]
    async fn test_full_gitlab_flow() {
        let (mock_server, service, store) = setup_gitlab_server().await;
        mount_token_endpoint(&mock_server, 1).await;
        mount_user_endpoint(&mock_server).await;

        let session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let url = service
            .authorization_url(
                "gitlab",
                Some(vec!["read_user".to_string(), "openid".to_string()]),
                Vec::new(),
                session.clone(),
            )
            .await
            .unwrap();

        assert!(url.starts_with(&format!("{}/oauth/authorize?", mock_server.uri())));
        let params = query_of(&url);
        assert_eq!(params["client_id"], "gitlab_client");
        assert_eq!(
            params["redirect_uri"],
            "http://localhost:3000/auth/gitlab/callback"
        );
        assert_eq!(params["scope"], "read_user openid");

        let callback = CallbackParams::new()
            .with("code", "gitlab_code")
            .with("state", params["state"].clone());
        let identity = service
            .handle_callback("gitlab", &callback, session)
            .await
            .unwrap();

        assert_eq!(identity.provider, ProviderKey::Gitlab);
        assert_eq!(identity.external_id, "1001");
        assert_eq!(identity.nickname.as_deref(), Some("alice"));
        assert_eq!(identity.username(), Some("Alice Example"));
        assert_eq!(identity.access_token.as_deref(), Some("T"));
        assert_eq!(identity.refresh_token, None);
        assert_eq!(identity.email, None);

        let expires_at = identity.token_expires_at.unwrap();
        let expected = Utc::now() + Duration::seconds(3600);
        assert!((expires_at - expected).num_seconds().abs() < 30);

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_mismatched_state_never_reaches_token_endpoint() {
        let (mock_server, service, store) = setup_gitlab_server().await;
        mount_token_endpoint(&mock_server, 0).await;

        let session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let callback = callback_for(&service, session.clone())
            .await
            .with("state", "forged_state");

        let result = service.handle_callback("gitlab", &callback, session).await;
        assert!(matches!(result, Err(SocialError::InvalidState)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_callback_without_issued_state_never_reaches_token_endpoint() {
        let (mock_server, service, _) = setup_gitlab_server().await;
        mount_token_endpoint(&mock_server, 0).await;

        let callback = CallbackParams::new()
            .with("code", "gitlab_code")
            .with("state", "whatever");
        let result = service
            .handle_callback("gitlab", &callback, Arc::new(InMemorySessionStore::new()))
            .await;
        assert!(matches!(result, Err(SocialError::InvalidState)));

        let without_state = CallbackParams::new().with("code", "gitlab_code");
        let result = service
            .handle_callback(
                "gitlab",
                &without_state,
                Arc::new(InMemorySessionStore::new()),
            )
            .await;
        assert!(matches!(result, Err(SocialError::InvalidState)));
    }

    #[tokio::test]
    async fn test_states_are_scoped_per_session() {
        let (mock_server, service, _) = setup_gitlab_server().await;
        mount_token_endpoint(&mock_server, 0).await;

        let issuing: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let callback = callback_for(&service, issuing).await;

        let other: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let result = service.handle_callback("gitlab", &callback, other).await;
        assert!(matches!(result, Err(SocialError::InvalidState)));
    }

    #[tokio::test]
    async fn test_expired_state_is_rejected() {
        let (mock_server, service, _) = setup_gitlab_server().await;
        mount_token_endpoint(&mock_server, 0).await;

        let session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::with_ttl(0));
        let callback = callback_for(&service, session.clone()).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let result = service.handle_callback("gitlab", &callback, session).await;
        assert!(matches!(result, Err(SocialError::InvalidState)));
    }

    #[tokio::test]
    async fn test_denied_authorization_skips_token_exchange() {
        let (mock_server, service, _) = setup_gitlab_server().await;
        mount_token_endpoint(&mock_server, 0).await;

        let session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let url = service
            .authorization_url("gitlab", None, Vec::new(), session.clone())
            .await
            .unwrap();
        let callback = CallbackParams::new()
            .with("state", query_of(&url)["state"].clone())
            .with("error", "access_denied");

        let result = service.handle_callback("gitlab", &callback, session).await;
        assert!(matches!(
            result,
            Err(SocialError::AuthorizationDenied(reason)) if reason == "access_denied"
        ));
    }

    #[tokio::test]
    async fn test_token_endpoint_failure_is_provider_communication() {
        let (mock_server, service, store) = setup_gitlab_server().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let callback = callback_for(&service, session.clone()).await;
        let result = service.handle_callback("gitlab", &callback, session).await;

        match result {
            Err(SocialError::ProviderCommunication {
                provider, endpoint, ..
            }) => {
                assert_eq!(provider, ProviderKey::Gitlab);
                assert!(endpoint.ends_with("/oauth/token"));
            }
            other => panic!("Expected provider communication error, got {:?}", other),
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_profile_without_id_is_malformed() {
        let (mock_server, service, _) = setup_gitlab_server().await;
        mount_token_endpoint(&mock_server, 1).await;
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"username": "ghost"})),
            )
            .mount(&mock_server)
            .await;

        let session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let callback = callback_for(&service, session.clone()).await;
        let result = service.handle_callback("gitlab", &callback, session).await;

        assert!(matches!(
            result,
            Err(SocialError::MalformedResponse { provider: ProviderKey::Gitlab, field }) if field == "id"
        ));
    }

    #[tokio::test]
    async fn test_repeated_completions_keep_one_row() {
        let (mock_server, service, store) = setup_gitlab_server().await;
        mount_token_endpoint(&mock_server, 3).await;
        mount_user_endpoint(&mock_server).await;

        let session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let mut identities = Vec::new();
        for _ in 0..3 {
            let callback = callback_for(&service, session.clone()).await;
            identities.push(
                service
                    .handle_callback("gitlab", &callback, session.clone())
                    .await
                    .unwrap(),
            );
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert_eq!(store.len().await, 1);
        let first = &identities[0];
        let last = &identities[2];
        assert_eq!(first.id, last.id);
        assert_eq!(first.created_at, last.created_at);
        assert!(last.updated_at > first.updated_at);
    }

    #[tokio::test]
    async fn test_concurrent_completions_keep_one_row() {
        let (mock_server, service, store) = setup_gitlab_server().await;
        mount_token_endpoint(&mock_server, 2).await;
        mount_user_endpoint(&mock_server).await;

        let first_session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let second_session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let first_callback = callback_for(&service, first_session.clone()).await;
        let second_callback = callback_for(&service, second_session.clone()).await;

        let (first, second) = tokio::join!(
            service.handle_callback("gitlab", &first_callback, first_session),
            service.handle_callback("gitlab", &second_callback, second_session),
        );

        assert_eq!(first.unwrap().id, second.unwrap().id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_relink_survives_reauthentication() {
        let (mock_server, service, store) = setup_gitlab_server().await;
        mount_token_endpoint(&mock_server, 2).await;
        mount_user_endpoint(&mock_server).await;

        let session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let callback = callback_for(&service, session.clone()).await;
        let mut identity = service
            .handle_callback("gitlab", &callback, session.clone())
            .await
            .unwrap();
        service.connect(&mut identity, 42).await.unwrap();

        let callback = callback_for(&service, session.clone()).await;
        let again = service
            .handle_callback("gitlab", &callback, session)
            .await
            .unwrap();

        assert_eq!(again.linked_account_id, Some(42));
        assert_eq!(store.len().await, 1);
        assert_eq!(
            service
                .external_id_for_account(ProviderKey::Gitlab, 42)
                .await
                .unwrap()
                .as_deref(),
            Some("1001")
        );
    }

    #[tokio::test]
    async fn test_stateless_provider_accepts_callback_without_state() {
        let mock_server = MockServer::start().await;
        mount_token_endpoint(&mock_server, 1).await;
        mount_user_endpoint(&mock_server).await;

        let config = SocialConfig::new().with_provider(
            "gitlab",
            ProviderConfig::new("gitlab_client", "gitlab_secret", "https://app.example.com/cb")
                .with_host(mock_server.uri())
                .stateless(true),
        );
        let service =
            SocialService::from_config(config, Arc::new(InMemoryIdentityStore::new())).unwrap();

        let session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let url = service
            .authorization_url("gitlab", None, Vec::new(), session.clone())
            .await
            .unwrap();
        assert!(!query_of(&url).contains_key("state"));

        let callback = CallbackParams::new().with("code", "gitlab_code");
        let identity = service
            .handle_callback("gitlab", &callback, session)
            .await
            .unwrap();
        assert_eq!(identity.external_id, "1001");
    }

    #[tokio::test]
    async fn test_union_link_is_adopted_across_flows() {
        const BAIDU_TOKEN: &str = "https://openapi.baidu.com/oauth/2.0/token";
        const BAIDU_USER: &str = "https://openapi.baidu.com/rest/2.0/passport/users/getInfo";

        let store = InMemoryIdentityStore::new();
        let service_for = |openid: &str| {
            let transport = ScriptedTransport::new()
                .get(BAIDU_TOKEN, r#"{"access_token": "T"}"#)
                .get(
                    BAIDU_USER,
                    format!(r#"{{"openid": "{}", "userid": "U-1"}}"#, openid),
                );
            let config = SocialConfig::new().with_provider(
                "baidu",
                ProviderConfig::new("bd-id", "bd-secret", "https://app.example.com/cb"),
            );
            SocialService::new(
                DialectRegistry::builtin(config, Arc::new(transport)),
                Arc::new(store.clone()),
            )
        };

        let first_service = service_for("E1");
        let mut first = first_service
            .identity_from_token("baidu", "T")
            .await
            .unwrap();
        first_service.connect(&mut first, 42).await.unwrap();

        let second = service_for("E2")
            .identity_from_token("baidu", "T")
            .await
            .unwrap();

        assert_eq!(second.external_id, "E2");
        assert_eq!(second.union_id.as_deref(), Some("U-1"));
        assert_eq!(second.linked_account_id, Some(42));
        assert_ne!(second.id, first.id);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_unconfigured_and_unknown_providers() {
        let (_mock_server, service, _) = setup_gitlab_server().await;
        let session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());

        let unconfigured = service
            .authorization_url("github", None, Vec::new(), session.clone())
            .await;
        assert!(matches!(unconfigured, Err(SocialError::ConfigError(_))));

        let unknown = service
            .authorization_url("friendster", None, Vec::new(), session)
            .await;
        assert!(matches!(unknown, Err(SocialError::UnknownProvider(_))));
    }
}
