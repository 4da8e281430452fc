use crate::dialect::{
    Dialect, DialectCore, base_fields, default_token_request, dialect_accessors, fetch_json,
    fetch_optional,
};
use crate::error::SocialResult;
use crate::http::HttpRequest;
use crate::profile::{required_id, string_at};
use crate::types::TokenSet;
use async_trait::async_trait;
use ras_identity_core::{IdentityFields, ProviderKey};
use serde_json::Value;

const USER_URL: &str = "https://api.bitbucket.org/2.0/user";
const EMAILS_URL: &str = "https://api.bitbucket.org/2.0/user/emails";

pub struct BitbucketDialect {
    core: DialectCore,
}

impl BitbucketDialect {
    pub fn new(core: DialectCore) -> Self {
        Self {
            core: core.with_default_scopes(&["email"]),
        }
    }
}

fn primary_email(emails: &Value) -> Option<String> {
    emails.get("values")?.as_array()?.iter().find_map(|email| {
        let is_email = email.get("type").and_then(Value::as_str) == Some("email");
        let primary = email.get("is_primary").and_then(Value::as_bool) == Some(true);
        let confirmed = email.get("is_confirmed").and_then(Value::as_bool) == Some(true);
        (is_email && primary && confirmed)
            .then(|| string_at(email, "email"))
            .flatten()
    })
}

#[async_trait]
impl Dialect for BitbucketDialect {
    dialect_accessors!(ProviderKey::Bitbucket);

    fn authorization_endpoint(&self) -> String {
        "https://bitbucket.org/site/oauth2/authorize".to_string()
    }

    fn token_endpoint(&self) -> String {
        "https://bitbucket.org/site/oauth2/access_token".to_string()
    }

    fn scope_separator(&self) -> &'static str {
        " "
    }

    fn token_request(&self, code: &str) -> SocialResult<HttpRequest> {
        let settings = self.settings();
        Ok(default_token_request(self, code)
            .basic_auth(&settings.client_id, &settings.client_secret))
    }

    async fn fetch_raw_profile(&self, tokens: &TokenSet) -> SocialResult<Value> {
        let token = [("access_token", tokens.access_token.as_str())];
        let mut user = fetch_json(
            self.http(),
            self.provider(),
            HttpRequest::get(USER_URL).query(token),
        )
        .await?;

        if self.settings().scopes.contains("email") {
            let email = fetch_optional(
                self.http(),
                self.provider(),
                HttpRequest::get(EMAILS_URL).query(token),
            )
            .await
            .and_then(|emails| primary_email(&emails));

            if let Value::Object(map) = &mut user {
                map.insert("email".to_string(), email.map_or(Value::Null, Value::String));
            }
        }

        Ok(user)
    }

    fn normalize_profile(&self, raw: Value, tokens: &TokenSet) -> SocialResult<IdentityFields> {
        let external_id = required_id(self.provider(), &raw, "uuid")?;
        let mut fields = base_fields(self.provider(), external_id, tokens);
        fields.nickname = string_at(&raw, "username");
        fields.display_name = string_at(&raw, "display_name");
        fields.email = string_at(&raw, "email");
        fields.avatar_url = string_at(&raw, "links.avatar.href");
        fields.raw_profile = raw;
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedTransport, complete, core_with};

    const TOKEN_URL: &str = "https://bitbucket.org/site/oauth2/access_token";

    #[tokio::test]
    async fn test_token_request_uses_basic_auth() {
        let transport = ScriptedTransport::new()
            .post(TOKEN_URL, r#"{"access_token": "T"}"#)
            .get(
                USER_URL,
                r#"{"uuid": "{a1b2}", "username": "evzijst", "display_name": "Erik",
                    "links": {"avatar": {"href": "https://bitbucket.org/account/evzijst/avatar/"}}}"#,
            )
            .get(
                EMAILS_URL,
                r#"{"values": [
                    {"type": "email", "email": "alias@example.com", "is_primary": false, "is_confirmed": true},
                    {"type": "email", "email": "erik@example.com", "is_primary": true, "is_confirmed": true}
                ]}"#,
            );
        let (core, transport) = core_with(transport);
        let fields = complete(&BitbucketDialect::new(core), "c").await;

        let token_request = transport.request_to(TOKEN_URL);
        assert_eq!(
            token_request.basic_auth,
            Some(("client-id".to_string(), "client-secret".to_string()))
        );
        assert_eq!(token_request.header_value("Accept"), Some("application/json"));

        assert_eq!(fields.external_id, "{a1b2}");
        assert_eq!(fields.display_name.as_deref(), Some("Erik"));
        assert_eq!(fields.email.as_deref(), Some("erik@example.com"));
        assert_eq!(
            fields.avatar_url.as_deref(),
            Some("https://bitbucket.org/account/evzijst/avatar/")
        );
    }

    #[tokio::test]
    async fn test_unconfirmed_email_is_ignored() {
        let transport = ScriptedTransport::new()
            .post(TOKEN_URL, r#"{"access_token": "T"}"#)
            .get(USER_URL, r#"{"uuid": "{a1b2}", "username": "evzijst"}"#)
            .get(
                EMAILS_URL,
                r#"{"values": [{"type": "email", "email": "x@example.com", "is_primary": true, "is_confirmed": false}]}"#,
            );
        let (core, _) = core_with(transport);
        let fields = complete(&BitbucketDialect::new(core), "c").await;

        assert_eq!(fields.email, None);
        assert_eq!(fields.avatar_url, None);
    }
}
