use crate::dialect::{Dialect, DialectCore, base_fields, dialect_accessors, fetch_json};
use crate::error::SocialResult;
use crate::http::HttpRequest;
use crate::profile::{required_id, string_at};
use crate::types::TokenSet;
use async_trait::async_trait;
use ras_identity_core::{IdentityFields, ProviderKey};
use serde_json::Value;

const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// Google sign-in through the OpenID Connect userinfo endpoint.
pub struct GoogleDialect {
    core: DialectCore,
}

impl GoogleDialect {
    pub fn new(core: DialectCore) -> Self {
        Self {
            core: core.with_default_scopes(&["openid", "email", "profile"]),
        }
    }
}

#[async_trait]
impl Dialect for GoogleDialect {
    dialect_accessors!(ProviderKey::Google);

    fn authorization_endpoint(&self) -> String {
        "https://accounts.google.com/o/oauth2/v2/auth".to_string()
    }

    fn token_endpoint(&self) -> String {
        "https://oauth2.googleapis.com/token".to_string()
    }

    fn scope_separator(&self) -> &'static str {
        " "
    }

    async fn fetch_raw_profile(&self, tokens: &TokenSet) -> SocialResult<Value> {
        let request = HttpRequest::get(USERINFO_URL)
            .accept_json()
            .bearer_auth(&tokens.access_token);
        fetch_json(self.http(), self.provider(), request).await
    }

    fn normalize_profile(&self, raw: Value, tokens: &TokenSet) -> SocialResult<IdentityFields> {
        let external_id = required_id(self.provider(), &raw, "sub")?;
        let mut fields = base_fields(self.provider(), external_id, tokens);
        fields.display_name = string_at(&raw, "name");
        fields.nickname = string_at(&raw, "given_name");
        fields.email = string_at(&raw, "email");
        fields.avatar_url = string_at(&raw, "picture");
        fields.raw_profile = raw;
        Ok(fields)
    }
}
