use crate::dialect::{
    Dialect, DialectCore, base_fields, dialect_accessors, fetch_json, fetch_optional,
};
use crate::error::SocialResult;
use crate::http::HttpRequest;
use crate::profile::{required_id, string_at};
use crate::types::TokenSet;
use async_trait::async_trait;
use ras_identity_core::{IdentityFields, ProviderKey};
use serde_json::Value;

const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";
const EMAIL_SCOPE: &str = "user:email";

pub struct GithubDialect {
    core: DialectCore,
}

impl GithubDialect {
    pub fn new(core: DialectCore) -> Self {
        Self {
            core: core.with_default_scopes(&[EMAIL_SCOPE]),
        }
    }

    fn api_request(&self, url: &str, token: &str) -> HttpRequest {
        HttpRequest::get(url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("Authorization", format!("token {}", token))
    }
}

/// The primary, verified address from the emails listing.
fn primary_email(emails: &Value) -> Option<String> {
    emails.as_array()?.iter().find_map(|email| {
        let primary = email.get("primary").and_then(Value::as_bool) == Some(true);
        let verified = email.get("verified").and_then(Value::as_bool) == Some(true);
        if primary && verified {
            string_at(email, "email")
        } else {
            None
        }
    })
}

#[async_trait]
impl Dialect for GithubDialect {
    dialect_accessors!(ProviderKey::Github);

    fn authorization_endpoint(&self) -> String {
        "https://github.com/login/oauth/authorize".to_string()
    }

    fn token_endpoint(&self) -> String {
        "https://github.com/login/oauth/access_token".to_string()
    }

    async fn fetch_raw_profile(&self, tokens: &TokenSet) -> SocialResult<Value> {
        let token = &tokens.access_token;
        let mut user = fetch_json(
            self.http(),
            self.provider(),
            self.api_request(USER_URL, token),
        )
        .await?;

        if self.settings().scopes.contains(EMAIL_SCOPE) {
            let email = fetch_optional(
                self.http(),
                self.provider(),
                self.api_request(EMAILS_URL, token),
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
        let external_id = required_id(self.provider(), &raw, "id")?;
        let mut fields = base_fields(self.provider(), external_id, tokens);
        fields.nickname = string_at(&raw, "login");
        fields.display_name = string_at(&raw, "name");
        fields.email = string_at(&raw, "email");
        fields.avatar_url = string_at(&raw, "avatar_url");
        fields.raw_profile = raw;
        Ok(fields)
    }
}
