use crate::dialect::{Dialect, DialectCore, base_fields, dialect_accessors, fetch_json};
use crate::error::SocialResult;
use crate::http::HttpRequest;
use crate::profile::{required_id, string_at};
use crate::types::TokenSet;
use async_trait::async_trait;
use ras_identity_core::{IdentityFields, ProviderKey};
use serde_json::Value;

pub const DEFAULT_HOST: &str = "https://gitlab.com";

/// GitLab.com or a self-hosted GitLab instance.
pub struct GitlabDialect {
    core: DialectCore,
    host: String,
}

impl GitlabDialect {
    pub fn new(core: DialectCore) -> Self {
        Self {
            core: core.with_default_scopes(&["read_user"]),
            host: DEFAULT_HOST.to_string(),
        }
    }

    /// Points the dialect at a self-hosted instance. Blank hosts are ignored.
    pub fn with_host(mut self, host: &str) -> Self {
        let host = host.trim().trim_end_matches('/');
        if !host.is_empty() {
            self.host = host.to_string();
        }
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl Dialect for GitlabDialect {
    dialect_accessors!(ProviderKey::Gitlab);

    fn authorization_endpoint(&self) -> String {
        format!("{}/oauth/authorize", self.host)
    }

    fn token_endpoint(&self) -> String {
        format!("{}/oauth/token", self.host)
    }

    fn scope_separator(&self) -> &'static str {
        " "
    }

    async fn fetch_raw_profile(&self, tokens: &TokenSet) -> SocialResult<Value> {
        let request = HttpRequest::get(format!("{}/api/v4/user", self.host))
            .query([("access_token", tokens.access_token.as_str())]);
        fetch_json(self.http(), self.provider(), request).await
    }

    fn normalize_profile(&self, raw: Value, tokens: &TokenSet) -> SocialResult<IdentityFields> {
        let external_id = required_id(self.provider(), &raw, "id")?;
        let mut fields = base_fields(self.provider(), external_id, tokens);
        fields.nickname = string_at(&raw, "username");
        fields.display_name = string_at(&raw, "name");
        fields.email = string_at(&raw, "email");
        fields.avatar_url = string_at(&raw, "avatar_url");
        fields.raw_profile = raw;
        Ok(fields)
    }
}
