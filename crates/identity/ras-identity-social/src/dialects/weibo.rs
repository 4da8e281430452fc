use crate::dialect::{
    Dialect, DialectCore, base_fields, default_token_fields, dialect_accessors, fetch_json,
};
use crate::error::{SocialError, SocialResult};
use crate::http::HttpRequest;
use crate::profile::{required_id, string_at};
use crate::types::TokenSet;
use async_trait::async_trait;
use ras_identity_core::{IdentityFields, ProviderKey};
use serde_json::Value;

const UID_URL: &str = "https://api.weibo.com/2/account/get_uid.json";
const USER_URL: &str = "https://api.weibo.com/2/users/show.json";

pub struct WeiboDialect {
    core: DialectCore,
}

impl WeiboDialect {
    pub fn new(core: DialectCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl Dialect for WeiboDialect {
    dialect_accessors!(ProviderKey::Weibo);

    fn authorization_endpoint(&self) -> String {
        "https://api.weibo.com/oauth2/authorize".to_string()
    }

    fn token_endpoint(&self) -> String {
        "https://api.weibo.com/oauth2/access_token".to_string()
    }

    /// POST with the token fields in the query string and an empty body.
    fn token_request(&self, code: &str) -> SocialResult<HttpRequest> {
        Ok(HttpRequest::post(self.token_endpoint())
            .query(default_token_fields(self.settings(), code)))
    }

    /// Resolves the uid of the token owner, then loads that user.
    async fn fetch_raw_profile(&self, tokens: &TokenSet) -> SocialResult<Value> {
        let token = tokens.access_token.as_str();
        let uid_body = fetch_json(
            self.http(),
            self.provider(),
            HttpRequest::get(UID_URL).query([("access_token", token)]),
        )
        .await?;
        let uid = string_at(&uid_body, "uid")
            .ok_or_else(|| SocialError::malformed(self.provider(), "uid"))?;

        let request = HttpRequest::get(USER_URL)
            .query([("access_token", token), ("uid", uid.as_str())]);
        fetch_json(self.http(), self.provider(), request).await
    }

    fn normalize_profile(&self, raw: Value, tokens: &TokenSet) -> SocialResult<IdentityFields> {
        let external_id = required_id(self.provider(), &raw, "idstr")?;
        let mut fields = base_fields(self.provider(), external_id, tokens);
        fields.nickname = string_at(&raw, "screen_name");
        fields.display_name = string_at(&raw, "name");
        fields.avatar_url = string_at(&raw, "avatar_hd");
        fields.raw_profile = raw;
        Ok(fields)
    }
}
