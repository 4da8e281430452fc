use crate::dialect::{
    Dialect, DialectCore, base_fields, default_token_fields, dialect_accessors, fetch_json,
};
use crate::error::SocialResult;
use crate::http::HttpRequest;
use crate::profile::{required_id, string_at};
use crate::types::TokenSet;
use async_trait::async_trait;
use ras_identity_core::{IdentityFields, ProviderKey};
use serde_json::Value;

const USER_INFO_URL: &str = "https://openapi.baidu.com/rest/2.0/passport/users/getInfo";
const PORTRAIT_URL: &str = "http://tb.himg.baidu.com/sys/portrait/item/";

pub struct BaiduDialect {
    core: DialectCore,
}

impl BaiduDialect {
    pub fn new(core: DialectCore) -> Self {
        Self {
            core: core.with_default_scopes(&["basic"]),
        }
    }
}

#[async_trait]
impl Dialect for BaiduDialect {
    dialect_accessors!(ProviderKey::Baidu);

    fn authorization_endpoint(&self) -> String {
        "https://openapi.baidu.com/oauth/2.0/authorize".to_string()
    }

    fn token_endpoint(&self) -> String {
        "https://openapi.baidu.com/oauth/2.0/token".to_string()
    }

    /// Token fields travel in the query string of a GET.
    fn token_request(&self, code: &str) -> SocialResult<HttpRequest> {
        Ok(HttpRequest::get(self.token_endpoint())
            .accept_json()
            .query(default_token_fields(self.settings(), code)))
    }

    async fn fetch_raw_profile(&self, tokens: &TokenSet) -> SocialResult<Value> {
        let request = HttpRequest::get(USER_INFO_URL)
            .query([("access_token", tokens.access_token.as_str())]);
        fetch_json(self.http(), self.provider(), request).await
    }

    fn normalize_profile(&self, raw: Value, tokens: &TokenSet) -> SocialResult<IdentityFields> {
        let external_id = required_id(self.provider(), &raw, "openid")?;
        let mut fields = base_fields(self.provider(), external_id, tokens);
        fields.union_id = string_at(&raw, "userid");
        fields.nickname = string_at(&raw, "username");
        fields.display_name = string_at(&raw, "realname");
        fields.avatar_url =
            string_at(&raw, "portrait").map(|portrait| format!("{}{}", PORTRAIT_URL, portrait));
        fields.raw_profile = raw;
        Ok(fields)
    }
}
