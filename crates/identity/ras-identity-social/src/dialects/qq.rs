use crate::dialect::{Dialect, DialectCore, base_fields, default_token_fields, dialect_accessors};
use crate::error::{SocialError, SocialResult};
use crate::http::{HttpRequest, send_checked};
use crate::profile::{decode_form, decode_json, decode_object, required_id, string_at, strip_jsonp};
use crate::types::TokenSet;
use async_trait::async_trait;
use ras_identity_core::{IdentityFields, ProviderKey};
use serde_json::Value;

const ME_URL: &str = "https://graph.qq.com/oauth2.0/me";
const USER_INFO_URL: &str = "https://graph.qq.com/user/get_user_info";

pub struct QqDialect {
    core: DialectCore,
    with_union_id: bool,
}

impl QqDialect {
    pub fn new(core: DialectCore) -> Self {
        Self {
            core: core.with_default_scopes(&["get_user_info"]),
            with_union_id: false,
        }
    }

    /// Also asks the `me` endpoint for the cross-application union id.
    pub fn with_union_id(mut self, enabled: bool) -> Self {
        self.with_union_id = enabled;
        self
    }

    /// GETs a JSONP or JSON endpoint.
    async fn fetch_jsonp(&self, request: HttpRequest) -> SocialResult<Value> {
        let response = send_checked(self.http(), self.provider(), request).await?;
        decode_json(self.provider(), strip_jsonp(&response.body))
    }
}

#[async_trait]
impl Dialect for QqDialect {
    dialect_accessors!(ProviderKey::Qq);

    fn authorization_endpoint(&self) -> String {
        "https://graph.qq.com/oauth2.0/authorize".to_string()
    }

    fn token_endpoint(&self) -> String {
        "https://graph.qq.com/oauth2.0/token".to_string()
    }

    fn token_request(&self, code: &str) -> SocialResult<HttpRequest> {
        Ok(HttpRequest::get(self.token_endpoint()).query(default_token_fields(self.settings(), code)))
    }

    /// Successful exchanges answer `key=value&...`; failures come back as
    /// JSONP.
    fn parse_token_response(&self, body: &str) -> SocialResult<TokenSet> {
        let body = strip_jsonp(body);
        let payload = if body.starts_with('{') {
            decode_object(self.provider(), body)?
        } else {
            decode_form(body)
        };
        TokenSet::from_payload(self.provider(), payload)
    }

    async fn fetch_raw_profile(&self, tokens: &TokenSet) -> SocialResult<Value> {
        let token = tokens.access_token.as_str();

        let mut me_request = HttpRequest::get(ME_URL).query([("access_token", token)]);
        if self.with_union_id {
            me_request = me_request.query([("unionid", "1")]);
        }
        let me = self.fetch_jsonp(me_request).await?;
        let open_id = required_id(self.provider(), &me, "openid")?;
        let union_id = string_at(&me, "unionid");

        let user_request = HttpRequest::get(USER_INFO_URL).query([
            ("access_token", token),
            ("openid", open_id.as_str()),
            ("oauth_consumer_key", self.settings().client_id.as_str()),
        ]);
        let mut user = self.fetch_jsonp(user_request).await?;

        match user.get("ret").and_then(Value::as_i64) {
            Some(0) | None => {}
            Some(code) => {
                return Err(SocialError::ProviderCommunication {
                    provider: self.provider(),
                    endpoint: USER_INFO_URL.to_string(),
                    message: format!(
                        "ret {}: {}",
                        code,
                        string_at(&user, "msg").unwrap_or_default()
                    ),
                });
            }
        }

        if let Value::Object(map) = &mut user {
            map.insert("openid".to_string(), Value::String(open_id));
            map.insert(
                "unionid".to_string(),
                union_id.map_or(Value::Null, Value::String),
            );
        }

        Ok(user)
    }

    fn normalize_profile(&self, raw: Value, tokens: &TokenSet) -> SocialResult<IdentityFields> {
        let external_id = required_id(self.provider(), &raw, "openid")?;
        let mut fields = base_fields(self.provider(), external_id, tokens);
        fields.union_id = string_at(&raw, "unionid");
        fields.nickname = string_at(&raw, "nickname");
        fields.avatar_url = string_at(&raw, "figureurl_qq_2");
        fields.raw_profile = raw;
        Ok(fields)
    }
}
