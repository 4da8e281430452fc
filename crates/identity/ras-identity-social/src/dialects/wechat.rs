use crate::dialect::{
    Dialect, DialectCore, base_fields, default_authorization_parameters, dialect_accessors,
    fetch_json,
};
use crate::error::{SocialError, SocialResult};
use crate::http::HttpRequest;
use crate::profile::{required_id, string_at};
use crate::types::TokenSet;
use async_trait::async_trait;
use ras_identity_core::{IdentityFields, ProviderKey};
use serde_json::{Value, json};
use url::Url;

const USER_INFO_URL: &str = "https://api.weixin.qq.com/sns/userinfo";
const BASE_SCOPE: &str = "snsapi_base";

/// WeChat QR-code website login.
pub struct WechatWebDialect {
    core: DialectCore,
}

impl WechatWebDialect {
    pub fn new(core: DialectCore) -> Self {
        Self {
            core: core.with_default_scopes(&["snsapi_login"]),
        }
    }

    /// The openid travels with the token: in the exchange response, or in
    /// the raw payload of a token obtained out of band.
    fn open_id_for(&self, tokens: &TokenSet) -> SocialResult<String> {
        tokens
            .raw_str("openid")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SocialError::malformed(self.provider(), "openid"))
    }
}

#[async_trait]
impl Dialect for WechatWebDialect {
    dialect_accessors!(ProviderKey::WechatWeb);

    fn authorization_endpoint(&self) -> String {
        "https://open.weixin.qq.com/connect/qrconnect".to_string()
    }

    fn token_endpoint(&self) -> String {
        "https://api.weixin.qq.com/sns/oauth2/access_token".to_string()
    }

    fn authorization_parameters(&self, state: Option<&str>) -> Vec<(String, String)> {
        default_authorization_parameters(self, state)
            .into_iter()
            .map(|(key, value)| match key.as_str() {
                "client_id" => ("appid".to_string(), value),
                _ => (key, value),
            })
            .collect()
    }

    fn authorization_url(&self, state: Option<&str>) -> SocialResult<String> {
        let mut url = Url::parse(&self.authorization_endpoint())?;
        url.query_pairs_mut()
            .extend_pairs(self.authorization_parameters(state));
        url.set_fragment(Some("wechat_redirect"));
        Ok(url.to_string())
    }

    fn token_request(&self, code: &str) -> SocialResult<HttpRequest> {
        let settings = self.settings();
        Ok(HttpRequest::get(self.token_endpoint()).query([
            ("appid", settings.client_id.as_str()),
            ("secret", settings.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ]))
    }

    async fn fetch_raw_profile(&self, tokens: &TokenSet) -> SocialResult<Value> {
        let open_id = self.open_id_for(tokens)?;
        if self.settings().scopes.contains(BASE_SCOPE) {
            return Ok(json!({ "openid": open_id }));
        }

        let request = HttpRequest::get(USER_INFO_URL).query([
            ("access_token", tokens.access_token.as_str()),
            ("openid", open_id.as_str()),
            ("lang", "zh_CN"),
        ]);
        let user = fetch_json(self.http(), self.provider(), request).await?;

        if let Some(code) = user.get("errcode").and_then(Value::as_i64).filter(|c| *c != 0) {
            return Err(SocialError::ProviderCommunication {
                provider: self.provider(),
                endpoint: USER_INFO_URL.to_string(),
                message: format!(
                    "errcode {}: {}",
                    code,
                    string_at(&user, "errmsg").unwrap_or_default()
                ),
            });
        }

        Ok(user)
    }

    fn normalize_profile(&self, raw: Value, tokens: &TokenSet) -> SocialResult<IdentityFields> {
        let mut fields = map_wechat_profile(self.provider(), raw)?;
        let with_tokens = base_fields(self.provider(), fields.external_id.clone(), tokens);
        fields.access_token = with_tokens.access_token;
        fields.refresh_token = with_tokens.refresh_token;
        fields.token_expires_at = with_tokens.token_expires_at;
        Ok(fields)
    }
}

/// Maps a WeChat user payload (`openid`, `unionid`, `nickname`,
/// `headimgurl`) onto canonical fields without token data. Shared by the web
/// login and by official-account profiles obtained out of band.
pub fn map_wechat_profile(provider: ProviderKey, raw: Value) -> SocialResult<IdentityFields> {
    let external_id = required_id(provider, &raw, "openid")?;
    let mut fields = IdentityFields::new(provider, external_id);
    fields.union_id = string_at(&raw, "unionid");
    fields.nickname = string_at(&raw, "nickname");
    fields.email = string_at(&raw, "email");
    fields.avatar_url = string_at(&raw, "headimgurl");
    fields.raw_profile = raw;
    Ok(fields)
}
