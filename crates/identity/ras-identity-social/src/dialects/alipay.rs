use crate::dialect::{
    Dialect, DialectCore, base_fields, default_authorization_parameters, dialect_accessors,
    fetch_json, remove_param,
};
use crate::error::{SocialError, SocialResult};
use crate::http::HttpRequest;
use crate::profile::{decode_object, required_id, string_at};
use crate::signing::{RsaSigner, canonical_message};
use crate::types::TokenSet;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use ras_identity_core::{IdentityFields, ProviderKey};
use serde_json::Value;
use std::collections::BTreeMap;

pub const BASE_URL: &str = "https://openauth.alipay.com";
const GATEWAY_PATH: &str = "/gateway.do";
const TOKEN_METHOD: &str = "alipay.system.oauth.token";
const USER_METHOD: &str = "alipay.user.info.share";
const TOKEN_RESPONSE: &str = "alipay_system_oauth_token_response";
const USER_RESPONSE: &str = "alipay_user_info_share_response";
const SUCCESS_CODE: &str = "10000";

/// Alipay open platform login. The client secret is the application's RSA
/// private key; every gateway call is signed with SHA256withRSA.
pub struct AlipayDialect {
    core: DialectCore,
    signer: RsaSigner,
}

impl AlipayDialect {
    pub fn new(core: DialectCore) -> SocialResult<Self> {
        let signer = RsaSigner::from_secret(&core.settings.client_secret)?;
        Ok(Self::with_signer(core, signer))
    }

    pub fn with_signer(core: DialectCore, signer: RsaSigner) -> Self {
        Self {
            core: core.with_default_scopes(&["auth_user"]),
            signer,
        }
    }

    fn gateway(&self) -> String {
        format!("{}{}", BASE_URL, GATEWAY_PATH)
    }

    /// Common gateway fields plus `extra`, signed over the sorted set.
    fn signed_fields(&self, method: &str, extra: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut fields = BTreeMap::new();
        for (key, value) in [
            ("app_id", self.settings().client_id.as_str()),
            ("method", method),
            ("charset", "utf8"),
            ("sign_type", "RSA2"),
            ("version", "1.0"),
        ]
        .iter()
        .chain(extra)
        {
            fields.insert(key.to_string(), value.to_string());
        }
        fields.insert("timestamp".to_string(), gateway_timestamp());

        let sign = self.signer.sign_base64(&canonical_message(&fields));
        let mut signed: Vec<(String, String)> = fields.into_iter().collect();
        signed.push(("sign".to_string(), sign));
        signed
    }
}

/// Gateway timestamps are China Standard Time wall clock.
fn gateway_timestamp() -> String {
    (Utc::now() + Duration::hours(8))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Unwraps a gateway response envelope, failing on non-success codes.
fn unwrap_envelope(
    provider: ProviderKey,
    endpoint: &str,
    mut body: serde_json::Map<String, Value>,
    key: &str,
) -> SocialResult<Value> {
    let inner = match body.remove(key) {
        Some(inner @ Value::Object(_)) => inner,
        _ => {
            if let Some(error) = body.get("error_response") {
                return Err(gateway_error(provider, endpoint, error));
            }
            return Err(SocialError::malformed(provider, key));
        }
    };

    match string_at(&inner, "code") {
        Some(code) if code != SUCCESS_CODE => Err(gateway_error(provider, endpoint, &inner)),
        _ => Ok(inner),
    }
}

fn gateway_error(provider: ProviderKey, endpoint: &str, error: &Value) -> SocialError {
    let detail = string_at(error, "sub_msg")
        .or_else(|| string_at(error, "msg"))
        .unwrap_or_default();
    SocialError::ProviderCommunication {
        provider,
        endpoint: endpoint.to_string(),
        message: format!(
            "gateway code {}: {}",
            string_at(error, "code").unwrap_or_default(),
            detail
        ),
    }
}

#[async_trait]
impl Dialect for AlipayDialect {
    dialect_accessors!(ProviderKey::Alipay);

    fn authorization_endpoint(&self) -> String {
        format!("{}/oauth2/publicAppAuthorize.htm", BASE_URL)
    }

    fn token_endpoint(&self) -> String {
        self.gateway()
    }

    fn code_parameter(&self) -> &'static str {
        "auth_code"
    }

    fn authorization_parameters(&self, state: Option<&str>) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = default_authorization_parameters(self, state)
            .into_iter()
            .map(|(key, value)| match key.as_str() {
                "client_id" => ("app_id".to_string(), value),
                _ => (key, value),
            })
            .collect();
        remove_param(&mut params, "response_type");
        params
    }

    fn token_request(&self, code: &str) -> SocialResult<HttpRequest> {
        let fields = self.signed_fields(
            TOKEN_METHOD,
            &[("grant_type", "authorization_code"), ("code", code)],
        );
        Ok(HttpRequest::post(self.token_endpoint())
            .accept_json()
            .form(fields))
    }

    fn parse_token_response(&self, body: &str) -> SocialResult<TokenSet> {
        let envelope = decode_object(self.provider(), body)?;
        match unwrap_envelope(self.provider(), GATEWAY_PATH, envelope, TOKEN_RESPONSE)? {
            Value::Object(payload) => TokenSet::from_payload(self.provider(), payload),
            _ => Err(SocialError::malformed(self.provider(), TOKEN_RESPONSE)),
        }
    }

    async fn fetch_raw_profile(&self, tokens: &TokenSet) -> SocialResult<Value> {
        let fields = self.signed_fields(USER_METHOD, &[("auth_token", tokens.access_token.as_str())]);
        let request = HttpRequest::get(self.gateway()).query(fields);

        match fetch_json(self.http(), self.provider(), request).await? {
            Value::Object(envelope) => {
                unwrap_envelope(self.provider(), GATEWAY_PATH, envelope, USER_RESPONSE)
            }
            _ => Err(SocialError::malformed(self.provider(), USER_RESPONSE)),
        }
    }

    fn normalize_profile(&self, raw: Value, tokens: &TokenSet) -> SocialResult<IdentityFields> {
        let external_id = required_id(self.provider(), &raw, "user_id")?;
        let mut fields = base_fields(self.provider(), external_id, tokens);
        fields.nickname = string_at(&raw, "nick_name");
        fields.display_name = string_at(&raw, "nick_name");
        fields.email = string_at(&raw, "email");
        fields.avatar_url = string_at(&raw, "avatar");
        fields.raw_profile = raw;
        Ok(fields)
    }
}
