use crate::dialect::{
    Dialect, DialectCore, base_fields, default_authorization_parameters, dialect_accessors,
    fetch_json, set_param,
};
use crate::error::SocialResult;
use crate::http::HttpRequest;
use crate::profile::{decode_object, required_id, string_at};
use crate::signing::hmac_sha256_hex;
use crate::types::TokenSet;
use async_trait::async_trait;
use ras_identity_core::{IdentityFields, ProviderKey};
use serde_json::Value;

const GRAPH_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_GRAPH_VERSION: &str = "v3.3";
const DEFAULT_FIELDS: [&str; 5] = ["name", "email", "gender", "verified", "link"];

pub struct FacebookDialect {
    core: DialectCore,
    version: String,
    fields: Vec<String>,
    popup: bool,
    rerequest: bool,
}

impl FacebookDialect {
    pub fn new(core: DialectCore) -> Self {
        Self {
            core: core.with_default_scopes(&["email"]),
            version: DEFAULT_GRAPH_VERSION.to_string(),
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
            popup: false,
            rerequest: false,
        }
    }

    pub fn with_graph_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Profile fields requested from `/me`.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Renders the login dialog as a popup.
    pub fn as_popup(mut self) -> Self {
        self.popup = true;
        self
    }

    /// Asks again for permissions the user declined before.
    pub fn rerequest(mut self) -> Self {
        self.rerequest = true;
        self
    }

    fn versioned(&self, path: &str) -> String {
        format!("{}/{}/{}", GRAPH_URL, self.version, path)
    }
}

#[async_trait]
impl Dialect for FacebookDialect {
    dialect_accessors!(ProviderKey::Facebook);

    fn authorization_endpoint(&self) -> String {
        format!("https://www.facebook.com/{}/dialog/oauth", self.version)
    }

    fn token_endpoint(&self) -> String {
        self.versioned("oauth/access_token")
    }

    fn authorization_parameters(&self, state: Option<&str>) -> Vec<(String, String)> {
        let mut params = default_authorization_parameters(self, state);
        if self.popup {
            set_param(&mut params, "display", "popup".to_string());
        }
        if self.rerequest {
            set_param(&mut params, "auth_type", "rerequest".to_string());
        }
        params
    }

    fn parse_token_response(&self, body: &str) -> SocialResult<TokenSet> {
        let mut payload = decode_object(self.provider(), body)?;
        if !payload.contains_key("expires_in") {
            if let Some(expires) = payload.remove("expires") {
                payload.insert("expires_in".to_string(), expires);
            }
        }
        TokenSet::from_payload(self.provider(), payload)
    }

    async fn fetch_raw_profile(&self, tokens: &TokenSet) -> SocialResult<Value> {
        let token = &tokens.access_token;
        let mut request = HttpRequest::get(self.versioned("me")).accept_json().query([
            ("access_token", token.clone()),
            ("fields", self.fields.join(",")),
        ]);

        let secret = &self.settings().client_secret;
        if !secret.is_empty() {
            let proof = hmac_sha256_hex(secret, token)?;
            request = request.query([("appsecret_proof", proof)]);
        }

        fetch_json(self.http(), self.provider(), request).await
    }

    fn normalize_profile(&self, mut raw: Value, tokens: &TokenSet) -> SocialResult<IdentityFields> {
        let external_id = required_id(self.provider(), &raw, "id")?;
        let picture = self.versioned(&format!("{}/picture", external_id));
        let profile_url = raw.get("link").cloned().unwrap_or(Value::Null);

        if let Value::Object(map) = &mut raw {
            map.insert(
                "avatar_original".to_string(),
                Value::String(format!("{}?width=1920", picture)),
            );
            map.insert("profile_url".to_string(), profile_url);
        }

        let mut fields = base_fields(self.provider(), external_id, tokens);
        fields.display_name = string_at(&raw, "name");
        fields.email = string_at(&raw, "email");
        fields.avatar_url = Some(format!("{}?type=normal", picture));
        fields.raw_profile = raw;
        Ok(fields)
    }
}
