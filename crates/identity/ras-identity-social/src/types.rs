//! Protocol types shared by the flow and the dialects.

use crate::error::{SocialError, SocialResult};
use chrono::{DateTime, Duration, Utc};
use ras_identity_core::ProviderKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Token lifetime assumed when a provider omits `expires_in`.
pub const DEFAULT_EXPIRES_IN: i64 = 7200;

/// Longest token lifetime taken at face value; larger values are capped.
pub const MAX_EXPIRES_IN: i64 = 10 * 365 * 24 * 60 * 60;

/// Inbound callback parameters (query string or form body).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackParams(HashMap<String, String>);

impl CallbackParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self(
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        )
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl From<HashMap<String, String>> for CallbackParams {
    fn from(params: HashMap<String, String>) -> Self {
        Self(params)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Tokens obtained from a provider, plus the raw token payload.
///
/// Some providers return profile data alongside the token (WeChat's
/// `openid`), so the full payload is kept for the profile fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds. `None` for tokens supplied out of band.
    pub expires_in: Option<i64>,
    pub raw: Map<String, Value>,
}

impl TokenSet {
    /// A bare access token obtained outside of a code exchange.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in: None,
            raw: Map::new(),
        }
    }

    /// Reads the standard token fields from a decoded token payload.
    pub fn from_payload(provider: ProviderKey, raw: Map<String, Value>) -> SocialResult<Self> {
        let access_token = raw
            .get("access_token")
            .and_then(value_as_string)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SocialError::malformed(provider, "access_token"))?;

        let refresh_token = raw
            .get("refresh_token")
            .and_then(value_as_string)
            .filter(|token| !token.is_empty());

        let expires_in = match raw.get("expires_in").and_then(value_as_i64) {
            None => DEFAULT_EXPIRES_IN,
            Some(seconds) if seconds < 0 => {
                return Err(SocialError::malformed(provider, "expires_in"));
            }
            Some(seconds) => seconds.min(MAX_EXPIRES_IN),
        };

        Ok(Self {
            access_token,
            refresh_token,
            expires_in: Some(expires_in),
            raw,
        })
    }

    /// Adds a field to the raw payload, such as the WeChat `openid` that
    /// accompanies an out-of-band token.
    pub fn with_raw(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.raw.insert(key.into(), value.into());
        self
    }

    pub fn raw_str(&self, key: &str) -> Option<String> {
        self.raw.get(key).and_then(value_as_string)
    }

    /// `None` when there is no lifetime or it does not fit the calendar.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
    }
}

/// Strings and numbers both count as string values; ids arrive as either.
pub(crate) fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Ordered, de-duplicated scope list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scopes(Vec<String>);

impl Scopes {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut result = Self::default();
        result.extend(scopes);
        result
    }

    pub fn extend<I, S>(&mut self, scopes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for scope in scopes {
            let scope = scope.into();
            if !scope.is_empty() && !self.0.contains(&scope) {
                self.0.push(scope);
            }
        }
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    pub fn join(&self, separator: &str) -> String {
        self.0.join(separator)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_token_without_refresh_token() {
        let tokens = TokenSet::from_payload(
            ProviderKey::Github,
            payload(json!({"access_token": "T", "expires_in": 3600})),
        )
        .unwrap();

        assert_eq!(tokens.access_token, "T");
        assert_eq!(tokens.refresh_token, None);
        assert_eq!(tokens.expires_in, Some(3600));
    }

    #[test]
    fn test_expires_in_defaults_and_accepts_strings() {
        let defaulted =
            TokenSet::from_payload(ProviderKey::Qq, payload(json!({"access_token": "T"})))
                .unwrap();
        assert_eq!(defaulted.expires_in, Some(DEFAULT_EXPIRES_IN));

        let stringly = TokenSet::from_payload(
            ProviderKey::Qq,
            payload(json!({"access_token": "T", "expires_in": "7776000"})),
        )
        .unwrap();
        assert_eq!(stringly.expires_in, Some(7_776_000));
    }

    #[test]
    fn test_missing_access_token_is_malformed() {
        let err = TokenSet::from_payload(
            ProviderKey::Weibo,
            payload(json!({"error": "invalid_grant"})),
        )
        .unwrap_err();

        match err {
            SocialError::MalformedResponse { provider, field } => {
                assert_eq!(provider, ProviderKey::Weibo);
                assert_eq!(field, "access_token");
            }
            other => panic!("Expected MalformedResponse, got: {:?}", other),
        }
    }

    #[test]
    fn test_huge_expires_in_is_capped() {
        let now = Utc::now();
        let tokens = TokenSet::from_payload(
            ProviderKey::Github,
            payload(json!({"access_token": "T", "expires_in": i64::MAX})),
        )
        .unwrap();

        assert_eq!(tokens.expires_in, Some(MAX_EXPIRES_IN));
        assert_eq!(
            tokens.expires_at(now),
            Some(now + Duration::seconds(MAX_EXPIRES_IN))
        );
    }

    #[test]
    fn test_negative_expires_in_is_malformed() {
        let err = TokenSet::from_payload(
            ProviderKey::Github,
            payload(json!({"access_token": "T", "expires_in": -60})),
        )
        .unwrap_err();
        assert!(matches!(err, SocialError::MalformedResponse { ref field, .. } if field == "expires_in"));
    }

    #[test]
    fn test_unrepresentable_expiry_is_none() {
        let mut tokens = TokenSet::bearer("T");
        tokens.expires_in = Some(i64::MAX);
        assert_eq!(tokens.expires_at(Utc::now()), None);

        tokens.expires_in = Some(i64::MAX / 1000);
        assert_eq!(tokens.expires_at(Utc::now()), None);
    }

    #[test]
    fn test_bearer_tokens_have_no_expiry() {
        let tokens = TokenSet::bearer("T");
        assert_eq!(tokens.expires_at(Utc::now()), None);
    }

    #[test]
    fn test_scopes_keep_order_and_drop_duplicates() {
        let mut scopes = Scopes::new(["user:email", "read:org"]);
        scopes.extend(["user:email", "gist", ""]);

        assert_eq!(scopes.join(","), "user:email,read:org,gist");
        assert!(scopes.contains("gist"));
    }

    #[test]
    fn test_callback_params_from_query() {
        let params = CallbackParams::from_query("?code=abc&state=x%20y");
        assert_eq!(params.get("code"), Some("abc"));
        assert_eq!(params.get("state"), Some("x y"));
        assert_eq!(params.get("auth_code"), None);
    }
}
