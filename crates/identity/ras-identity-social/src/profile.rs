//! Helpers for reading loosely structured provider payloads.

use crate::error::{SocialError, SocialResult};
use crate::types::value_as_string;
use ras_identity_core::ProviderKey;
use serde_json::{Map, Value};

/// Resolves a dot separated path (`links.avatar.href`, `elements.0.handle`)
/// against a JSON value. Numeric segments index into arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Optional string field; empty strings and nulls read as `None`.
pub fn string_at(value: &Value, path: &str) -> Option<String> {
    lookup(value, path)
        .and_then(value_as_string)
        .filter(|s| !s.is_empty())
}

/// Required identifier field, string or number.
pub fn required_id(provider: ProviderKey, value: &Value, path: &str) -> SocialResult<String> {
    string_at(value, path).ok_or_else(|| SocialError::malformed(provider, path))
}

/// Decodes a JSON body.
pub fn decode_json(provider: ProviderKey, body: &str) -> SocialResult<Value> {
    serde_json::from_str(body.trim()).map_err(|_| SocialError::malformed(provider, "body"))
}

/// Decodes a JSON body that must be an object.
pub fn decode_object(provider: ProviderKey, body: &str) -> SocialResult<Map<String, Value>> {
    match decode_json(provider, body)? {
        Value::Object(map) => Ok(map),
        _ => Err(SocialError::malformed(provider, "body")),
    }
}

/// Removes a JSONP wrapper: `callback( {...} );` becomes `{...}`.
pub fn strip_jsonp(body: &str) -> &str {
    let trimmed = body.trim();
    if !trimmed.starts_with("callback") {
        return trimmed;
    }

    match (trimmed.find('('), trimmed.rfind(')')) {
        (Some(open), Some(close)) if open < close => trimmed[open + 1..close].trim(),
        _ => trimmed,
    }
}

/// Decodes a `key=value&key=value` body into a JSON object of strings.
pub fn decode_form(body: &str) -> Map<String, Value> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect()
}

/// Merges the keys of `extra` into `base` when both are objects.
pub fn merge_objects(base: &mut Value, extra: Value) {
    if let (Value::Object(base), Value::Object(extra)) = (base, extra) {
        base.extend(extra);
    }
}
