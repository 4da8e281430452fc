//! Request signing used by providers that do not accept a plain client secret.

use crate::error::{SocialError, SocialResult};
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

/// Hex encoded HMAC-SHA256 of `message` keyed with `secret`.
pub fn hmac_sha256_hex(secret: &str, message: &str) -> SocialResult<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| SocialError::SigningError(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Canonical message for signed field sets: keys sorted lexically, joined as
/// `key=value&key=value` with values left unencoded.
pub fn canonical_message(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

/// SHA256withRSA signer holding a parsed private key.
#[derive(Clone)]
pub struct RsaSigner {
    key: SigningKey<Sha256>,
}

impl std::fmt::Debug for RsaSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaSigner").finish_non_exhaustive()
    }
}

impl RsaSigner {
    /// Accepts a PEM document, a path to one (optionally `file://` prefixed),
    /// or the bare base64 body of a PKCS#1 or PKCS#8 key.
    pub fn from_secret(secret: &str) -> SocialResult<Self> {
        let secret = secret.trim();
        let pem = if secret.contains("-----BEGIN") {
            secret.to_string()
        } else {
            let path = secret.strip_prefix("file://").unwrap_or(secret);
            if Path::new(path).is_file() {
                std::fs::read_to_string(path).map_err(|e| {
                    SocialError::SigningError(format!("Failed to read private key: {}", e))
                })?
            } else {
                return Self::from_base64_body(secret);
            }
        };

        let key = RsaPrivateKey::from_pkcs1_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
            .map_err(|e| SocialError::SigningError(format!("Invalid private key: {}", e)))?;

        Ok(Self::from_key(key))
    }

    fn from_base64_body(body: &str) -> SocialResult<Self> {
        let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
        let der = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| SocialError::SigningError(format!("Invalid private key: {}", e)))?;

        let key = RsaPrivateKey::from_pkcs1_der(&der)
            .or_else(|_| RsaPrivateKey::from_pkcs8_der(&der))
            .map_err(|e| SocialError::SigningError(format!("Invalid private key: {}", e)))?;

        Ok(Self::from_key(key))
    }

    pub fn from_key(key: RsaPrivateKey) -> Self {
        Self {
            key: SigningKey::<Sha256>::new(key),
        }
    }

    /// Base64 encoded PKCS#1 v1.5 signature over `message`.
    pub fn sign_base64(&self, message: &str) -> String {
        let signature = self.key.sign(message.as_bytes());
        STANDARD.encode(signature.to_bytes())
    }
}
