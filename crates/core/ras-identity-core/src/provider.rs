//! The fixed set of identity provider keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifies the third-party platform an identity was issued by.
///
/// The set is versioned with this crate: adding a provider is a new variant,
/// and the serialized form (snake_case) is what gets persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKey {
    Larva,
    Librespeed,
    Weibo,
    Qq,
    Alipay,
    Baidu,
    /// WeChat official account (in-app web pages).
    Wechat,
    /// WeChat QR-code website login.
    WechatWeb,
    /// WeChat native mobile app login.
    WechatMobile,
    Github,
    Facebook,
    Google,
    Linkedin,
    Bitbucket,
    Gitlab,
    Douyin,
    Outlook,
    Taobao,
}

impl ProviderKey {
    pub const ALL: [ProviderKey; 18] = [
        ProviderKey::Larva,
        ProviderKey::Librespeed,
        ProviderKey::Weibo,
        ProviderKey::Qq,
        ProviderKey::Alipay,
        ProviderKey::Baidu,
        ProviderKey::Wechat,
        ProviderKey::WechatWeb,
        ProviderKey::WechatMobile,
        ProviderKey::Github,
        ProviderKey::Facebook,
        ProviderKey::Google,
        ProviderKey::Linkedin,
        ProviderKey::Bitbucket,
        ProviderKey::Gitlab,
        ProviderKey::Douyin,
        ProviderKey::Outlook,
        ProviderKey::Taobao,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKey::Larva => "larva",
            ProviderKey::Librespeed => "librespeed",
            ProviderKey::Weibo => "weibo",
            ProviderKey::Qq => "qq",
            ProviderKey::Alipay => "alipay",
            ProviderKey::Baidu => "baidu",
            ProviderKey::Wechat => "wechat",
            ProviderKey::WechatWeb => "wechat_web",
            ProviderKey::WechatMobile => "wechat_mobile",
            ProviderKey::Github => "github",
            ProviderKey::Facebook => "facebook",
            ProviderKey::Google => "google",
            ProviderKey::Linkedin => "linkedin",
            ProviderKey::Bitbucket => "bitbucket",
            ProviderKey::Gitlab => "gitlab",
            ProviderKey::Douyin => "douyin",
            ProviderKey::Outlook => "outlook",
            ProviderKey::Taobao => "taobao",
        }
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown provider key: {0}")]
pub struct UnknownProviderKey(pub String);

impl FromStr for ProviderKey {
    type Err = UnknownProviderKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ProviderKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| UnknownProviderKey(s.to_string()))
    }
}
