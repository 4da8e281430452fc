//! Larva and LibreSpeed: two sites running the same OAuth2 server and
//! profile API on different hosts.

use crate::dialect::{Dialect, DialectCore, base_fields, fetch_json};
use crate::error::SocialResult;
use crate::http::HttpRequest;
use crate::profile::{required_id, string_at};
use crate::types::TokenSet;
use async_trait::async_trait;
use ras_identity_core::{IdentityFields, ProviderKey};
use serde_json::Value;

pub const LARVA_HOST: &str = "https://www.larva.com.cn";
pub const LIBRESPEED_HOST: &str = "https://www.librespeed.net";

pub struct PassportDialect {
    core: DialectCore,
    provider: ProviderKey,
    host: &'static str,
}

impl PassportDialect {
    pub fn larva(core: DialectCore) -> Self {
        Self {
            core,
            provider: ProviderKey::Larva,
            host: LARVA_HOST,
        }
    }

    pub fn librespeed(core: DialectCore) -> Self {
        Self {
            core,
            provider: ProviderKey::Librespeed,
            host: LIBRESPEED_HOST,
        }
    }
}

#[async_trait]
impl Dialect for PassportDialect {
    fn provider(&self) -> ProviderKey {
        self.provider
    }

    fn core(&self) -> &DialectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DialectCore {
        &mut self.core
    }

    fn authorization_endpoint(&self) -> String {
        format!("{}/oauth/authorize", self.host)
    }

    fn token_endpoint(&self) -> String {
        format!("{}/oauth/token", self.host)
    }

    async fn fetch_raw_profile(&self, tokens: &TokenSet) -> SocialResult<Value> {
        let request = HttpRequest::get(format!("{}/api/v1/user/profile", self.host))
            .accept_json()
            .bearer_auth(&tokens.access_token);
        fetch_json(self.http(), self.provider(), request).await
    }

    fn normalize_profile(&self, raw: Value, tokens: &TokenSet) -> SocialResult<IdentityFields> {
        let external_id = required_id(self.provider(), &raw, "id")?;
        let mut fields = base_fields(self.provider(), external_id, tokens);
        fields.nickname = string_at(&raw, "username");
        fields.display_name = string_at(&raw, "username");
        fields.email = string_at(&raw, "email");
        fields.avatar_url = string_at(&raw, "avatar");
        fields.raw_profile = raw;
        Ok(fields)
    }
}
