//! Canonical identity records.

use crate::ProviderKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a local user account. The identity only references it.
pub type AccountId = i64;

/// Normalized output of one provider authentication, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityFields {
    pub provider: ProviderKey,
    pub external_id: String,
    pub union_id: Option<String>,
    /// When set, overrides the stored link on upsert. `None` keeps whatever
    /// link the stored record already has.
    pub linked_account_id: Option<AccountId>,
    pub display_name: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub raw_profile: serde_json::Value,
}

impl IdentityFields {
    pub fn new(provider: ProviderKey, external_id: impl Into<String>) -> Self {
        Self {
            provider,
            external_id: external_id.into(),
            union_id: None,
            linked_account_id: None,
            display_name: None,
            nickname: None,
            email: None,
            avatar_url: None,
            access_token: None,
            refresh_token: None,
            token_expires_at: None,
            raw_profile: serde_json::Value::Null,
        }
    }

    /// Union id, ignoring the empty string some providers send instead of null.
    pub fn effective_union_id(&self) -> Option<&str> {
        self.union_id.as_deref().filter(|union_id| !union_id.is_empty())
    }
}

/// A persisted identity, unique per `(provider, external_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalIdentity {
    pub id: Uuid,
    pub provider: ProviderKey,
    pub external_id: String,
    pub union_id: Option<String>,
    pub linked_account_id: Option<AccountId>,
    pub display_name: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub raw_profile: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanonicalIdentity {
    /// Builds a fresh record from normalized fields.
    pub fn create(fields: IdentityFields, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: fields.provider,
            external_id: fields.external_id,
            union_id: fields.union_id,
            linked_account_id: fields.linked_account_id,
            display_name: fields.display_name,
            nickname: fields.nickname,
            email: fields.email,
            avatar_url: fields.avatar_url,
            access_token: fields.access_token,
            refresh_token: fields.refresh_token,
            token_expires_at: fields.token_expires_at,
            raw_profile: fields.raw_profile,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a re-authentication to an existing record.
    ///
    /// `id`, `provider`, `external_id` and `created_at` never change. The
    /// account link is only replaced when the incoming fields carry one.
    pub fn refresh(&mut self, fields: IdentityFields, now: DateTime<Utc>) {
        self.union_id = fields.union_id;
        if let Some(account_id) = fields.linked_account_id {
            self.linked_account_id = Some(account_id);
        }
        self.display_name = fields.display_name;
        self.nickname = fields.nickname;
        self.email = fields.email;
        self.avatar_url = fields.avatar_url;
        self.access_token = fields.access_token;
        self.refresh_token = fields.refresh_token;
        self.token_expires_at = fields.token_expires_at;
        self.raw_profile = fields.raw_profile;
        self.updated_at = now;
    }

    /// Human readable name: the display name, or the nickname when absent.
    pub fn username(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or(self.nickname.as_deref())
    }

    pub fn is_linked(&self) -> bool {
        self.linked_account_id.is_some()
    }
}
