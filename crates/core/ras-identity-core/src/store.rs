//! Persistence seam for canonical identities.

use crate::{
    AccountId, CanonicalIdentity, IdentityError, IdentityFields, IdentityResult, ProviderKey,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage for canonical identities.
///
/// Implementations must make `upsert` a single atomic write keyed by
/// `(provider, external_id)`: two concurrent upserts for the same key may
/// never produce two records. For relational stores this means a unique
/// constraint plus `INSERT ... ON CONFLICT DO UPDATE`, not read-then-write.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_key(
        &self,
        provider: ProviderKey,
        external_id: &str,
    ) -> IdentityResult<Option<CanonicalIdentity>>;

    /// Finds an identity of `provider` sharing `union_id`. When several
    /// siblings exist, one that is linked to an account is preferred.
    async fn find_by_union(
        &self,
        union_id: &str,
        provider: ProviderKey,
    ) -> IdentityResult<Option<CanonicalIdentity>>;

    /// Finds the identity a local account holds for `provider`.
    async fn find_by_account(
        &self,
        provider: ProviderKey,
        account_id: AccountId,
    ) -> IdentityResult<Option<CanonicalIdentity>>;

    /// Inserts or refreshes the record for `(fields.provider, fields.external_id)`.
    async fn upsert(&self, fields: IdentityFields) -> IdentityResult<CanonicalIdentity>;

    /// Persists an already stored identity as a whole.
    async fn save(&self, identity: &CanonicalIdentity) -> IdentityResult<CanonicalIdentity>;

    /// Sets or clears the account link of a stored identity, leaving every
    /// other column as stored, and returns the updated record.
    async fn set_link(
        &self,
        provider: ProviderKey,
        external_id: &str,
        account_id: Option<AccountId>,
    ) -> IdentityResult<CanonicalIdentity>;
}

type IdentityKey = (ProviderKey, String);

/// In-memory implementation of [`IdentityStore`].
#[derive(Clone, Default)]
pub struct InMemoryIdentityStore {
    identities: Arc<RwLock<HashMap<IdentityKey, CanonicalIdentity>>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.identities.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<CanonicalIdentity> {
        self.identities.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_by_key(
        &self,
        provider: ProviderKey,
        external_id: &str,
    ) -> IdentityResult<Option<CanonicalIdentity>> {
        let identities = self.identities.read().await;
        Ok(identities.get(&(provider, external_id.to_string())).cloned())
    }

    async fn find_by_union(
        &self,
        union_id: &str,
        provider: ProviderKey,
    ) -> IdentityResult<Option<CanonicalIdentity>> {
        let identities = self.identities.read().await;
        let sibling = identities
            .values()
            .filter(|identity| {
                identity.provider == provider && identity.union_id.as_deref() == Some(union_id)
            })
            .min_by_key(|identity| (!identity.is_linked(), identity.created_at));
        Ok(sibling.cloned())
    }

    async fn find_by_account(
        &self,
        provider: ProviderKey,
        account_id: AccountId,
    ) -> IdentityResult<Option<CanonicalIdentity>> {
        let identities = self.identities.read().await;
        let found = identities
            .values()
            .filter(|identity| {
                identity.provider == provider && identity.linked_account_id == Some(account_id)
            })
            .max_by_key(|identity| identity.updated_at);
        Ok(found.cloned())
    }

    async fn upsert(&self, fields: IdentityFields) -> IdentityResult<CanonicalIdentity> {
        // The write lock spans lookup and write, so the key is claimed atomically.
        let mut identities = self.identities.write().await;
        let now = Utc::now();
        let key = (fields.provider, fields.external_id.clone());

        let identity = match identities.get_mut(&key) {
            Some(existing) => {
                existing.refresh(fields, now);
                existing.clone()
            }
            None => {
                let created = CanonicalIdentity::create(fields, now);
                identities.insert(key, created.clone());
                created
            }
        };

        Ok(identity)
    }

    async fn save(&self, identity: &CanonicalIdentity) -> IdentityResult<CanonicalIdentity> {
        let mut identities = self.identities.write().await;
        let key = (identity.provider, identity.external_id.clone());

        let stored = identities
            .get_mut(&key)
            .ok_or_else(|| IdentityError::NotFound {
                provider: identity.provider,
                external_id: identity.external_id.clone(),
            })?;

        let mut updated = identity.clone();
        updated.id = stored.id;
        updated.created_at = stored.created_at;
        updated.updated_at = Utc::now();
        *stored = updated.clone();

        Ok(updated)
    }

    async fn set_link(
        &self,
        provider: ProviderKey,
        external_id: &str,
        account_id: Option<AccountId>,
    ) -> IdentityResult<CanonicalIdentity> {
        let mut identities = self.identities.write().await;

        let stored = identities
            .get_mut(&(provider, external_id.to_string()))
            .ok_or_else(|| IdentityError::NotFound {
                provider,
                external_id: external_id.to_string(),
            })?;

        stored.linked_account_id = account_id;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }
}
