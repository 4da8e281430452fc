//! Identity reconciliation: maps normalized profiles onto stored identities.

use crate::{AccountId, CanonicalIdentity, IdentityFields, IdentityResult, IdentityStore, ProviderKey};
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves incoming profiles against the identity store.
///
/// Row identity is always `(provider, external_id)`. A union id is only used
/// to discover an account link already established by a sibling identity of
/// the same provider, which the incoming record then adopts.
#[derive(Clone)]
pub struct IdentityReconciler {
    store: Arc<dyn IdentityStore>,
}

impl IdentityReconciler {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    pub async fn upsert(&self, mut fields: IdentityFields) -> IdentityResult<CanonicalIdentity> {
        if let Some(union_id) = fields.effective_union_id() {
            let sibling = self.store.find_by_union(union_id, fields.provider).await?;
            if let Some(account_id) = sibling.and_then(|sibling| sibling.linked_account_id) {
                debug!(
                    "Adopting account link from union sibling for provider {}",
                    fields.provider
                );
                fields.linked_account_id = Some(account_id);
            }
        }

        let identity = self.store.upsert(fields).await?;
        info!(
            "Reconciled {} identity {} (linked: {})",
            identity.provider,
            identity.id,
            identity.is_linked()
        );
        Ok(identity)
    }

    /// Links `identity` to a local account. Only the link is written;
    /// `identity` is refreshed from the stored record.
    pub async fn connect(
        &self,
        identity: &mut CanonicalIdentity,
        account_id: AccountId,
    ) -> IdentityResult<()> {
        *identity = self
            .store
            .set_link(identity.provider, &identity.external_id, Some(account_id))
            .await?;
        info!("Connected {} identity {} to account", identity.provider, identity.id);
        Ok(())
    }

    /// Clears the account link. The identity record itself is kept.
    pub async fn disconnect(&self, identity: &mut CanonicalIdentity) -> IdentityResult<()> {
        *identity = self
            .store
            .set_link(identity.provider, &identity.external_id, None)
            .await?;
        info!("Disconnected {} identity {}", identity.provider, identity.id);
        Ok(())
    }

    pub async fn external_id_for_account(
        &self,
        provider: ProviderKey,
        account_id: AccountId,
    ) -> IdentityResult<Option<String>> {
        Ok(self
            .store
            .find_by_account(provider, account_id)
            .await?
            .map(|identity| identity.external_id))
    }
}
