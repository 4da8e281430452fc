//! Core types for social identity management.
//!
//! This crate owns the canonical identity record produced by a completed
//! third-party authorization, the persistence seam used to store it, and the
//! reconciliation rules that decide which stored record an incoming profile
//! belongs to and which local account it is linked to.

mod error;
mod identity;
mod provider;
mod reconcile;
mod store;

pub use error::{IdentityError, IdentityResult};
pub use identity::{AccountId, CanonicalIdentity, IdentityFields};
pub use provider::{ProviderKey, UnknownProviderKey};
pub use reconcile::IdentityReconciler;
pub use store::{IdentityStore, InMemoryIdentityStore};
