//! Session storage for the anti-CSRF state token.

use crate::config::SocialConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use ras_identity_core::ProviderKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Length of generated state tokens.
pub const STATE_LENGTH: usize = 40;

/// Per-user key/value session, as provided by the web framework.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, key: &str, value: String);

    /// Reads and removes a value.
    async fn pull(&self, key: &str) -> Option<String>;
}

/// Session key the pending state token is kept under.
pub fn state_key(provider: ProviderKey) -> String {
    format!("social.state.{}", provider)
}

/// Generates a fresh random state token.
pub fn generate_state() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LENGTH)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone)]
struct SessionEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl SessionEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// In-memory implementation of [`SessionStore`] with per-entry expiry.
#[derive(Clone)]
pub struct InMemorySessionStore {
    entries: Arc<RwLock<HashMap<String, SessionEntry>>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::from_config(&SocialConfig::default())
    }

    /// Entries expire after the configured `state_ttl_seconds`.
    pub fn from_config(config: &SocialConfig) -> Self {
        Self::with_ttl(config.state_ttl_seconds)
    }

    /// Lifetimes beyond what `Duration` can hold saturate.
    pub fn with_ttl(ttl_seconds: u64) -> Self {
        let ttl = i64::try_from(ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Clean up expired entries
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, key: &str, value: String) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            SessionEntry {
                value,
                expires_at: Utc::now()
                    .checked_add_signed(self.ttl)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
    }

    async fn pull(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.write().await;
        let entry = entries.remove(key)?;

        if entry.is_expired(Utc::now()) {
            return None;
        }

        Some(entry.value)
    }
}
