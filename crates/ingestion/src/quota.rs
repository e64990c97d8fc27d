//! Quota ledger for API key rotation
//!
//! A key that reports exhausted quota is blocked for a fixed hour. Blocks are
//! never lifted early, even if the platform restores capacity sooner.

use crate::store::{CoordinationStore, KeySpace};
use crate::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How long a quota-exhausted key stays out of rotation
pub const QUOTA_BLOCK_TTL: Duration = Duration::from_secs(3600);

/// Tracks which API keys are currently quota-blocked
#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn CoordinationStore>,
    keys: KeySpace,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn CoordinationStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// True iff a live block entry exists for `api_key`
    pub async fn is_blocked(&self, api_key: &str) -> Result<bool> {
        let blocked = self
            .store
            .get(&self.keys.quota_block(&hash_key(api_key)))
            .await?
            .is_some();

        if blocked {
            debug!(api_key = %redact_key(api_key), "API key is quota-blocked");
        }
        Ok(blocked)
    }

    /// Block `api_key` for [`QUOTA_BLOCK_TTL`]; repeated calls refresh the block
    pub async fn block(&self, api_key: &str) -> Result<()> {
        self.store
            .set(
                &self.keys.quota_block(&hash_key(api_key)),
                "1",
                Some(QUOTA_BLOCK_TTL),
            )
            .await?;

        warn!(
            api_key = %redact_key(api_key),
            ttl_secs = QUOTA_BLOCK_TTL.as_secs(),
            "API key quota exhausted, blocking"
        );
        Ok(())
    }
}

/// Stable opaque identifier for an API key, safe to store
pub fn hash_key(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Truncated form of an API key for log output
pub fn redact_key(api_key: &str) -> String {
    let prefix: String = api_key.chars().take(5).collect();
    format!("{}***", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCoordinationStore;

    fn ledger() -> (QuotaLedger, Arc<InMemoryCoordinationStore>) {
        let store = Arc::new(InMemoryCoordinationStore::new());
        (QuotaLedger::new(store.clone(), KeySpace::default()), store)
    }

    #[test]
    fn test_hash_key_is_stable_and_opaque() {
        let hash = hash_key("AIzaSyExampleKey");
        assert_eq!(hash, hash_key("AIzaSyExampleKey"));
        assert_ne!(hash, hash_key("AIzaSyOtherKey"));
        assert_eq!(hash.len(), 16);
        assert!(!hash.contains("AIza"));
    }

    #[test]
    fn test_redact_key() {
        assert_eq!(redact_key("AIzaSyExampleKey"), "AIzaS***");
        assert_eq!(redact_key("abc"), "abc***");
        assert_eq!(redact_key(""), "***");
    }

    #[tokio::test]
    async fn test_unknown_key_is_not_blocked() {
        let (ledger, _) = ledger();
        assert!(!ledger.is_blocked("key-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_block_is_per_key_and_idempotent() {
        let (ledger, _) = ledger();

        ledger.block("key-a").await.unwrap();
        ledger.block("key-a").await.unwrap();

        assert!(ledger.is_blocked("key-a").await.unwrap());
        assert!(!ledger.is_blocked("key-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_block_stores_hash_not_secret() {
        let (ledger, store) = ledger();
        ledger.block("super-secret-key").await.unwrap();

        let keys = KeySpace::default();
        let stored = store
            .get(&keys.quota_block(&hash_key("super-secret-key")))
            .await
            .unwrap();
        assert_eq!(stored.as_deref(), Some("1"));
        assert!(store
            .get(&keys.quota_block("super-secret-key"))
            .await
            .unwrap()
            .is_none());
    }
}
