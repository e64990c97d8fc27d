//! Leased fetch lock
//!
//! At most one ingestion run should be active across all replicas. The lock is
//! a lease: it expires on its own after [`FETCH_LOCK_TTL`], so a crashed holder
//! blocks ingestion for at most that long.

use crate::store::{CoordinationStore, KeySpace};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Lease length of the fetch lock
pub const FETCH_LOCK_TTL: Duration = Duration::from_secs(60);

/// Distributed fetch lock
///
/// Each instance carries its own holder token, so only the instance that
/// acquired the lease can release it early.
#[derive(Clone)]
pub struct FetchLock {
    store: Arc<dyn CoordinationStore>,
    keys: KeySpace,
    token: String,
    ttl: Duration,
}

impl FetchLock {
    pub fn new(store: Arc<dyn CoordinationStore>, keys: KeySpace) -> Self {
        Self {
            store,
            keys,
            token: Uuid::new_v4().to_string(),
            ttl: FETCH_LOCK_TTL,
        }
    }

    /// Override the lease length
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Try to take the lease; false if another run holds it
    pub async fn try_acquire(&self) -> Result<bool> {
        let acquired = self
            .store
            .set_if_absent(&self.keys.fetch_lock(), &self.token, self.ttl)
            .await?;

        if acquired {
            debug!(ttl_secs = self.ttl.as_secs(), "Fetch lock acquired");
        } else {
            info!("Fetch lock held by another run");
        }
        Ok(acquired)
    }

    /// Release the lease early if this instance still holds it
    pub async fn release(&self) -> Result<bool> {
        let released = self
            .store
            .delete_if_equals(&self.keys.fetch_lock(), &self.token)
            .await?;
        debug!(released, "Fetch lock release");
        Ok(released)
    }
}
