//! Shared coordination store
//!
//! The quota ledger, fetch cursor and fetch lock all live in one store that
//! every worker replica can reach. Only single-operation atomicity is assumed:
//! get, set with optional expiry, set-if-absent with expiry, and
//! compare-and-delete.

use crate::Result;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Deletes KEYS[1] only while it still holds ARGV[1]
const DELETE_IF_EQUALS_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Key/value store with expiry, shared across ingestion runs
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Read a live value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite a value, optionally expiring it after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Atomically create `key` with an expiry; false if a live value exists
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Atomically delete `key` if it currently holds `expected`
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;
}

/// Key layout inside the coordination store
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Block marker for a hashed API key
    pub fn quota_block(&self, key_hash: &str) -> String {
        format!("{}:quota_blocked:{}", self.prefix, key_hash)
    }

    pub fn last_fetch_time(&self) -> String {
        format!("{}:last_fetch_time", self.prefix)
    }

    pub fn fetch_lock(&self) -> String {
        format!("{}:fetch_lock", self.prefix)
    }

    pub fn dead_letter(&self) -> String {
        format!("{}:dead_letter", self.prefix)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("youtube")
    }
}

/// Redis-backed coordination store
#[derive(Clone)]
pub struct RedisCoordinationStore {
    manager: ConnectionManager,
}

impl RedisCoordinationStore {
    /// Connect to Redis and verify the connection with a PING
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Initializing Redis coordination store");

        let client = Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        let mut conn = manager.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;

        info!("Redis coordination store ready");
        Ok(Self { manager })
    }

    /// Connection handle shared with other Redis-backed components
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(ttl) => {
                conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl)).await?;
            }
            None => {
                conn.set::<_, _, ()>(key, value).await?;
            }
        }
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;

        debug!(key, acquired = reply.is_some(), "SET NX EX");
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let deleted: i64 = Script::new(DELETE_IF_EQUALS_SCRIPT)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}

/// Redis expiries are whole seconds and must be positive
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Process-local coordination store
///
/// Only coordinates runs inside a single process. Used for tests and for
/// running without Redis during development.
#[derive(Default)]
pub struct InMemoryCoordinationStore {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(expires_at: &Option<Instant>) -> bool {
        expires_at.map_or(true, |deadline| Instant::now() < deadline)
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let live = match entries.get(key) {
            Some((value, expires_at)) if Self::is_live(expires_at) => Some(value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if live.is_none() {
            entries.remove(key);
        }
        Ok(live)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if let Some((_, expires_at)) = entries.get(key) {
            if Self::is_live(expires_at) {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let matches = matches!(
            entries.get(key),
            Some((value, expires_at)) if value == expected && Self::is_live(expires_at)
        );
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_space_layout() {
        let keys = KeySpace::default();
        assert_eq!(keys.fetch_lock(), "youtube:fetch_lock");
        assert_eq!(keys.last_fetch_time(), "youtube:last_fetch_time");
        assert_eq!(keys.dead_letter(), "youtube:dead_letter");
        assert_eq!(keys.quota_block("abc"), "youtube:quota_blocked:abc");
    }

    #[test]
    fn test_ttl_secs_never_zero() {
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(60)), 60);
    }

    #[tokio::test]
    async fn test_in_memory_set_and_get() {
        let store = InMemoryCoordinationStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v1", None).await.unwrap();
        store.set("k", "v2", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_in_memory_expiry() {
        let store = InMemoryCoordinationStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_set_if_absent() {
        let store = InMemoryCoordinationStore::new();
        let ttl = Duration::from_millis(30);

        assert!(store.set_if_absent("lock", "a", ttl).await.unwrap());
        assert!(!store.set_if_absent("lock", "b", ttl).await.unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.set_if_absent("lock", "b", ttl).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_in_memory_delete_if_equals() {
        let store = InMemoryCoordinationStore::new();
        store
            .set_if_absent("lock", "owner", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(!store.delete_if_equals("lock", "intruder").await.unwrap());
        assert!(store.get("lock").await.unwrap().is_some());

        assert!(store.delete_if_equals("lock", "owner").await.unwrap());
        assert!(store.get("lock").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_redis_set_if_absent() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let store = match RedisCoordinationStore::connect(&redis_url).await {
            Ok(s) => s,
            Err(_) => {
                eprintln!("Skipping test: Redis not available");
                return;
            }
        };

        let key = format!("vidfeed:test:{}", uuid::Uuid::new_v4());
        let ttl = Duration::from_secs(5);

        assert!(store.set_if_absent(&key, "a", ttl).await.unwrap());
        assert!(!store.set_if_absent(&key, "b", ttl).await.unwrap());
        assert!(!store.delete_if_equals(&key, "b").await.unwrap());
        assert!(store.delete_if_equals(&key, "a").await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());
    }
}
