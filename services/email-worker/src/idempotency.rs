use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use redis_client::RedisManager;

/// Suppresses duplicate sends. Implementations are injected into the
/// dispatcher so tests can run against the in-memory variant.
pub trait IdempotencyStore: Send + Sync {
    fn seen(&self, key: &str) -> impl std::future::Future<Output = Result<bool, String>> + Send;
    fn mark(
        &self,
        key: &str,
        ttl_seconds: i64,
    ) -> impl std::future::Future<Output = Result<(), String>> + Send;
}

pub struct RedisIdempotencyStore {
    manager: RedisManager,
}

impl RedisIdempotencyStore {
    pub fn new(manager: RedisManager) -> Self {
        Self { manager }
    }
}

impl IdempotencyStore for RedisIdempotencyStore {
    async fn seen(&self, key: &str) -> Result<bool, String> {
        let value = self
            .manager
            .get(key)
            .await
            .map_err(|e| format!("Failed to read idempotency key: {}", e))?;
        Ok(value.is_some())
    }

    async fn mark(&self, key: &str, ttl_seconds: i64) -> Result<(), String> {
        self.manager
            .set_with_ttl(key, "1", ttl_seconds)
            .await
            .map_err(|e| format!("Failed to record idempotency key: {}", e))
    }
}

/// In-memory store with the same TTL semantics, for tests and local runs
/// without Redis.
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn seen(&self, key: &str) -> Result<bool, String> {
        let mut entries = self.entries.lock().map_err(|e| e.to_string())?;
        match entries.get(key) {
            Some(expires_at) if *expires_at > Instant::now() => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn mark(&self, key: &str, ttl_seconds: i64) -> Result<(), String> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds.max(0) as u64);
        let mut entries = self.entries.lock().map_err(|e| e.to_string())?;
        entries.insert(key.to_string(), expires_at);
        Ok(())
    }
}

/// Store that always fails, for exercising the fail-open path.
#[cfg(test)]
pub struct UnavailableStore;

#[cfg(test)]
impl IdempotencyStore for UnavailableStore {
    async fn seen(&self, _key: &str) -> Result<bool, String> {
        Err("store unavailable".to_string())
    }

    async fn mark(&self, _key: &str, _ttl_seconds: i64) -> Result<(), String> {
        Err("store unavailable".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_then_seen() {
        let store = InMemoryIdempotencyStore::new();
        assert!(!store.seen("reg_email_1_TX1").await.unwrap());

        store.mark("reg_email_1_TX1", 604_800).await.unwrap();
        assert!(store.seen("reg_email_1_TX1").await.unwrap());
        assert!(!store.seen("reg_email_2_TX2").await.unwrap());
    }

    #[tokio::test]
    async fn expired_keys_are_not_seen() {
        let store = InMemoryIdempotencyStore::new();
        store.mark("payment_email_p_1", 0).await.unwrap();
        assert!(!store.seen("payment_email_p_1").await.unwrap());
    }
}
