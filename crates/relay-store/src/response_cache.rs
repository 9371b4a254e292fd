//! Whole-response cache keyed by versioned cache keys.
//!
//! Stores the serialized `GenerateResponse` for 24 hours. There is no
//! negative caching, and writes are best-effort: a failed write is logged and
//! the request proceeds.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};

/// Response cache lifetime.
pub const RESPONSE_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Redis-backed response cache.
#[derive(Clone)]
pub struct ResponseCache {
    conn: ConnectionManager,
}

impl ResponseCache {
    /// Create a cache over an established connection.
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Look up a cached response. Store failures read as misses.
    pub async fn check(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "response cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a response under `key` for 24 hours. Best effort.
    pub async fn put(&self, key: &str, value: &str) {
        let mut conn = self.conn.clone();
        match conn
            .set_ex::<_, _, ()>(key, value, RESPONSE_CACHE_TTL_SECS)
            .await
        {
            Ok(()) => debug!(key, "response cached"),
            Err(e) => warn!(error = %e, "response cache write failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Redis at 127.0.0.1:6379"]
    async fn put_then_check_round_trips() {
        let conn = crate::connect("127.0.0.1:6379").await.unwrap();
        let cache = ResponseCache::new(conn);

        cache.put("llmcache:test:tv1.0_rv1.0_pv1.0", "{\"content\":\"x\"}").await;
        let value = cache.check("llmcache:test:tv1.0_rv1.0_pv1.0").await;
        assert_eq!(value.as_deref(), Some("{\"content\":\"x\"}"));

        assert!(cache.check("llmcache:absent:tv1.0_rv1.0_pv1.0").await.is_none());
    }
}
