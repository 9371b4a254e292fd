//! Conversation → model affinity, persisted as `session:<conversation_id>`
//! hashes with a sliding one-hour TTL.
//!
//! Sessions are last-writer-wins: concurrent requests for the same
//! conversation race at the store and the later pin survives.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use relay_core::{RelayError, RelayResult};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Session lifetime, refreshed on every hit.
pub const SESSION_TTL_SECS: i64 = 3600;

/// A pinned conversation → model association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The pinned model.
    pub model_id: String,
    /// Whether the user explicitly locked the conversation to this model
    /// (true) or the router pinned it dynamically (false).
    pub is_forced: bool,
}

fn session_key(conversation_id: &str) -> String {
    format!("session:{conversation_id}")
}

/// Redis-backed session store.
#[derive(Clone)]
pub struct SessionStore {
    conn: ConnectionManager,
}

impl SessionStore {
    /// Create a store over an established connection.
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Look up the session for a conversation, if one exists.
    ///
    /// # Errors
    /// Returns a store error on Redis failures.
    pub async fn get(&self, conversation_id: &str) -> RelayResult<Option<Session>> {
        let key = session_key(conversation_id);
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(&key)
            .await
            .map_err(|e| RelayError::store(format!("HGETALL {key} failed: {e}")))?;

        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(Session {
            model_id: fields.get("model_id").cloned().unwrap_or_default(),
            is_forced: fields.get("is_forced").map(String::as_str) == Some("true"),
        }))
    }

    /// Pin a conversation to a model and start its TTL. Best effort: a failed
    /// pin costs affinity, not correctness.
    pub async fn pin(&self, conversation_id: &str, model_id: &str, is_forced: bool) {
        let key = session_key(conversation_id);
        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> = redis::pipe()
            .atomic()
            .hset(&key, "model_id", model_id)
            .hset(&key, "is_forced", if is_forced { "true" } else { "false" })
            .expire(&key, SESSION_TTL_SECS)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                debug!(
                    conversation = conversation_id,
                    model = model_id,
                    forced = is_forced,
                    "pinned session"
                );
            }
            Err(e) => warn!(conversation = conversation_id, error = %e, "failed to pin session"),
        }
    }

    /// Slide the session TTL forward by another hour. Best effort.
    pub async fn refresh_ttl(&self, conversation_id: &str) {
        let key = session_key(conversation_id);
        let mut conn = self.conn.clone();
        if let Err(e) = conn.expire::<_, ()>(&key, SESSION_TTL_SECS).await {
            warn!(conversation = conversation_id, error = %e, "failed to refresh session TTL");
        }
    }
}
