//! # Relay Store
//!
//! Redis-backed shared state for the LLM gateway.
//!
//! Profiles, sessions and cached responses are shared process-wide (and
//! replica-wide) through the key-value store; no request-visible mutable state
//! lives in process. All handles clone a multiplexed
//! [`redis::aio::ConnectionManager`], so they are cheap to `Clone` into tasks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod profiler;
pub mod response_cache;
pub mod session;

pub use profiler::{CostTable, ModelProfile, ModelStatus, Profiler, TokenCosts};
pub use response_cache::ResponseCache;
pub use session::{Session, SessionStore};

use redis::aio::ConnectionManager;
use relay_core::{RelayError, RelayResult};

/// Connect to Redis at `addr` (host:port or a full `redis://` URL).
///
/// # Errors
/// Returns a store error if the client cannot be created or the connection
/// cannot be established.
pub async fn connect(addr: &str) -> RelayResult<ConnectionManager> {
    let url = if addr.starts_with("redis://") || addr.starts_with("rediss://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    };

    let client = redis::Client::open(url)
        .map_err(|e| RelayError::store(format!("failed to create Redis client: {e}")))?;
    client
        .get_connection_manager()
        .await
        .map_err(|e| RelayError::store(format!("could not connect to Redis: {e}")))
}
