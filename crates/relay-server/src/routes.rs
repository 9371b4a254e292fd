//! Route definitions for the gateway API.

use crate::{handlers, state::AppState};
use axum::routing::{get, post};
use axum::Router;

/// Create the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/generate", post(handlers::generate))
        .with_state(state)
}
