//! # Relay Server
//!
//! HTTP server and request orchestrator for the LLM gateway.
//!
//! This crate ties the other crates together per request: cache lookup,
//! session resolution, intent classification, context retrieval, provider
//! dispatch (with the tool loop for tool-shaped intents), profile updates,
//! and the cache write. It also owns environment configuration, the app
//! state, error-to-status mapping, and the background health checker.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod routes;
pub mod state;

pub use config::AppConfig;
pub use error::ApiError;
pub use handlers::TOOL_LOOP_MODEL;
pub use routes::create_router;
pub use state::AppState;
