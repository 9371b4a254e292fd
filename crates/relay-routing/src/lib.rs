//! # Relay Routing
//!
//! Model selection for the LLM gateway.
//!
//! This crate provides:
//! - The static router configuration (thresholds, model scores, strategies)
//! - The router itself: pre-filter contenders, normalize across the pool,
//!   score per strategy, pick the winner
//! - The intent classifier that routes tool-shaped prompts to the tool loop
//! - The prompt complexity analyzer that derives a routing preference when
//!   the client did not supply one

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod complexity;
pub mod config;
pub mod intent;
pub mod router;

pub use complexity::PromptAnalyzer;
pub use config::{ModelScores, RouterConfig, RoutingStrategy, Thresholds};
pub use intent::Intent;
pub use router::Router;
