//! # Relay Core
//!
//! Core types, traits, and error handling for the LLM gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - The uniform message / tool-call / usage model shared by all providers
//! - Generation configuration and results
//! - The public HTTP API request and response types
//! - Versioned, content-addressed cache keys
//! - Error types and handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod cache_key;
pub mod error;
pub mod message;
pub mod tool;

// Re-export commonly used types
pub use api::{
    CacheStatus, FailoverInfo, GenerateRequest, GenerateResponse, HistoryMessage, RequestOptions,
};
pub use cache_key::{sha256_hex, versioned_cache_key, ComponentVersions, COMPONENT_VERSIONS};
pub use error::{RelayError, RelayResult};
pub use message::{GenerationConfig, GenerationResult, Message, Role, StreamChunk, Usage};
pub use tool::{FunctionCall, FunctionSpec, JsonSchema, SchemaType, Tool, ToolCall};
