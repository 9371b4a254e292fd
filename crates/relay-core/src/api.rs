//! Public HTTP API types for `POST /api/v1/generate`.

use crate::message::Usage;
use serde::{Deserialize, Serialize};

/// Body of a generation request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GenerateRequest {
    /// Caller identity, for logging only.
    #[serde(default)]
    pub user_id: String,
    /// Conversation this request belongs to. Empty disables session affinity.
    #[serde(default)]
    pub conversation_id: String,
    /// The user's prompt.
    pub prompt: String,
    /// Prior turns of the conversation, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
    /// Generation and routing options.
    #[serde(default)]
    pub config: RequestOptions,
}

/// One prior conversation turn as sent by the client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryMessage {
    /// Author role ("user", "assistant", ...).
    pub role: String,
    /// Turn content.
    pub content: String,
}

/// Client-controlled generation and routing options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RequestOptions {
    /// Model the client would prefer, without pinning.
    #[serde(default)]
    pub preferred_model: String,
    /// Model to pin this conversation to. Starting a conversation with this
    /// set creates a forced session.
    #[serde(default)]
    pub force_model: String,
    /// Named routing strategy. Empty lets the gateway derive one from the
    /// prompt.
    #[serde(default)]
    pub preference: String,
    /// Maximum tokens to generate. Zero means the provider default.
    #[serde(default)]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter.
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Whether to stream the response.
    #[serde(default)]
    pub stream: bool,
}

/// Whether a response was served from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheStatus {
    /// Served from the response cache.
    #[serde(rename = "HIT")]
    Hit,
    /// Freshly generated.
    #[serde(rename = "MISS")]
    Miss,
}

/// Details of an automatic session failover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverInfo {
    /// The model the session was pinned to.
    pub original_model: String,
    /// The model the router selected instead.
    pub new_model: String,
    /// Why the failover happened.
    pub reason: String,
}

/// Body of a successful generation response. This exact serialization is also
/// what the response cache stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Generated text.
    pub content: String,
    /// Model that produced the response.
    pub model_used: String,
    /// Token accounting.
    pub usage: Usage,
    /// Wall-clock latency of this request in milliseconds. Overwritten with
    /// the live elapsed time when served from cache.
    pub latency_ms: i64,
    /// Whether retrieved context was prepended to the prompt.
    pub rag_context_used: bool,
    /// HIT when served from cache, MISS otherwise.
    pub cache_status: CacheStatus,
    /// Present when session affinity failed over to another model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover_info: Option<FailoverInfo>,
}
