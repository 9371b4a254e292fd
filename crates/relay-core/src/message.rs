//! The uniform conversation model shared by every provider adapter.
//!
//! Each adapter translates these types into its provider's wire dialect and
//! back; nothing above the adapter layer ever sees a provider-specific shape.

use crate::tool::ToolCall;
use serde::{Deserialize, Serialize};

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Result of a tool execution, answering a prior assistant tool call.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in a conversation.
///
/// Invariant: a message with [`Role::Tool`] carries a `tool_call_id` matching
/// the id of a prior assistant tool call in the same conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who authored the message.
    pub role: Role,
    /// Text content.
    pub content: String,
    /// For tool-result messages, the id of the tool call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For assistant messages, the tool calls requested by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create an assistant message that carries tool calls.
    #[must_use]
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        }
    }

    /// Create a tool-result message answering `tool_call_id`.
    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }
}

/// Parameters controlling a single generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerationConfig {
    /// Model id to generate with (e.g. "gpt-4o", "claude-3-opus-20240229").
    pub model: String,
    /// Maximum tokens to generate. Zero means the provider default.
    pub max_tokens: u32,
    /// Sampling temperature. `None` leaves the provider default.
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter. `None` leaves the provider default.
    pub top_p: Option<f32>,
    /// Whether the caller intends to stream this request.
    pub stream: bool,
}

impl GenerationConfig {
    /// Create a config for `model` with everything else defaulted.
    #[must_use]
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

/// Token usage for one generation call.
///
/// Invariant: `total_tokens = prompt_tokens + completion_tokens` whenever both
/// sides are known. Adapters whose provider omits completion counts recompute
/// them via a secondary token-count call before returning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens produced by the completion.
    #[serde(default)]
    pub completion_tokens: u32,
    /// Sum of both sides.
    #[serde(default)]
    pub total_tokens: u32,
}

impl Usage {
    /// Accumulate another usage record into this one. Used by the tool loop,
    /// which sums usage across iterations.
    pub fn add(&mut self, other: Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// The complete, non-streamed output of one generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    /// Generated text.
    pub content: String,
    /// Tool calls requested by the model, in order. Empty when the model
    /// answered directly.
    pub tool_calls: Vec<ToolCall>,
    /// Token accounting for the call.
    pub usage: Usage,
}

/// One item of a streaming generation.
///
/// A stream yields `Result<StreamChunk, RelayError>` items and terminates
/// after at most one [`StreamChunk::Usage`] or one `Err`.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// A fragment of generated text.
    Content(String),
    /// A (possibly partial) tool call emitted mid-stream.
    ToolCallDelta(ToolCall),
    /// Final token accounting, sent once at the end of the stream.
    Usage(Usage),
}
