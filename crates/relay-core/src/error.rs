//! Error types for the gateway.
//!
//! All fallible gateway operations return [`RelayResult`]. The orchestrator in
//! `relay-server` is the only place these variants are mapped to HTTP status
//! codes; everything below it propagates `RelayError` with `?`.

use thiserror::Error;

/// Result type used throughout the gateway.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur inside the gateway core.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Invalid or missing configuration at startup.
    #[error("configuration error: {message}")]
    Configuration {
        /// What was wrong with the configuration.
        message: String,
    },

    /// An upstream provider call failed.
    #[error("provider error ({provider}): {message}")]
    Provider {
        /// Provider family that produced the error (e.g. "openai").
        provider: &'static str,
        /// Error detail, including attempt counts for exhausted retries.
        message: String,
        /// HTTP status code from the provider, if the request got that far.
        status_code: Option<u16>,
        /// Whether the caller may retry the operation.
        retryable: bool,
    },

    /// Request validation failed before any upstream call.
    #[error("validation error: {message}")]
    Validation {
        /// What was invalid about the request.
        message: String,
    },

    /// The router could not produce a model for this request.
    #[error("{message}")]
    Routing {
        /// Routing failure detail.
        message: String,
    },

    /// A key-value store operation failed.
    #[error("store error: {message}")]
    Store {
        /// Store failure detail.
        message: String,
    },

    /// Context retrieval (embedding or vector query) failed.
    #[error("retrieval error: {message}")]
    Retrieval {
        /// Retrieval failure detail.
        message: String,
    },

    /// A streaming response could not be parsed or was interrupted.
    #[error("streaming error: {message}")]
    Streaming {
        /// Streaming failure detail.
        message: String,
    },

    /// A tool could not be resolved or executed.
    #[error("tool error: {message}")]
    Tool {
        /// Tool failure detail.
        message: String,
    },

    /// The tool loop ran past its iteration bound.
    #[error("exceeded maximum number of tool calls")]
    ToolLoopExceeded,

    /// Anything else.
    #[error("internal error: {message}")]
    Internal {
        /// Failure detail.
        message: String,
    },
}

impl RelayError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a provider error.
    pub fn provider(
        provider: &'static str,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a routing error.
    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing {
            message: message.into(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a retrieval error.
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval {
            message: message.into(),
        }
    }

    /// Create a streaming error.
    pub fn streaming(message: impl Into<String>) -> Self {
        Self::Streaming {
            message: message.into(),
        }
    }

    /// Create a tool error.
    pub fn tool(message: impl Into<String>) -> Self {
        Self::Tool {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the failed operation could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Store { .. } | Self::Streaming { .. } => true,
            _ => false,
        }
    }
}
