//! Mapping from internal errors to HTTP responses.
//!
//! The generate handler is the only place internal errors become status
//! codes; everything below it returns `RelayError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_core::RelayError;
use serde::Serialize;

/// An error ready to be rendered as an HTTP response.
#[derive(Debug)]
pub enum ApiError {
    /// 400: malformed or invalid request body.
    BadRequest(String),
    /// 424: the requested force_model is offline; carries healthy
    /// alternatives.
    FailedDependency {
        /// Human-readable error.
        message: String,
        /// Online models the caller could use instead.
        available_models: Vec<String>,
    },
    /// 503: no model survived the router's pre-filter.
    NoSuitableModel(String),
    /// 500: anything else.
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    available_models: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::BadRequest(error) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error,
                    available_models: None,
                },
            ),
            Self::FailedDependency {
                message,
                available_models,
            } => (
                StatusCode::FAILED_DEPENDENCY,
                ErrorBody {
                    error: message,
                    available_models: Some(available_models),
                },
            ),
            Self::NoSuitableModel(error) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    error,
                    available_models: None,
                },
            ),
            Self::Internal(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error,
                    available_models: None,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Routing { message } => Self::NoSuitableModel(message),
            RelayError::Validation { message } => Self::BadRequest(message),
            other => Self::Internal(other.to_string()),
        }
    }
}
