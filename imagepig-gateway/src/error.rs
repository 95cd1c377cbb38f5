use std::fmt;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::gateway::ProviderFailure;
use crate::normalize::Operation;

/// Errors returned by gateway operations.
#[derive(Debug)]
pub enum GatewayError {
    /// Provider credential missing or malformed.
    Config(String),
    /// Caller omitted a required field.
    InvalidRequest { error: String, message: String },
    /// The provider call failed; already classified.
    Provider(ProviderFailure),
    /// Missing or invalid session token.
    Auth(String),
    /// Anything else. Never shown to callers verbatim.
    Internal(String),
}

impl GatewayError {
    pub fn invalid_request(error: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::InvalidRequest {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Config(msg) => write!(f, "configuration error: {msg}"),
            GatewayError::InvalidRequest { error, message } => {
                write!(f, "invalid request: {error} ({message})")
            }
            GatewayError::Provider(failure) => write!(f, "provider error: {failure}"),
            GatewayError::Auth(msg) => write!(f, "auth error: {msg}"),
            GatewayError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

pub type Result<T> = std::result::Result<T, GatewayError>;

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// JSON error body returned by every failing route: a short `error` and an
/// actionable `message`.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ApiErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                error: error.into(),
                message: message.into(),
            },
        }
    }

    /// Map a gateway error raised while serving `operation`.
    ///
    /// Provider failures carry the classified text in `error` and the
    /// operation's hint in `message`.
    pub fn for_operation(operation: Operation, err: GatewayError) -> Self {
        match err {
            GatewayError::Provider(failure) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                failure.user_message(),
                operation.failure_hint(),
            ),
            other => Self::from(other),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Config(msg) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                msg,
                "Image API is not configured properly",
            ),
            GatewayError::InvalidRequest { error, message } => {
                Self::new(StatusCode::BAD_REQUEST, error, message)
            }
            GatewayError::Provider(failure) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                failure.user_message(),
                "Failed to process image request. Please try again.",
            ),
            GatewayError::Auth(msg) => Self::new(StatusCode::UNAUTHORIZED, "Not authorized", msg),
            GatewayError::Internal(msg) => {
                tracing::error!(error = %msg, "unexpected gateway error");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    "Something went wrong. Please try again.",
                )
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "Invalid request body",
            rejection.body_text(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
