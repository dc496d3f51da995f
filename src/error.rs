//! Console error types with HTTP status code mapping.
//!
//! [`StoreError`] is what every shared-store operation fails with.
//! [`ConsoleError`] is the central error type for the console; each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 3002,
///     "message": "command not sent: connection refused",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see the table on [`ConsoleError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Failure reported by the shared store, its transport, or its change feed.
///
/// `code` carries the backend's own error code when there is one (a
/// PostgreSQL SQLSTATE, `"read_only"`, `"unavailable"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("store error: {message}")]
pub struct StoreError {
    /// Human-readable description.
    pub message: String,
    /// Backend error code, if any.
    pub code: Option<String>,
}

impl StoreError {
    /// Creates an error without a backend code.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Creates an error carrying a backend code.
    #[must_use]
    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let code = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|c| c.into_owned());
        Self {
            message: err.to_string(),
            code,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_code(err.to_string(), "decode")
    }
}

/// Console error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                   |
/// |-----------|-----------------|-------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request               |
/// | 2000–2999 | Not Found       | 404 Not Found                 |
/// | 3000–3999 | Server / Store  | 500 / 503 / 504               |
/// | 4000–4999 | Control plane   | upstream status / 502         |
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Command type or target identification missing.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Requested row or resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient store failure on read, write or subscribe.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The command queue write failed; no entry exists.
    #[error("command not sent: {0}")]
    CommandNotSent(StoreError),

    /// Missing or malformed credentials for a feature.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Waiting for a command outcome ran out of time. The command may still
    /// complete later.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The hosting control plane answered with a non-success status.
    #[error("control plane returned {status}: {message}")]
    ControlPlane {
        /// Upstream HTTP status.
        status: u16,
        /// Upstream body or summary.
        message: String,
    },

    /// The hosting control plane could not be reached.
    #[error("control plane unreachable: {0}")]
    ControlPlaneUnreachable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConsoleError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidCommand(_) => 1002,
            Self::NotFound(_) => 2001,
            Self::Internal(_) => 3000,
            Self::Store(_) => 3001,
            Self::CommandNotSent(_) => 3002,
            Self::Configuration(_) => 3003,
            Self::Timeout(_) => 3004,
            Self::ControlPlane { .. } => 4001,
            Self::ControlPlaneUnreachable(_) => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidCommand(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::CommandNotSent(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Configuration(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ControlPlane { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::ControlPlaneUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Returns `true` for failures the next poll or reconnect recovers from.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Store(_)
                | Self::CommandNotSent(_)
                | Self::ControlPlaneUnreachable(_)
                | Self::Timeout(_)
        )
    }
}

impl IntoResponse for ConsoleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match &self {
            Self::Store(err) | Self::CommandNotSent(err) => err.code.clone(),
            _ => None,
        };
        if status.is_server_error() {
            tracing::warn!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
