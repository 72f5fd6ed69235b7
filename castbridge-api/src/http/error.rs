// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers.
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure.
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Cancellation is the one non-error: the client went away, answer
        // with an empty 204 and no body.
        if self.status == StatusCode::NO_CONTENT {
            return StatusCode::NO_CONTENT.into_response();
        }
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            status: status.as_u16(),
        });
        (status, body).into_response()
    }
}

/// Convert `castbridge_core` errors to HTTP errors.
impl From<castbridge_core::Error> for AppError {
    fn from(err: castbridge_core::Error) -> Self {
        use castbridge_core::Error;

        match err {
            Error::Cancelled => Self::new(StatusCode::NO_CONTENT, "cancelled"),
            Error::NotFound(msg) => Self::not_found(msg),
            Error::NoSubtitles => Self::not_found("subtitles are disabled or burned in"),
            Error::Upstream { .. } => {
                tracing::warn!("upstream error: {}", err);
                Self::bad_gateway(err.to_string())
            }
            // Manifests always come from upstream; a parse failure is the
            // origin's fault.
            Error::MalformedManifest(msg) => {
                tracing::warn!("malformed manifest: {}", msg);
                Self::bad_gateway(format!("malformed manifest: {msg}"))
            }
            // Subtitle documents are local files or captured payloads, not
            // live upstream responses.
            Error::MalformedSubtitle(msg) => {
                tracing::warn!("malformed subtitle: {}", msg);
                Self::bad_request(format!("malformed subtitle: {msg}"))
            }
            Error::TranscoderUnavailable { .. } => {
                tracing::error!("{}", err);
                Self::internal(err.to_string())
            }
            Error::TranscoderFailed { stderr } => {
                tracing::error!("transcoder failed: {}", stderr);
                Self::internal("transcoder failed")
            }
            Error::ExtractionStale(msg) => {
                tracing::warn!("stale extraction: {}", msg);
                Self::bad_gateway(format!("extraction no longer valid: {msg}"))
            }
            Error::Io(msg) | Error::Serialization(msg) | Error::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                Self::internal("internal server error")
            }
        }
    }
}
