//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<T, AppError>`; any [`oa_core::Error`]
//! converts with `?` and renders as a JSON body with a stable `code`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: oa_core::Error,
}

impl AppError {
    pub fn new(inner: oa_core::Error) -> Self {
        Self { inner }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(oa_core::Error::Conflict(message.into()))
    }
}

impl From<oa_core::Error> for AppError {
    fn from(e: oa_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.inner, "Server error in API handler");
        }

        let code = match &self.inner {
            oa_core::Error::NotFound { .. } => "not_found",
            oa_core::Error::Validation(_) => "validation_error",
            oa_core::Error::Conflict(_) => "conflict",
            oa_core::Error::Database { .. } => "database_error",
            oa_core::Error::Io { .. } => "io_error",
            oa_core::Error::Tool { .. } => "tool_error",
            oa_core::Error::Remote(_) => "remote_error",
            oa_core::Error::Internal(_) => "internal_error",
        };

        let body = json!({
            "error": self.inner.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
