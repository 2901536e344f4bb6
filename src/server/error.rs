//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`ydls_core::Error`] so that route handlers
//! can return `Result<T, AppError>` and use `?` on pipeline calls.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use ydls_core::Error;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: Error,
}

impl AppError {
    pub fn new(inner: Error) -> Self {
        Self { inner }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.inner.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.inner, "Request failed");
        } else {
            tracing::info!(status = %status, error = %self.inner, "Request rejected");
        }

        let code = match &self.inner {
            Error::InvalidOption(_) => "invalid_option",
            Error::Resolve { .. } => "resolve_error",
            Error::Pipeline { .. } => "pipeline_error",
            Error::Cancelled => "cancelled",
            Error::Catalog(_) => "catalog_error",
            Error::Config(_) => "config_error",
            Error::Tool { .. } => "tool_error",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        };

        let body = json!({
            "error": self.inner.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
