//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use parley_types::error::ChatError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors surfaced by the chat service.
    Chat(ChatError),
    /// Request validation error raised by the HTTP layer itself.
    Validation(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl AppError {
    /// HTTP status for this error.
    ///
    /// Backend failures reuse the backend's own status when it reported one.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Chat(ChatError::Backend(e)) => e
                .status()
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            AppError::Chat(e) => match e.kind() {
                "NOT_FOUND" => StatusCode::NOT_FOUND,
                "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
                "RETRIES_EXHAUSTED" => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Chat(e) => e.kind(),
            AppError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Chat(e) => write!(f, "{e}"),
            AppError::Validation(msg) => f.write_str(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body = ApiResponse::error(self.code(), &self.to_string());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::error::{BackendError, StoreError};

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::from(ChatError::NotFound(4)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(ChatError::Persistence(StoreError::NotFound)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(ChatError::Validation("empty".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(ChatError::RetriesExhausted {
                attempts: 3,
                last: StoreError::Busy("locked".into()),
            })
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(ChatError::Persistence(StoreError::Query("bad".into()))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_backend_status_passes_through() {
        let limited = AppError::from(ChatError::Backend(BackendError::Status {
            status: 429,
            body: "quota".into(),
        }));
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.code(), "BACKEND_ERROR");

        let transport = AppError::from(ChatError::Backend(BackendError::Transport("reset".into())));
        assert_eq!(transport.status(), StatusCode::BAD_GATEWAY);
    }
}
