use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use lanchat_shared::ProtocolError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File content is empty: {0}")]
    EmptyContent(String),

    #[error("File too large (max {max} bytes)")]
    UploadTooLarge { max: usize },

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::FileNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::EmptyContent(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "File content is empty".to_string())
            }
            ServerError::UploadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Failure to deliver one message to one recipient.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Encode(#[from] ProtocolError),

    #[error("Transport closed: {0}")]
    Closed(String),
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Coordinator is no longer running")]
    Stopped,
}
