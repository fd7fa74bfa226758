use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use uuid::Uuid;

use crate::models::ErrorResponse;

/// Coarse error classification callers map to responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Invalid,
    Internal,
    NotImplemented,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not found: {0}")]
    ProviderNotFound(Uuid),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Store is closed")]
    Closed,

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::ProviderNotFound(_) => ErrorKind::NotFound,
            ProviderError::Validation(_) => ErrorKind::Invalid,
            ProviderError::NotImplemented(_) => ErrorKind::NotImplemented,
            ProviderError::Closed
            | ProviderError::Qdrant(_)
            | ProviderError::Embedding(_)
            | ProviderError::Config(_)
            | ProviderError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Invalid => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        }
    }

    /// Message safe to return to API clients. Qdrant errors carry gRPC status
    /// text, which stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ProviderError::Qdrant(_) => "Vector store request failed".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<qdrant_client::QdrantError> for ProviderError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        ProviderError::Qdrant(err.to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Embedding(err.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Internal(format!("JSON error: {}", err))
    }
}

impl IntoResponse for ProviderError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ProviderError::ProviderNotFound(Uuid::nil()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ProviderError::Validation("bad".into()).kind(),
            ErrorKind::Invalid
        );
        assert_eq!(ProviderError::Closed.kind(), ErrorKind::Internal);
        assert_eq!(
            ProviderError::Qdrant("unavailable".into()).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            ProviderError::NotImplemented("x".into()).kind(),
            ErrorKind::NotImplemented
        );
    }

    #[tokio::test]
    async fn test_qdrant_detail_stays_out_of_response() {
        let err =
            ProviderError::Qdrant("status: Unavailable, message: \"tcp connect error\"".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Vector store request failed");
    }

    #[tokio::test]
    async fn test_validation_message_reaches_response() {
        let response = ProviderError::Validation("name is required".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Invalid input: name is required");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ProviderError::ProviderNotFound(Uuid::nil()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ProviderError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProviderError::Closed.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProviderError::NotImplemented("x".into()).status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
    }
}
