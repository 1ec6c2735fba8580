use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use resume_ingest::error::WorkerError;
use resume_ingest::registry::RegistryError;
use resume_ingest::IngestError;
use thiserror::Error;

/// Errors returned by handlers. Bodies carry a single `detail` field.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(e) => ApiError::BadRequest(e.to_string()),
            IngestError::Registry(RegistryError::NotFound(_)) => {
                ApiError::NotFound("Task not found".to_string())
            }
            IngestError::HistoryNotFound(_) => ApiError::NotFound("Resume not found".to_string()),
            IngestError::Worker(e @ (WorkerError::QueueFull | WorkerError::ChannelClosed)) => {
                ApiError::Unavailable(e.to_string())
            }
            other => {
                tracing::error!(error = %other, "Request failed");
                ApiError::Internal("Internal server error".to_string())
            }
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!(error = %err, "Blocking task failed");
        ApiError::Internal("Internal server error".to_string())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resume_ingest::error::ValidationError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                IngestError::Validation(ValidationError::NoFiles),
                StatusCode::BAD_REQUEST,
            ),
            (
                IngestError::Registry(RegistryError::NotFound("t".into())),
                StatusCode::NOT_FOUND,
            ),
            (IngestError::HistoryNotFound(4), StatusCode::NOT_FOUND),
            (
                IngestError::Worker(WorkerError::QueueFull),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                IngestError::Worker(WorkerError::SpawnFailed("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let err = ApiError::from(IngestError::StoreUpload {
            path: "/srv/uploads".into(),
            source: std::io::Error::other("disk full"),
        });
        assert_eq!(err.to_string(), "Internal server error");
    }
}
