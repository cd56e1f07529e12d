//! Error types for the MetaClean server

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::dispatch::{DispatchError, FailureKind};

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
///
/// Client errors carry their message to the response body. Server errors
/// are logged in full and answered with a generic message so filesystem
/// layout never leaks.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    UnsupportedFormat(String),

    #[error("{0}")]
    Engine(String),

    #[error("{0}")]
    Dispatch(String),

    #[error("Upload error: {0}")]
    Upload(#[from] MultipartError),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Job(failure) => match failure.kind {
                FailureKind::UnsupportedFormat => AppError::UnsupportedFormat(failure.message),
                FailureKind::Engine => AppError::Engine(failure.message),
                FailureKind::Resource => AppError::Resource(failure.message),
            },
            other => AppError::Dispatch(other.to_string()),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_)
            | AppError::UnsupportedFormat(_)
            | AppError::Engine(_)
            | AppError::Dispatch(_) => StatusCode::BAD_REQUEST,
            AppError::Upload(e) => e.status(),
            AppError::Resource(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = match &self {
            AppError::BadRequest(msg)
            | AppError::UnsupportedFormat(msg)
            | AppError::Engine(msg)
            | AppError::Dispatch(msg) => {
                tracing::warn!(status = status.as_u16(), "Request rejected: {}", msg);
                msg.clone()
            }
            AppError::Upload(e) => {
                tracing::warn!(status = status.as_u16(), "Upload rejected: {}", e);
                e.body_text()
            }
            AppError::Resource(msg) => {
                tracing::error!("Resource error: {}", msg);
                "File error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::JobFailure;

    #[test]
    fn test_dispatch_error_mapping() {
        let unsupported: AppError =
            DispatchError::Job(JobFailure::unsupported("application/x-garbage")).into();
        assert_eq!(unsupported.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            unsupported.to_string(),
            "format (application/x-garbage) is not supported"
        );

        let resource: AppError = DispatchError::Job(JobFailure::resource("disk full")).into();
        assert_eq!(resource.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let crashed: AppError = DispatchError::WorkerCrashed("exit status: 139".into()).into();
        assert_eq!(crashed.status_code(), StatusCode::BAD_REQUEST);
        assert!(crashed.to_string().contains("139"));
    }

    #[tokio::test]
    async fn test_resource_error_hides_detail() {
        let response = AppError::Resource("/srv/work/1234-secret.pdf: EACCES".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "File error");
    }
}
