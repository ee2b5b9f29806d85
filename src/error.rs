use std::fmt::Display;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("job is still processing: {0}")]
    JobBusy(String),
    #[error("external tool failed: {0}")]
    ExternalTool(String),
    #[error("stream selection failed: {0}")]
    Selection(String),
    #[error("blob storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Validation(_) | AppError::JobBusy(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ExternalTool(_) => StatusCode::BAD_GATEWAY,
            AppError::Selection(_)
            | AppError::Upload(_)
            | AppError::Persistence(_)
            | AppError::Internal(_)
            | AppError::Io(_)
            | AppError::ObjectStore(_)
            | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!(?status, error = %self);

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl AppError {
    pub fn not_found(resource: impl Display) -> Self {
        Self::NotFound(resource.to_string())
    }

    pub fn validation(message: impl Display) -> Self {
        Self::Validation(message.to_string())
    }

    pub fn busy(message: impl Display) -> Self {
        Self::JobBusy(message.to_string())
    }

    pub fn external_tool(message: impl Display) -> Self {
        Self::ExternalTool(message.to_string())
    }

    pub fn selection(message: impl Display) -> Self {
        Self::Selection(message.to_string())
    }

    pub fn storage_unavailable(message: impl Display) -> Self {
        Self::StorageUnavailable(message.to_string())
    }

    pub fn upload(message: impl Display) -> Self {
        Self::Upload(message.to_string())
    }

    pub fn persistence(message: impl Display) -> Self {
        Self::Persistence(message.to_string())
    }

    pub fn internal(message: impl Display) -> Self {
        Self::Internal(message.to_string())
    }
}
