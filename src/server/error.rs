//! HTTP error mapping: every failure becomes `{error, code}` JSON.

use crate::error::SlidesError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No file part named 'files[]' in the request")]
    NoFile,

    #[error("Only PDF files are accepted (got '{0}')")]
    InvalidFileType(String),

    #[error("Upload exceeds the {max} byte limit")]
    PayloadTooLarge { max: usize },

    #[error("Request must name an uploaded file via 'filepath' or 'filename'")]
    MissingSource,

    #[error("Path is outside the upload directory: {0}")]
    InvalidPath(String),

    #[error("Malformed multipart body: {0}")]
    Multipart(String),

    #[error("Could not store upload: {0}")]
    Storage(#[from] std::io::Error),

    #[error(transparent)]
    Analysis(#[from] SlidesError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoFile
            | ApiError::InvalidFileType(_)
            | ApiError::MissingSource
            | ApiError::InvalidPath(_)
            | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Analysis(e) => match e {
                SlidesError::SourceNotFound { .. } => StatusCode::NOT_FOUND,
                SlidesError::SourceTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                SlidesError::InvalidInput { .. }
                | SlidesError::UnsupportedFormat { .. }
                | SlidesError::CorruptDocument { .. }
                | SlidesError::PasswordRequired { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NoFile => "NO_FILE",
            ApiError::InvalidFileType(_) => "INVALID_FILE_TYPE",
            ApiError::PayloadTooLarge { .. } => "FILE_TOO_LARGE",
            ApiError::MissingSource => "MISSING_SOURCE",
            ApiError::InvalidPath(_) => "INVALID_PATH",
            ApiError::Multipart(_) => "MALFORMED_UPLOAD",
            ApiError::Storage(_) => "STORAGE_ERROR",
            ApiError::Analysis(e) => match e {
                SlidesError::SourceNotFound { .. } => "SOURCE_NOT_FOUND",
                SlidesError::SourceTooLarge { .. } => "SOURCE_TOO_LARGE",
                SlidesError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
                SlidesError::CorruptDocument { .. } => "CORRUPT_DOCUMENT",
                SlidesError::PasswordRequired { .. } => "PASSWORD_REQUIRED",
                SlidesError::RenderFailure { .. } => "RENDER_FAILURE",
                SlidesError::ProviderNotConfigured { .. } => "PROVIDER_NOT_CONFIGURED",
                _ => "INTERNAL_ERROR",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        } else {
            tracing::debug!(code = self.code(), "{}", self);
        }
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(ApiError::NoFile.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::PayloadTooLarge { max: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        let missing = ApiError::from(SlidesError::SourceNotFound {
            path: PathBuf::from("uploads/x.pdf"),
        });
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.code(), "SOURCE_NOT_FOUND");
        let render = ApiError::from(SlidesError::RenderFailure {
            page: 1,
            detail: "boom".into(),
        });
        assert_eq!(render.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
