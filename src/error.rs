use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::products::{BoxError, ProductError};
use crate::upload::UploadError;

/// Errors surfaced by the HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// An upload that failed validation.
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    MethodNotAllowed(&'static str),

    /// A storage failure. Only `message` is shown to the caller.
    #[error("{message}")]
    Storage {
        message: &'static str,
        #[source]
        source: BoxError,
    },
}

impl ApiError {
    /// Logs the underlying error and hides it behind a generic `message`.
    pub fn storage(message: &'static str, source: impl Into<BoxError>) -> Self {
        let source = source.into();
        tracing::error!(error = %source, "{message}");
        Self::Storage { message, source }
    }
}

impl From<ProductError> for ApiError {
    fn from(err: ProductError) -> Self {
        match err {
            ProductError::Invalid(invalid) => Self::BadRequest(invalid.to_string()),
            ProductError::Storage(source) => Self::storage("Failed to save product", source),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_types: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Upload(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let (max_size, allowed_types) = match &self {
            Self::Upload(err) => (err.max_size(), err.allowed_types()),
            _ => (None, None),
        };

        let body = ErrorBody {
            error: self.to_string(),
            max_size,
            allowed_types,
        };
        (status, Json(body)).into_response()
    }
}
