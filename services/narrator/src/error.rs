//! Error taxonomy for the narrator service.
//!
//! Every variant maps to a status code and an opaque public message. The
//! detailed cause is only ever written to the server log.

use crate::pages;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

pub type Result<T> = std::result::Result<T, NarratorError>;

/// Errors raised while handling a submission or rendering results
#[derive(Error, Debug)]
pub enum NarratorError {
    #[error("No file was submitted under the `file` field")]
    MissingFile,

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Upload exceeds the {limit} byte limit")]
    UploadTooLarge { limit: usize },

    #[error("Unsupported content type: {0}")]
    UnsupportedMediaType(String),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("Object already exists: {0}")]
    ObjectExists(String),

    #[error("Metadata store error: {0}")]
    MetadataStore(String),

    #[error("Classification service error: {0}")]
    Classification(String),

    #[error("Classification service returned no concepts")]
    EmptyClassification,

    #[error("Speech synthesis error: {0}")]
    Synthesis(String),

    #[error("No submissions have been recorded yet")]
    NoRecords,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for NarratorError {
    fn from(e: sqlx::Error) -> Self {
        NarratorError::MetadataStore(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for NarratorError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        NarratorError::MetadataStore(e.to_string())
    }
}

/// Error response body for the JSON API
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl NarratorError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            NarratorError::MissingFile | NarratorError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            NarratorError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            NarratorError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            NarratorError::EmptyClassification => StatusCode::UNPROCESSABLE_ENTITY,
            NarratorError::NoRecords => StatusCode::NOT_FOUND,
            NarratorError::ObjectStore(_)
            | NarratorError::ObjectExists(_)
            | NarratorError::Classification(_)
            | NarratorError::Synthesis(_) => StatusCode::BAD_GATEWAY,
            NarratorError::MetadataStore(_)
            | NarratorError::Config(_)
            | NarratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            NarratorError::MissingFile => "MISSING_FILE",
            NarratorError::InvalidUpload(_) => "INVALID_UPLOAD",
            NarratorError::UploadTooLarge { .. } => "UPLOAD_TOO_LARGE",
            NarratorError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            NarratorError::ObjectStore(_) => "STORAGE_ERROR",
            NarratorError::ObjectExists(_) => "STORAGE_CONFLICT",
            NarratorError::MetadataStore(_) => "QUERY_ERROR",
            NarratorError::Classification(_) => "CLASSIFICATION_ERROR",
            NarratorError::EmptyClassification => "NO_CONCEPTS",
            NarratorError::Synthesis(_) => "SYNTHESIS_ERROR",
            NarratorError::NoRecords => "NOT_FOUND",
            NarratorError::Config(_) | NarratorError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to the client.
    /// Input defects echo the detail back; collaborator failures never do.
    pub fn public_message(&self) -> String {
        match self {
            NarratorError::MissingFile
            | NarratorError::InvalidUpload(_)
            | NarratorError::UploadTooLarge { .. }
            | NarratorError::UnsupportedMediaType(_)
            | NarratorError::EmptyClassification
            | NarratorError::NoRecords => self.to_string(),
            NarratorError::ObjectStore(_)
            | NarratorError::ObjectExists(_)
            | NarratorError::Classification(_)
            | NarratorError::Synthesis(_) => {
                "An upstream service failed while processing the photo".to_string()
            }
            NarratorError::MetadataStore(_)
            | NarratorError::Config(_)
            | NarratorError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Write the full error to the server log at a level matching its class
    pub fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, code = self.code(), status = status.as_u16(), "Request failed");
        } else {
            warn!(error = %self, code = self.code(), status = status.as_u16(), "Request rejected");
        }
    }

    /// Log the error and build the JSON body for API routes
    pub fn to_json(&self) -> (StatusCode, Json<ErrorResponse>) {
        self.log();
        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.public_message(),
                code: self.code().to_string(),
            }),
        )
    }
}

/// HTML error page for browser-facing routes
impl IntoResponse for NarratorError {
    fn into_response(self) -> Response {
        self.log();
        let page = match self {
            NarratorError::NoRecords => pages::empty_results(),
            _ => pages::error_page(self.status_code(), &self.public_message()),
        };
        (self.status_code(), Html(page)).into_response()
    }
}
