//! Error types for the docconv server

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use docconv_core::{PipelineError, UploadRejection};
use thiserror::Error;
use tracing::{debug, error};

use crate::pages;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("No file selected")]
    NoFileSelected,

    #[error("Invalid file type: {0}")]
    InvalidFileType(String),

    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Missing metadata parameters")]
    MissingMetadata,

    #[error("No converted file is available for download")]
    ArtifactNotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<UploadRejection> for ServerError {
    fn from(rejection: UploadRejection) -> Self {
        match rejection {
            UploadRejection::NoFileSelected => ServerError::NoFileSelected,
            UploadRejection::InvalidFileType(name) => ServerError::InvalidFileType(name),
        }
    }
}

/// Client-facing message for a failed pipeline stage
fn stage_message(err: &PipelineError) -> &'static str {
    match err {
        PipelineError::Save(_) => "File upload failed",
        PipelineError::Extraction(_) => "Error extracting metadata",
        PipelineError::Conversion(_) | PipelineError::Abandoned => "File conversion failed",
        PipelineError::PageCount(_) => "Error extracting page count",
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match &self {
            ServerError::NoFileSelected => {
                (StatusCode::OK, Html(pages::upload_error_page("No file selected."))).into_response()
            }
            ServerError::InvalidFileType(name) => {
                debug!(file = %name, "Rejected upload");
                (
                    StatusCode::OK,
                    Html(pages::upload_error_page(
                        "Invalid file type. Please upload a .docx file.",
                    )),
                )
                    .into_response()
            }
            ServerError::Multipart(err) => (err.status(), err.body_text()).into_response(),
            ServerError::Pipeline(err) => {
                error!(error = %err, "Upload pipeline failed");
                (StatusCode::INTERNAL_SERVER_ERROR, stage_message(err)).into_response()
            }
            ServerError::MissingMetadata => {
                (StatusCode::BAD_REQUEST, "Missing metadata parameters.").into_response()
            }
            ServerError::ArtifactNotFound => (
                StatusCode::NOT_FOUND,
                "No converted file is available for download",
            )
                .into_response(),
            ServerError::Internal(msg) => {
                error!(error = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
