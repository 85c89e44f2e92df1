//! Error types for conversion and metadata operations

use thiserror::Error;

/// Errors raised by the DOCX reader, the conversion backends and the
/// page count query.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Failed to extract document text: {0}")]
    Extraction(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("External converter failed: {0}")]
    ExternalProcess(String),

    #[error("Failed to count pages: {0}")]
    PageCount(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stage at which the upload pipeline stopped.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to store upload: {0}")]
    Save(#[source] std::io::Error),

    #[error("Metadata extraction failed: {0}")]
    Extraction(#[source] ConvertError),

    #[error("Conversion backend failed: {0}")]
    Conversion(#[source] ConvertError),

    #[error("Page count query failed: {0}")]
    PageCount(#[source] ConvertError),

    #[error("Conversion was removed before it finished")]
    Abandoned,
}

pub type Result<T> = std::result::Result<T, ConvertError>;
