//! docconv-core: DOCX → PDF conversion pipeline
//!
//! This crate holds everything the web server needs apart from HTTP:
//!
//! - [`docx`]: reads paragraphs and run styling from `word/document.xml`
//! - [`metadata`]: word and character counts of the document text
//! - [`backend`]: the [`ConversionBackend`] trait and its three strategies
//! - [`page_count`]: page count of the produced PDF
//! - [`pending`]: token-keyed store of conversions awaiting download
//! - [`storage`]: per-conversion directory layout
//! - [`pipeline`]: validation and the staged upload → download flow
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use docconv_core::{validate_upload_name, DirectConverter, Pipeline, Storage};
//!
//! # async fn run(bytes: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Storage::create("uploads").await?;
//! let pipeline = Pipeline::new(storage, Arc::new(DirectConverter::new()));
//!
//! let source = validate_upload_name(Some("report.docx"))?;
//! let (token, result) = pipeline.accept(&source, &bytes).await?;
//! println!("{} words, {} pages", result.word_count, result.page_count);
//!
//! if let Some(download) = pipeline.take_download(&token).await {
//!     std::fs::write(&download.file_name, &download.bytes)?;
//!     pipeline.finish_download(download).await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod docx;
pub mod error;
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;
pub mod metadata;
pub mod page_count;
pub mod pending;
pub mod pipeline;
pub mod storage;

/// Accepted upload extension
pub const SOURCE_EXTENSION: &str = ".docx";
/// Extension of produced artifacts
pub const TARGET_EXTENSION: &str = ".pdf";

pub use backend::{
    build_backend, BackendKind, BackendSettings, ConversionBackend, DirectConverter,
    OfficeConverter,
};
#[cfg(feature = "render")]
pub use backend::RenderPipeline;
pub use docx::{DocxDocument, Paragraph, TextRun};
pub use error::{ConvertError, PipelineError, Result};
pub use metadata::TextMetrics;
pub use page_count::PageCount;
pub use pending::{ConversionToken, PendingConversion, PendingStore};
pub use pipeline::{validate_upload_name, ConversionResult, Download, Pipeline, SourceName, UploadRejection};
pub use storage::Storage;
