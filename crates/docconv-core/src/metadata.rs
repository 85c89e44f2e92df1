//! Word and character counts for an uploaded document

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::docx;
use crate::error::{ConvertError, Result};

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").expect("valid regex");
}

/// Text statistics of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextMetrics {
    pub word_count: u64,
    pub character_count: u64,
}

impl TextMetrics {
    pub fn from_text(text: &str) -> Self {
        Self {
            word_count: count_words(text),
            character_count: count_characters(text),
        }
    }
}

/// Number of pieces left after splitting on whitespace runs.
///
/// Leading or trailing whitespace yields an empty piece that is counted, so
/// an empty document reports one word.
pub fn count_words(text: &str) -> u64 {
    WHITESPACE_RUN.split(text).count() as u64
}

/// Number of non-whitespace characters (Unicode scalar values).
pub fn count_characters(text: &str) -> u64 {
    text.chars().filter(|c| !c.is_whitespace()).count() as u64
}

/// Extract metrics from a DOCX file on disk.
///
/// Parsing runs on the blocking pool.
pub async fn extract_metadata(source: &Path) -> Result<TextMetrics> {
    let source: PathBuf = source.to_path_buf();
    let text = tokio::task::spawn_blocking(move || {
        docx::read_docx(&source).map(|document| document.plain_text())
    })
    .await
    .map_err(|e| ConvertError::Extraction(format!("Extraction task panicked: {}", e)))??;

    let metrics = TextMetrics::from_text(&text);
    debug!(
        words = metrics.word_count,
        characters = metrics.character_count,
        "Extracted text metrics"
    );
    Ok(metrics)
}
