//! Page count of a produced PDF artifact

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{ConvertError, Result};

/// Page count reported on the result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageCount {
    Known(u32),
    Unavailable,
}

impl fmt::Display for PageCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageCount::Known(pages) => write!(f, "{}", pages),
            PageCount::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Parse PDF bytes and return page count
pub fn count_pages(bytes: &[u8]) -> Result<u32> {
    let doc =
        lopdf::Document::load_mem(bytes).map_err(|e| ConvertError::PageCount(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}

/// Load the artifact at `path` and count its pages on the blocking pool.
pub async fn count_artifact_pages(path: &Path) -> Result<u32> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let bytes = std::fs::read(&path).map_err(|e| {
            ConvertError::PageCount(format!("Cannot read {}: {}", path.display(), e))
        })?;
        count_pages(&bytes)
    })
    .await
    .map_err(|e| ConvertError::PageCount(format!("Page count task panicked: {}", e)))?
}
