//! On-disk layout for uploads and artifacts
//!
//! Every conversion owns one directory, `<root>/<token>/`, holding the upload
//! under its original filename and, once converted, `<baseName>.pdf`. Two
//! uploads with the same filename never share paths.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::pending::ConversionToken;
use crate::TARGET_EXTENSION;

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Ensure `root` exists and return a handle to it.
    pub async fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "Storage directory ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn conversion_dir(&self, token: &ConversionToken) -> PathBuf {
        self.root.join(token.to_string())
    }

    pub fn source_path(&self, token: &ConversionToken, file_name: &str) -> PathBuf {
        self.conversion_dir(token).join(file_name)
    }

    pub fn artifact_path(&self, token: &ConversionToken, base_name: &str) -> PathBuf {
        self.conversion_dir(token)
            .join(format!("{}{}", base_name, TARGET_EXTENSION))
    }

    /// Write the uploaded bytes to `<root>/<token>/<fileName>`.
    pub async fn save_source(
        &self,
        token: &ConversionToken,
        file_name: &str,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(self.conversion_dir(token)).await?;
        let path = self.source_path(token, file_name);
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Saved upload");
        Ok(path)
    }

    /// Delete the conversion directory and everything in it.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn remove_conversion(&self, token: &ConversionToken) {
        let dir = self.conversion_dir(token);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(dir = %dir.display(), "Removed conversion files"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to remove conversion files"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_makes_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("uploads");
        let storage = Storage::create(&root).await.unwrap();
        assert!(root.is_dir());
        assert_eq!(storage.root(), root.as_path());
    }

    #[tokio::test]
    async fn test_paths_are_per_token() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::create(dir.path()).await.unwrap();
        let a = ConversionToken::new();
        let b = ConversionToken::new();

        assert_ne!(
            storage.source_path(&a, "report.docx"),
            storage.source_path(&b, "report.docx")
        );
        assert_eq!(
            storage.source_path(&a, "Report.DOCX"),
            dir.path().join(a.to_string()).join("Report.DOCX")
        );
        assert_eq!(
            storage.artifact_path(&a, "report"),
            dir.path().join(a.to_string()).join("report.pdf")
        );
    }

    #[tokio::test]
    async fn test_save_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::create(dir.path()).await.unwrap();
        let token = ConversionToken::new();

        let path = storage.save_source(&token, "notes.docx", b"bytes").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"bytes");

        storage.remove_conversion(&token).await;
        assert!(!storage.conversion_dir(&token).exists());

        // Removing twice is harmless
        storage.remove_conversion(&token).await;
    }
}
