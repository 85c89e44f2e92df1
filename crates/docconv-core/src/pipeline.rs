//! Upload → extract → convert → count → download
//!
//! [`Pipeline`] ties storage, the pending store and the selected backend
//! together. Each stage either succeeds or stops the run with a
//! [`PipelineError`] naming the stage; a stopped run leaves nothing behind.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::backend::ConversionBackend;
use crate::error::PipelineError;
use crate::metadata::extract_metadata;
use crate::page_count::{count_artifact_pages, PageCount};
use crate::pending::{ConversionToken, PendingConversion, PendingStore};
use crate::storage::Storage;
use crate::SOURCE_EXTENSION;

/// Why an upload was turned away before anything was stored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("No file selected")]
    NoFileSelected,

    #[error("Invalid file type: {0}")]
    InvalidFileType(String),
}

/// A validated upload filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceName {
    /// Final path component as sent by the client
    pub file_name: String,
    /// File name without its `.docx` extension
    pub base_name: String,
}

/// Check the client-supplied filename.
///
/// Directory components are dropped (both `/` and `\` separators). The
/// extension must be `.docx`, compared case-insensitively, and something must
/// remain in front of it.
pub fn validate_upload_name(
    file_name: Option<&str>,
) -> std::result::Result<SourceName, UploadRejection> {
    let raw = match file_name {
        Some(name) if !name.trim().is_empty() => name,
        _ => return Err(UploadRejection::NoFileSelected),
    };

    let file_name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw)
        .trim()
        .to_string();

    let split = file_name.len().checked_sub(SOURCE_EXTENSION.len());
    let (stem, extension) = match split {
        Some(at) if file_name.is_char_boundary(at) => file_name.split_at(at),
        _ => return Err(UploadRejection::InvalidFileType(file_name)),
    };
    if !extension.eq_ignore_ascii_case(SOURCE_EXTENSION) || stem.is_empty() {
        return Err(UploadRejection::InvalidFileType(file_name));
    }

    Ok(SourceName {
        base_name: stem.to_string(),
        file_name,
    })
}

/// Metadata of one successful conversion, carried on the redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    pub word_count: u64,
    pub character_count: u64,
    pub page_count: PageCount,
}

/// A conversion claimed for download.
///
/// The entry is out of the store while the transfer runs. Hand it back with
/// [`Pipeline::finish_download`] once the bytes are delivered, or with
/// [`Pipeline::restore_download`] when the transfer broke off.
#[derive(Debug)]
pub struct Download {
    /// `<baseName>.pdf`
    pub file_name: String,
    pub bytes: Vec<u8>,
    token: ConversionToken,
    conversion: PendingConversion,
}

impl Download {
    pub fn token(&self) -> &ConversionToken {
        &self.token
    }
}

/// Shared conversion service.
pub struct Pipeline {
    storage: Storage,
    store: PendingStore,
    backend: Arc<dyn ConversionBackend>,
    count_pages: bool,
}

impl Pipeline {
    pub fn new(storage: Storage, backend: Arc<dyn ConversionBackend>) -> Self {
        Self {
            storage,
            store: PendingStore::new(),
            backend,
            count_pages: true,
        }
    }

    /// Skip the page count query and report [`PageCount::Unavailable`].
    pub fn with_page_count(mut self, enabled: bool) -> Self {
        self.count_pages = enabled;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn store(&self) -> &PendingStore {
        &self.store
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Store an accepted upload and run every stage on it.
    ///
    /// On success the conversion stays pending under the returned token until
    /// it is downloaded or expires. On failure it is discarded together with
    /// its files.
    #[instrument(skip(self, bytes), fields(file = %source.file_name, bytes = bytes.len()))]
    pub async fn accept(
        &self,
        source: &SourceName,
        bytes: &[u8],
    ) -> std::result::Result<(ConversionToken, ConversionResult), PipelineError> {
        let token = ConversionToken::new();
        let source_path = self.storage.source_path(&token, &source.file_name);
        self.store
            .register(
                token,
                PendingConversion::new(source.base_name.clone(), source_path),
            )
            .await;

        match self.run(&token, source, bytes).await {
            Ok(result) => {
                info!(
                    %token,
                    words = result.word_count,
                    characters = result.character_count,
                    pages = %result.page_count,
                    "Conversion ready"
                );
                Ok((token, result))
            }
            Err(e) => {
                self.discard(&token).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        token: &ConversionToken,
        source: &SourceName,
        bytes: &[u8],
    ) -> std::result::Result<ConversionResult, PipelineError> {
        let source_path = self
            .storage
            .save_source(token, &source.file_name, bytes)
            .await
            .map_err(PipelineError::Save)?;

        let metrics = extract_metadata(&source_path)
            .await
            .map_err(PipelineError::Extraction)?;

        let artifact_path = self.storage.artifact_path(token, &source.base_name);
        debug!(backend = self.backend.name(), artifact = %artifact_path.display(), "Converting");
        self.backend
            .convert(&source_path, &artifact_path)
            .await
            .map_err(PipelineError::Conversion)?;

        let page_count = if self.count_pages {
            PageCount::Known(
                count_artifact_pages(&artifact_path)
                    .await
                    .map_err(PipelineError::PageCount)?,
            )
        } else {
            PageCount::Unavailable
        };

        if !self.store.complete(token, artifact_path).await {
            warn!(%token, "Conversion finished after its entry was removed");
            return Err(PipelineError::Abandoned);
        }

        Ok(ConversionResult {
            word_count: metrics.word_count,
            character_count: metrics.character_count,
            page_count,
        })
    }

    /// Claim a ready conversion and read its artifact.
    ///
    /// Returns `None` for unknown, unfinished, already claimed or consumed
    /// tokens, and when the artifact vanished from disk (its remaining files
    /// are removed then).
    #[instrument(skip(self))]
    pub async fn take_download(&self, token: &ConversionToken) -> Option<Download> {
        let conversion = self.store.take_ready(token).await?;
        let Some(artifact_path) = conversion.artifact_path.as_deref() else {
            self.storage.remove_conversion(token).await;
            return None;
        };

        let Some(bytes) = read_artifact(artifact_path).await else {
            self.storage.remove_conversion(token).await;
            return None;
        };

        debug!(bytes = bytes.len(), "Artifact claimed");
        Some(Download {
            file_name: format!("{}{}", conversion.base_name, crate::TARGET_EXTENSION),
            bytes,
            token: *token,
            conversion,
        })
    }

    /// The transfer completed: delete the conversion's files.
    pub async fn finish_download(&self, download: Download) {
        self.storage.remove_conversion(&download.token).await;
        info!(token = %download.token, bytes = download.bytes.len(), "Artifact delivered");
    }

    /// The transfer broke off: make the conversion downloadable again.
    pub async fn restore_download(&self, download: Download) {
        warn!(token = %download.token, "Download interrupted, conversion kept");
        self.store.register(download.token, download.conversion).await;
    }

    /// Drop a pending conversion and delete its files.
    pub async fn discard(&self, token: &ConversionToken) {
        self.store.discard(token).await;
        self.storage.remove_conversion(token).await;
    }

    /// Remove ready conversions that waited `ttl` for their download, with
    /// their files. Returns how many were removed.
    pub async fn sweep_expired(&self, ttl: Duration) -> usize {
        let expired = self.store.sweep_expired(ttl).await;
        for (token, conversion) in &expired {
            debug!(%token, base_name = %conversion.base_name, "Expiring conversion");
            self.storage.remove_conversion(token).await;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Swept expired conversions");
        }
        expired.len()
    }
}

async fn read_artifact(path: &Path) -> Option<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Artifact missing at download");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DirectConverter;
    use crate::error::ConvertError;
    use crate::fixtures::build_docx;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    async fn pipeline(root: &Path) -> Pipeline {
        let storage = Storage::create(root).await.unwrap();
        Pipeline::new(storage, Arc::new(DirectConverter::new()))
    }

    fn name(file_name: &str) -> SourceName {
        validate_upload_name(Some(file_name)).unwrap()
    }

    struct FailingBackend;

    #[async_trait]
    impl ConversionBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn convert(&self, _source: &Path, _artifact: &Path) -> crate::Result<()> {
            Err(ConvertError::Conversion("backend unavailable".into()))
        }
    }

    /// Direct conversion after a delay
    struct SlowBackend(Duration);

    #[async_trait]
    impl ConversionBackend for SlowBackend {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn convert(&self, source: &Path, artifact: &Path) -> crate::Result<()> {
            tokio::time::sleep(self.0).await;
            DirectConverter::new().convert(source, artifact).await
        }
    }

    async fn slow_pipeline(root: &Path) -> Arc<Pipeline> {
        let storage = Storage::create(root).await.unwrap();
        Arc::new(Pipeline::new(
            storage,
            Arc::new(SlowBackend(Duration::from_millis(300))),
        ))
    }

    #[test]
    fn test_validate_accepts_docx() {
        assert_eq!(
            validate_upload_name(Some("report.docx")),
            Ok(SourceName {
                file_name: "report.docx".into(),
                base_name: "report".into(),
            })
        );
        assert_eq!(name("Quarterly.Report.DOCX").base_name, "Quarterly.Report");
    }

    #[test]
    fn test_validate_strips_client_directories() {
        assert_eq!(name("C:\\Users\\me\\cv.docx").file_name, "cv.docx");
        assert_eq!(name("../../etc/notes.docx").base_name, "notes");
    }

    #[test]
    fn test_validate_rejections() {
        assert_eq!(validate_upload_name(None), Err(UploadRejection::NoFileSelected));
        assert_eq!(validate_upload_name(Some("")), Err(UploadRejection::NoFileSelected));
        assert_eq!(
            validate_upload_name(Some("notes.txt")),
            Err(UploadRejection::InvalidFileType("notes.txt".into()))
        );
        assert!(validate_upload_name(Some(".docx")).is_err());
        assert!(validate_upload_name(Some("report.doc")).is_err());
        assert!(validate_upload_name(Some("report.docx.pdf")).is_err());
        assert!(validate_upload_name(Some("ré")).is_err());
    }

    #[tokio::test]
    async fn test_accept_hello_world() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        let bytes = build_docx(&["Hello world"]).unwrap();

        let (token, result) = pipeline.accept(&name("report.docx"), &bytes).await.unwrap();
        assert_eq!(
            result,
            ConversionResult {
                word_count: 2,
                character_count: 10,
                page_count: PageCount::Known(1),
            }
        );
        assert!(pipeline.storage().artifact_path(&token, "report").is_file());
        assert!(pipeline.storage().source_path(&token, "report.docx").is_file());
    }

    #[tokio::test]
    async fn test_source_keeps_uploaded_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        let bytes = build_docx(&["Hello world"]).unwrap();

        let (token, _) = pipeline.accept(&name("Report.DOCX"), &bytes).await.unwrap();
        assert!(pipeline.storage().source_path(&token, "Report.DOCX").is_file());
        assert!(pipeline.storage().artifact_path(&token, "Report").is_file());
    }

    #[tokio::test]
    async fn test_page_count_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await.with_page_count(false);
        let bytes = build_docx(&["Hello world"]).unwrap();

        let (_, result) = pipeline.accept(&name("report.docx"), &bytes).await.unwrap();
        assert_eq!(result.page_count, PageCount::Unavailable);
    }

    #[tokio::test]
    async fn test_download_consumes_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        let bytes = build_docx(&["Hello world"]).unwrap();
        let (token, _) = pipeline.accept(&name("report.docx"), &bytes).await.unwrap();

        let download = pipeline.take_download(&token).await.unwrap();
        assert_eq!(download.file_name, "report.pdf");
        assert!(download.bytes.starts_with(b"%PDF"));

        // Claimed but not yet delivered: files stay, token is taken
        assert!(pipeline.storage().conversion_dir(&token).exists());
        assert!(pipeline.take_download(&token).await.is_none());

        pipeline.finish_download(download).await;
        assert!(!pipeline.storage().conversion_dir(&token).exists());
        assert!(pipeline.take_download(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_interrupted_download_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        let bytes = build_docx(&["Hello world"]).unwrap();
        let (token, _) = pipeline.accept(&name("report.docx"), &bytes).await.unwrap();

        let first = pipeline.take_download(&token).await.unwrap();
        pipeline.restore_download(first).await;
        assert!(pipeline.storage().artifact_path(&token, "report").is_file());

        let retry = pipeline.take_download(&token).await.unwrap();
        assert!(retry.bytes.starts_with(b"%PDF"));
        pipeline.finish_download(retry).await;
        assert!(!pipeline.storage().conversion_dir(&token).exists());
    }

    #[tokio::test]
    async fn test_downloads_follow_their_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        let (a, _) = pipeline
            .accept(&name("a.docx"), &build_docx(&["first"]).unwrap())
            .await
            .unwrap();
        let (b, _) = pipeline
            .accept(&name("b.docx"), &build_docx(&["second upload"]).unwrap())
            .await
            .unwrap();

        assert_eq!(pipeline.take_download(&b).await.unwrap().file_name, "b.pdf");
        assert_eq!(pipeline.take_download(&a).await.unwrap().file_name, "a.pdf");
    }

    #[tokio::test]
    async fn test_sweep_leaves_running_conversion_alone() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = slow_pipeline(dir.path()).await;

        let sweeper = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                pipeline.sweep_expired(Duration::ZERO).await
            })
        };

        let (token, _) = pipeline
            .accept(&name("report.docx"), &build_docx(&["Hello"]).unwrap())
            .await
            .unwrap();
        assert_eq!(sweeper.await.unwrap(), 0);

        let download = pipeline.take_download(&token).await.unwrap();
        assert!(download.bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_conversion_removed_midway_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = slow_pipeline(dir.path()).await;

        let remover = {
            let pipeline = pipeline.clone();
            let root = dir.path().to_path_buf();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                let entry = std::fs::read_dir(&root).unwrap().next().unwrap().unwrap();
                let token: ConversionToken = entry.file_name().to_str().unwrap().parse().unwrap();
                pipeline.store().discard(&token).await;
            })
        };

        let err = pipeline
            .accept(&name("report.docx"), &build_docx(&["Hello"]).unwrap())
            .await
            .unwrap_err();
        remover.await.unwrap();

        assert!(matches!(err, PipelineError::Abandoned));
        assert!(pipeline.store().is_empty().await);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_docx_is_extraction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;

        let err = pipeline
            .accept(&name("broken.docx"), b"definitely not a zip")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
        assert!(pipeline.store().is_empty().await);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_discards_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::create(dir.path()).await.unwrap();
        let pipeline = Pipeline::new(storage, Arc::new(FailingBackend));

        let err = pipeline
            .accept(&name("report.docx"), &build_docx(&["Hello"]).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conversion(_)));
        assert!(pipeline.store().is_empty().await);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_vanished_artifact_is_not_downloadable() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        let (token, _) = pipeline
            .accept(&name("report.docx"), &build_docx(&["Hello"]).unwrap())
            .await
            .unwrap();
        std::fs::remove_file(pipeline.storage().artifact_path(&token, "report")).unwrap();

        assert!(pipeline.take_download(&token).await.is_none());
        assert!(!pipeline.storage().conversion_dir(&token).exists());
    }

    #[tokio::test]
    async fn test_sweep_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        let (token, _) = pipeline
            .accept(&name("report.docx"), &build_docx(&["Hello"]).unwrap())
            .await
            .unwrap();

        assert_eq!(pipeline.sweep_expired(Duration::from_secs(3600)).await, 0);
        assert_eq!(pipeline.sweep_expired(Duration::ZERO).await, 1);
        assert!(!pipeline.storage().conversion_dir(&token).exists());
        assert!(pipeline.take_download(&token).await.is_none());
    }
}
