//! External office-suite conversion
//!
//! Runs `soffice --headless --convert-to pdf --outdir <dir> <source>` and
//! checks that the expected PDF appeared next to the source.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::ConversionBackend;
use crate::error::{ConvertError, Result};

/// Strategy C: delegate to an office suite's command-line converter.
#[derive(Debug, Clone)]
pub struct OfficeConverter {
    binary: PathBuf,
}

impl OfficeConverter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

/// Where soffice writes its output: `<outdir>/<source stem>.pdf`.
fn produced_path(source: &Path, out_dir: &Path) -> Result<PathBuf> {
    let stem = source.file_stem().ok_or_else(|| {
        ConvertError::ExternalProcess(format!("Invalid source filename: {}", source.display()))
    })?;
    let mut file_name = stem.to_os_string();
    file_name.push(".pdf");
    Ok(out_dir.join(file_name))
}

#[async_trait]
impl ConversionBackend for OfficeConverter {
    fn name(&self) -> &'static str {
        "office"
    }

    #[instrument(skip(self), fields(backend = "office", binary = %self.binary.display()))]
    async fn convert(&self, source: &Path, artifact: &Path) -> Result<()> {
        let out_dir = artifact.parent().ok_or_else(|| {
            ConvertError::ExternalProcess(format!(
                "Artifact path has no parent directory: {}",
                artifact.display()
            ))
        })?;

        let output = Command::new(&self.binary)
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(out_dir)
            .arg(source)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ConvertError::ExternalProcess(format!(
                    "Failed to launch {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(ConvertError::ExternalProcess(format!(
                "{} exited with status {:?}: {}",
                self.binary.display(),
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!(stdout = %String::from_utf8_lossy(&output.stdout).trim(), "Converter finished");

        let produced = produced_path(source, out_dir)?;
        if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
            return Err(ConvertError::ExternalProcess(format!(
                "Converter produced no output at {}",
                produced.display()
            )));
        }

        if produced != artifact {
            move_output(&produced, artifact).await?;
            info!(from = %produced.display(), to = %artifact.display(), "Renamed converter output");
        }

        Ok(())
    }
}

async fn move_output(produced: &Path, artifact: &Path) -> Result<()> {
    tokio::fs::rename(produced, artifact).await.map_err(|e| {
        ConvertError::ExternalProcess(format!(
            "Failed to move {} to {}: {}",
            produced.display(),
            artifact.display(),
            e
        ))
    })
}
