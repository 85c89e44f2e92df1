//! Conversion backends
//!
//! Three interchangeable strategies turn a stored `.docx` into a `.pdf`:
//!
//! - [`DirectConverter`]: in-process text layout written with lopdf
//! - [`RenderPipeline`]: DOCX → HTML → headless Chromium print-to-PDF
//!   (`render` feature)
//! - [`OfficeConverter`]: external `soffice --headless --convert-to pdf`
//!
//! Exactly one is selected at startup; the rest of the pipeline only sees
//! [`ConversionBackend`]. Every strategy writes its output to the artifact
//! path it is given, `<storageDir>/<baseName>.pdf`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub mod direct;
pub mod office;
#[cfg(feature = "render")]
pub mod render;

pub use direct::DirectConverter;
pub use office::OfficeConverter;
#[cfg(feature = "render")]
pub use render::RenderPipeline;

/// A4 width in millimetres
pub const PAGE_WIDTH_MM: f32 = 210.0;
/// A4 height in millimetres
pub const PAGE_HEIGHT_MM: f32 = 297.0;
/// Margin applied on all four sides
pub const PAGE_MARGIN_MM: f32 = 20.0;

/// Default timeout for the render pipeline's export step
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn mm_to_points(mm: f32) -> f32 {
    mm * 72.0 / 25.4
}

/// Capability shared by all conversion strategies.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Short name used in logs and the health endpoint
    fn name(&self) -> &'static str;

    /// Convert `source` into a PDF written at `artifact`.
    async fn convert(&self, source: &Path, artifact: &Path) -> Result<()>;
}

/// Which strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Direct,
    Render,
    Office,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Direct => write!(f, "direct"),
            BackendKind::Render => write!(f, "render"),
            BackendKind::Office => write!(f, "office"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(BackendKind::Direct),
            "render" | "chromium" => Ok(BackendKind::Render),
            "office" | "soffice" | "libreoffice" => Ok(BackendKind::Office),
            other => Err(format!(
                "Unknown backend '{}'. Must be 'direct', 'render', or 'office'",
                other
            )),
        }
    }
}

/// Settings needed to construct the selected backend.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub kind: BackendKind,
    /// Export timeout for the render pipeline
    pub render_timeout: Duration,
    /// Custom Chromium executable for the render pipeline
    pub chrome_path: Option<PathBuf>,
    /// Office converter binary
    pub soffice_path: PathBuf,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::Direct,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            chrome_path: None,
            soffice_path: PathBuf::from("soffice"),
        }
    }
}

/// Construct the backend named by `settings.kind`.
pub fn build_backend(settings: &BackendSettings) -> Result<Arc<dyn ConversionBackend>> {
    match settings.kind {
        BackendKind::Direct => Ok(Arc::new(DirectConverter::new())),
        BackendKind::Office => Ok(Arc::new(OfficeConverter::new(&settings.soffice_path))),
        #[cfg(feature = "render")]
        BackendKind::Render => Ok(Arc::new(
            RenderPipeline::new(settings.render_timeout)
                .with_chrome_path(settings.chrome_path.clone()),
        )),
        #[cfg(not(feature = "render"))]
        BackendKind::Render => Err(crate::error::ConvertError::Render(
            "docconv-core was built without the `render` feature".to_string(),
        )),
    }
}
