//! Command-line and environment configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use docconv_core::{BackendKind, BackendSettings};

/// Command-line arguments for the docconv server
///
/// Every option can also be set through a `DOCCONV_*` environment variable
/// or a `.env` file in the working directory.
#[derive(Parser, Debug, Clone)]
#[command(name = "docconv-server")]
#[command(about = "Upload a DOCX, get its word/character/page counts and a PDF")]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "DOCCONV_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "DOCCONV_PORT", default_value = "3000")]
    pub port: u16,

    /// Directory holding uploads and converted PDFs
    #[arg(long, env = "DOCCONV_STORAGE_DIR", default_value = "uploads")]
    pub storage_dir: PathBuf,

    /// Directory of static assets (styles.css, script.js)
    #[arg(long, env = "DOCCONV_ASSETS_DIR", default_value = "assets")]
    pub assets_dir: PathBuf,

    /// Conversion backend: direct, render, or office
    #[arg(long, env = "DOCCONV_BACKEND", default_value = "direct")]
    pub backend: BackendKind,

    /// PDF export timeout for the render backend, in seconds
    #[arg(long, env = "DOCCONV_RENDER_TIMEOUT_SECS", default_value = "60")]
    pub render_timeout_secs: u64,

    /// Chromium executable for the render backend
    #[arg(long, env = "DOCCONV_CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Office converter binary for the office backend
    #[arg(long, env = "DOCCONV_SOFFICE_PATH", default_value = "soffice")]
    pub soffice_path: PathBuf,

    /// Seconds a finished conversion waits for its download before removal
    #[arg(long, env = "DOCCONV_PENDING_TTL_SECS", default_value = "3600")]
    pub pending_ttl_secs: u64,

    /// Seconds between expiry sweeps
    #[arg(long, env = "DOCCONV_SWEEP_INTERVAL_SECS", default_value = "60")]
    pub sweep_interval_secs: u64,

    /// Maximum request body size in MiB
    #[arg(long, env = "DOCCONV_MAX_UPLOAD_MB", default_value = "25")]
    pub max_upload_mb: usize,

    /// Report the page count as "unavailable" instead of reading the PDF
    #[arg(long, env = "DOCCONV_NO_PAGE_COUNT")]
    pub no_page_count: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Validated configuration consumed by the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub storage_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub backend: BackendSettings,
    pub pending_ttl: Duration,
    pub sweep_interval: Duration,
    pub max_upload_bytes: usize,
    pub count_pages: bool,
}

impl ServerConfig {
    pub fn from_args(args: &Args) -> anyhow::Result<Self> {
        let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
        if args.pending_ttl_secs == 0 {
            anyhow::bail!("--pending-ttl-secs must be greater than zero");
        }
        if args.sweep_interval_secs == 0 {
            anyhow::bail!("--sweep-interval-secs must be greater than zero");
        }
        if args.max_upload_mb == 0 {
            anyhow::bail!("--max-upload-mb must be greater than zero");
        }

        Ok(Self {
            addr,
            storage_dir: args.storage_dir.clone(),
            assets_dir: args.assets_dir.clone(),
            backend: BackendSettings {
                kind: args.backend,
                render_timeout: Duration::from_secs(args.render_timeout_secs),
                chrome_path: args.chrome_path.clone(),
                soffice_path: args.soffice_path.clone(),
            },
            pending_ttl: Duration::from_secs(args.pending_ttl_secs),
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
            max_upload_bytes: args.max_upload_mb * 1024 * 1024,
            count_pages: !args.no_page_count,
        })
    }
}
