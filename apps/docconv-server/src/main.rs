//! docconv Server
//!
//! Accepts a `.docx` upload, reports its word, character and page counts,
//! and offers the converted PDF for a single download.
//!
//! ## Architecture
//!
//! All conversion logic lives in `docconv-core`; this binary adds:
//!
//! - Configuration from flags, `DOCCONV_*` variables and `.env`
//! - The axum router, request body limit and request tracing
//! - The embedded HTML pages and the static assets directory
//! - A background sweep removing conversions that were never downloaded

use std::path::Path;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod config;
mod error;
mod pages;
mod state;
mod transfer;

use api::{handle_download, handle_health, handle_index, handle_result, handle_upload};
use config::{Args, ServerConfig};
use state::{spawn_expiry_sweep, AppState};

/// Build the application router.
pub fn router(state: AppState, assets_dir: &Path, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/upload", post(handle_upload))
        .route("/result", get(handle_result))
        .route("/download", get(handle_download))
        .fallback_service(ServeDir::new(assets_dir))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("docconv_server={}", log_level).parse()?)
                .add_directive(format!("docconv_core={}", log_level).parse()?)
                .add_directive(format!("tower_http={}", log_level).parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_args(&args)?;
    info!("Starting docconv server on {}", config.addr);

    let state = AppState::new(&config).await?;
    let _sweep = spawn_expiry_sweep(
        state.pipeline.clone(),
        config.pending_ttl,
        config.sweep_interval,
    );

    let app = router(state, &config.assets_dir, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    info!("Server listening on http://{}", config.addr);
    info!("Storage directory: {}", config.storage_dir.display());
    info!(
        "Pending conversions expire after {}s",
        config.pending_ttl.as_secs()
    );

    axum::serve(listener, app).await?;

    Ok(())
}
