//! Application state for the docconv server

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use docconv_core::{build_backend, Pipeline, Storage};
use tracing::info;

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Create the storage root and the selected backend.
    pub async fn new(config: &ServerConfig) -> Result<Self> {
        let storage = Storage::create(&config.storage_dir).await?;
        let backend = build_backend(&config.backend)?;
        info!(backend = backend.name(), "Conversion backend selected");

        let pipeline = Pipeline::new(storage, backend).with_page_count(config.count_pages);
        Ok(Self::from_pipeline(pipeline))
    }

    pub fn from_pipeline(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Remove conversions nobody downloaded within `ttl`, every `interval`.
pub fn spawn_expiry_sweep(
    pipeline: Arc<Pipeline>,
    ttl: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            pipeline.sweep_expired(ttl).await;
        }
    })
}
