//! Token-keyed registry of in-flight and downloadable conversions
//!
//! Each accepted upload gets its own [`ConversionToken`]. The entry is
//! registered before conversion starts, marked ready once the artifact
//! exists, and removed by a finished download, by failure cleanup, or by the
//! expiry sweep. A download cut short registers its entry again.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Opaque identifier handed back to the client in the result URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversionToken(Uuid);

impl ConversionToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ConversionToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// State of one conversion.
#[derive(Debug, Clone)]
pub struct PendingConversion {
    /// Filename without extension, reused for the download name
    pub base_name: String,
    pub source_path: PathBuf,
    /// Set once the backend has produced the PDF
    pub artifact_path: Option<PathBuf>,
    pub created_at: Instant,
    /// When the artifact was recorded; expiry counts from here
    pub ready_at: Option<Instant>,
}

impl PendingConversion {
    pub fn new(base_name: impl Into<String>, source_path: PathBuf) -> Self {
        Self {
            base_name: base_name.into(),
            source_path,
            artifact_path: None,
            created_at: Instant::now(),
            ready_at: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.artifact_path.is_some()
    }
}

/// Concurrent map of token → conversion.
#[derive(Debug, Default)]
pub struct PendingStore {
    entries: RwLock<HashMap<ConversionToken, PendingConversion>>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, token: ConversionToken, conversion: PendingConversion) {
        self.entries.write().await.insert(token, conversion);
    }

    /// Record the artifact for `token`. Returns false if the entry is gone
    /// (swept or discarded meanwhile).
    pub async fn complete(&self, token: &ConversionToken, artifact_path: PathBuf) -> bool {
        match self.entries.write().await.get_mut(token) {
            Some(entry) => {
                entry.artifact_path = Some(artifact_path);
                entry.ready_at = Some(Instant::now());
                true
            }
            None => false,
        }
    }

    /// Remove and return the entry if its artifact is ready.
    ///
    /// Only one caller can take a given token; a concurrent second download
    /// sees `None`.
    pub async fn take_ready(&self, token: &ConversionToken) -> Option<PendingConversion> {
        let mut entries = self.entries.write().await;
        if entries.get(token).is_some_and(PendingConversion::is_ready) {
            entries.remove(token)
        } else {
            None
        }
    }

    pub async fn discard(&self, token: &ConversionToken) -> Option<PendingConversion> {
        self.entries.write().await.remove(token)
    }

    /// Remove every ready entry that has waited at least `ttl` for its
    /// download and return them for file cleanup.
    ///
    /// Conversions still running are left alone; their failure path cleans
    /// up after them.
    pub async fn sweep_expired(&self, ttl: Duration) -> Vec<(ConversionToken, PendingConversion)> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let expired: Vec<ConversionToken> = entries
            .iter()
            .filter(|(_, c)| c.ready_at.is_some_and(|at| now.duration_since(at) >= ttl))
            .map(|(token, _)| *token)
            .collect();
        expired
            .into_iter()
            .filter_map(|token| entries.remove(&token).map(|c| (token, c)))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
