//! Data shapes exchanged with the download engine

use serde::{Deserialize, Serialize};

/// Metadata returned by the engine for a single URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub webpage_url: String,
    pub duration: Option<f64>,
    pub formats: Vec<VideoFormat>,
    pub is_playlist: bool,
    pub entries: Option<Vec<PlaylistEntry>>,
}

/// A single downloadable format variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFormat {
    pub format_id: String,
    pub ext: String,
    pub resolution: Option<String>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub fps: Option<f64>,
    pub filesize: Option<u64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub note: Option<String>,
}

/// One entry of a playlist listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub id: String,
    pub title: String,
    pub url: String,
    pub duration: Option<f64>,
}

/// Options passed to [`EngineClient::start`](super::EngineClient::start)
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub title: Option<String>,
    pub directory: Option<String>,
    pub format_spec: Option<String>,
    pub cookies: Option<String>,
}

/// Status reported by the engine on its progress stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Downloading,
    Paused,
    Merging,
    Completed,
    Error,
    Cancelled,
}

impl EngineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineStatus::Completed | EngineStatus::Error | EngineStatus::Cancelled
        )
    }
}

/// One tick of the engine's push-based progress stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: String,
    /// Percent complete, 0-100
    pub progress: f64,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub total_size: Option<String>,
    pub downloaded_bytes: Option<u64>,
    pub status: EngineStatus,
    pub error: Option<String>,
    /// Monotonic per-task counter used to reject stale deliveries
    pub version: u64,
}
