use crate::engine::models::{Metadata, StartOptions};
use anyhow::Result;
use async_trait::async_trait;

/// Capability interface to the external download engine
///
/// This trait isolates the orchestrator from the specific transfer
/// implementation (yt-dlp sidecar, native HTTP engine, test double).
/// Progress is pushed separately by the embedding layer as
/// [`Command::Progress`](crate::orchestrator::Command::Progress) messages.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Fetches metadata (title, formats, playlist entries) for a URL
    async fn fetch_metadata(&self, url: &str) -> Result<Metadata>;

    /// Begins a transfer and returns the engine-assigned canonical task id
    async fn start(&self, url: &str, options: StartOptions) -> Result<String>;

    /// Pauses an active transfer
    async fn pause(&self, id: &str) -> Result<()>;

    /// Resumes a paused transfer
    async fn resume(&self, id: &str) -> Result<()>;

    /// Cancels a transfer; unknown ids are an engine-side error
    async fn cancel(&self, id: &str) -> Result<()>;

    /// Reveals a path in the platform file manager
    async fn show_in_folder(&self, path: &str) -> Result<()>;
}
