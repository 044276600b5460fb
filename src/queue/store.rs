//! Authoritative task collection and state machine

use crate::utils::error::VidflowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Task lifecycle status
///
/// `Completed`, `Error` and `Cancelled` are terminal: no transition leads out
/// of them except full record replacement via [`TaskStore::retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Preparing,
    Downloading,
    Paused,
    Merging,
    Completed,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Cancelled
        )
    }

    /// Active states consume a concurrency slot.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Preparing | TaskStatus::Downloading | TaskStatus::Merging
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Preparing => "preparing",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Paused => "paused",
            TaskStatus::Merging => "merging",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Requested output kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Video,
    Audio,
}

/// Input for [`TaskStore::add_task`]
#[derive(Debug, Clone, Default)]
pub struct TaskSpec {
    pub url: String,
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub format: Option<MediaFormat>,
    pub format_spec: Option<String>,
    pub download_dir: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
}

/// A single download record
///
/// Created only by [`TaskStore::add_task`], mutated only through the store's
/// transition API, removed only by explicit user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Provisional (`pending-*`) until the engine assigns its canonical id
    pub id: String,
    pub url: String,
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub format: MediaFormat,
    pub format_spec: Option<String>,
    pub download_dir: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    /// Percent complete, 0-100
    pub progress: f64,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub total_size: Option<String>,
    pub downloaded_bytes: Option<u64>,
    pub status: TaskStatus,
    pub error: Option<String>,
    /// High-water mark of applied progress-event versions
    pub version: u64,
    pub added_at: DateTime<Utc>,
}

impl DownloadTask {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

/// Field updates applied alongside a status transition
#[derive(Debug, Clone, Default)]
pub struct TransitionFields {
    pub progress: Option<f64>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub total_size: Option<String>,
    pub downloaded_bytes: Option<u64>,
    pub error: Option<String>,
    pub version: Option<u64>,
}

/// Ordered collection of download records, most-recent-first
///
/// All task mutation in the system funnels through this type so the state
/// machine and id-uniqueness invariants hold at every point in time.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Vec<DownloadTask>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Rebuild a store from persisted records, preserving their order.
    pub fn from_tasks(tasks: Vec<DownloadTask>) -> Self {
        Self { tasks }
    }

    /// Create a new queued task with a provisional id, inserted at the front.
    pub fn add_task(&mut self, spec: TaskSpec) -> Result<String, VidflowError> {
        if spec.url.trim().is_empty() {
            return Err(VidflowError::Validation("url must not be empty".into()));
        }

        let id = format!("pending-{}", Uuid::new_v4());
        let task = DownloadTask {
            id: id.clone(),
            url: spec.url,
            source_url: spec.source_url,
            title: spec.title,
            format: spec.format.unwrap_or(MediaFormat::Video),
            format_spec: spec.format_spec,
            download_dir: spec.download_dir,
            thumbnail: spec.thumbnail,
            duration: spec.duration,
            progress: 0.0,
            speed: None,
            eta: None,
            total_size: None,
            downloaded_bytes: None,
            status: TaskStatus::Queued,
            error: None,
            version: 0,
            added_at: Utc::now(),
        };
        self.tasks.insert(0, task);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&DownloadTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// All records, most-recent-first.
    pub fn tasks(&self) -> &[DownloadTask] {
        &self.tasks
    }

    pub fn snapshot(&self) -> Vec<DownloadTask> {
        self.tasks.clone()
    }

    /// Number of tasks currently holding a concurrency slot.
    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status.is_active()).count()
    }

    /// Move a task to `new_status`, applying `fields`, and return the
    /// previous status.
    ///
    /// Progress never decreases while a task stays in a running state; a
    /// lower value in `fields` is kept at the current high-water mark.
    pub fn transition(
        &mut self,
        id: &str,
        new_status: TaskStatus,
        fields: TransitionFields,
    ) -> Result<TaskStatus, VidflowError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| VidflowError::UnknownTask(id.to_string()))?;

        if !transition_allowed(task.status, new_status) {
            return Err(VidflowError::InvalidTransition {
                from: task.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        let prev = task.status;
        task.status = new_status;

        if let Some(progress) = fields.progress {
            task.progress = if new_status.is_terminal() {
                progress
            } else {
                task.progress.max(progress)
            };
        }
        if let Some(speed) = fields.speed {
            task.speed = Some(speed);
        }
        if let Some(eta) = fields.eta {
            task.eta = Some(eta);
        }
        if let Some(total_size) = fields.total_size {
            task.total_size = Some(total_size);
        }
        if let Some(bytes) = fields.downloaded_bytes {
            task.downloaded_bytes = Some(bytes);
        }
        if let Some(version) = fields.version {
            task.version = task.version.max(version);
        }
        match new_status {
            TaskStatus::Error => task.error = fields.error,
            TaskStatus::Completed => {
                task.error = None;
                task.eta = None;
                task.speed = None;
            }
            _ => {}
        }

        debug!(id, from = prev.as_str(), to = new_status.as_str(), "task transition");
        Ok(prev)
    }

    /// Atomically rename a record from its provisional id to the canonical
    /// engine id. Every other field is retained.
    pub fn reassign_id(&mut self, old_id: &str, new_id: &str) -> Result<(), VidflowError> {
        if self.tasks.iter().any(|t| t.id == new_id) {
            return Err(VidflowError::DuplicateId(new_id.to_string()));
        }
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == old_id)
            .ok_or_else(|| VidflowError::UnknownTask(old_id.to_string()))?;
        debug!(old_id, new_id, "reassigning task id");
        task.id = new_id.to_string();
        Ok(())
    }

    /// Delete a record unconditionally. Returns whether anything was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    /// Replace a terminal record with a fresh queued one.
    ///
    /// Retry is record replacement, not a transition: the old record is
    /// removed and a new record (new provisional id, progress 0, cleared
    /// speed/eta/error) takes its place at the front of the collection.
    pub fn retry(&mut self, id: &str) -> Result<String, VidflowError> {
        let pos = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| VidflowError::UnknownTask(id.to_string()))?;

        if !self.tasks[pos].status.is_terminal() {
            return Err(VidflowError::InvalidTransition {
                from: self.tasks[pos].status.as_str().to_string(),
                to: "queued".to_string(),
            });
        }

        let old = self.tasks.remove(pos);
        let new_id = format!("pending-{}", Uuid::new_v4());
        let task = DownloadTask {
            id: new_id.clone(),
            url: old.url,
            source_url: old.source_url,
            title: old.title,
            format: old.format,
            format_spec: old.format_spec,
            download_dir: old.download_dir,
            thumbnail: old.thumbnail,
            duration: old.duration,
            progress: 0.0,
            speed: None,
            eta: None,
            total_size: None,
            downloaded_bytes: None,
            status: TaskStatus::Queued,
            error: None,
            version: 0,
            added_at: Utc::now(),
        };
        self.tasks.insert(0, task);
        Ok(new_id)
    }

    /// Remove every terminal record, returning the removed ids.
    pub fn clear_finished(&mut self) -> Vec<String> {
        let removed: Vec<String> = self
            .tasks
            .iter()
            .filter(|t| t.status.is_terminal())
            .map(|t| t.id.clone())
            .collect();
        self.tasks.retain(|t| !t.status.is_terminal());
        removed
    }
}

/// State machine edges
///
/// Same-state "transitions" are allowed for non-terminal states so progress
/// updates can flow through the same validated path.
fn transition_allowed(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;

    if from.is_terminal() {
        return false;
    }
    if from == to {
        return true;
    }
    match (from, to) {
        (Queued, Preparing) => true,
        (Preparing, Downloading) | (Preparing, Error) => true,
        (Downloading, Paused) | (Paused, Downloading) => true,
        (Downloading, Merging) => true,
        // Engines without a distinct merge phase finish straight from downloading
        (Downloading, Completed) | (Downloading, Error) => true,
        (Merging, Completed) | (Merging, Error) => true,
        (_, Cancelled) => true,
        _ => false,
    }
}
