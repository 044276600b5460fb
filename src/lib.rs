//! VidFlow core library
//!
//! The download task orchestrator behind the VidFlow desktop app: admission
//! of queued work under a concurrency limit, reconciliation of engine
//! progress events, provisional-to-canonical id handoff, and terminal-state
//! side effects. The actual media fetching lives behind the
//! [`EngineClient`] capability trait.

pub mod engine;
pub mod notify;
pub mod orchestrator;
pub mod persist;
pub mod queue;
pub mod utils;

// Re-export main types for easier use
pub use engine::{EngineClient, EngineStatus, Metadata, ProgressEvent, StartOptions};
pub use notify::{NotificationDispatcher, Notifier};
pub use orchestrator::{Command, Orchestrator, UiEvent};
pub use persist::{JsonStateStore, PersistedState, StateStore};
pub use queue::{DownloadTask, MediaFormat, TaskSpec, TaskStatus, TaskStore};
pub use utils::{Settings, SettingsPatch, Theme, VidflowError};
