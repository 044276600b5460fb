use crate::engine::models::{Metadata, ProgressEvent};
use crate::queue::store::{TaskSpec, TaskStatus};
use crate::utils::config::SettingsPatch;

/// Commands processed by the orchestrator mailbox, one at a time
#[derive(Debug)]
pub enum Command {
    // Metadata / format selection flow
    AnalyzeUrl { url: String },
    ConfirmDownload { format_spec: String },
    CancelAnalysis,

    // Task lifecycle
    AddTask { spec: TaskSpec },
    PauseTask(String),
    ResumeTask(String),
    RetryTask(String),
    /// Marks the task cancelled but keeps the record visible
    CancelTask(String),
    /// Hard-deletes the record
    RemoveTask(String),
    ClearFinished,
    OpenFolder(String),

    // Configuration
    UpdateSettings(SettingsPatch),
    SetDownloadPath(String),

    // Engine feedback
    Progress(ProgressEvent),
    /// Completion of a spawned `EngineClient::start` call
    StartFinished {
        provisional_id: String,
        result: Result<String, String>,
    },
    /// Completion of a spawned `EngineClient::fetch_metadata` call
    MetadataFetched {
        url: String,
        result: Result<Metadata, String>,
    },

    // Internal scheduling
    ProcessQueue,
    FlushProgress,

    Shutdown,
}

/// Events pushed outward to the UI layer
#[derive(Debug, Clone)]
pub enum UiEvent {
    AnalysisStarted,
    AnalysisCompleted(Result<Metadata, String>),

    TaskStatusChanged {
        id: String,
        status: TaskStatus,
    },
    TaskProgress {
        id: String,
        progress: f64,
        speed: Option<String>,
        eta: Option<String>,
    },
    /// A task id changed from provisional to engine-assigned
    TaskReassigned {
        old_id: String,
        new_id: String,
    },
    TaskRemoved(String),

    /// Non-blocking transient notice (persistence failures and the like)
    Notice(String),
}
