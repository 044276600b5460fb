use super::messages::{Command, UiEvent};
use crate::engine::models::{Metadata, ProgressEvent, StartOptions};
use crate::engine::traits::EngineClient;
use crate::notify::{NotificationDispatcher, Notifier};
use crate::persist::{PersistedState, StateStore};
use crate::queue::admission;
use crate::queue::reconciler::{ProgressReconciler, Reconciliation};
use crate::queue::store::{MediaFormat, TaskSpec, TaskStatus, TaskStore, TransitionFields};
use crate::utils::config::Settings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const FLUSH_INTERVAL: Duration = Duration::from_millis(200);

/// Pending format-selection step between "metadata fetched" and "user
/// confirms or cancels". Never persisted.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub url: String,
    pub metadata: Metadata,
}

/// Single-threaded orchestrator actor
///
/// Owns the task store outright; every mutation in the system happens inside
/// one mailbox turn, so overlapping admission triggers can never interleave
/// their synchronous portions. Engine calls that may suspend are spawned off
/// and re-enter the mailbox as `StartFinished` / `MetadataFetched` commands.
pub struct Orchestrator {
    receiver: mpsc::Receiver<Command>,
    self_sender: mpsc::Sender<Command>,
    events: mpsc::Sender<UiEvent>,

    engine: Arc<dyn EngineClient>,
    dispatcher: NotificationDispatcher,
    state_store: Arc<dyn StateStore>,

    store: TaskStore,
    settings: Settings,
    download_dir: Option<String>,
    analysis: Option<AnalysisContext>,
    reconciler: ProgressReconciler,

    flush_ticker: Option<JoinHandle<()>>,
    admission_scheduled: bool,
    persist_notice_sent: bool,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<dyn EngineClient>,
        notifier: Arc<dyn Notifier>,
        state_store: Arc<dyn StateStore>,
        receiver: mpsc::Receiver<Command>,
        self_sender: mpsc::Sender<Command>,
        events: mpsc::Sender<UiEvent>,
    ) -> Self {
        Self {
            receiver,
            self_sender,
            events,
            engine,
            dispatcher: NotificationDispatcher::new(notifier),
            state_store,
            store: TaskStore::new(),
            settings: Settings::default(),
            download_dir: None,
            analysis: None,
            reconciler: ProgressReconciler::new(),
            flush_ticker: None,
            admission_scheduled: false,
            persist_notice_sent: false,
        }
    }

    /// Convenience constructor that wires up channels and spawns the actor.
    pub fn spawn(
        engine: Arc<dyn EngineClient>,
        notifier: Arc<dyn Notifier>,
        state_store: Arc<dyn StateStore>,
    ) -> (mpsc::Sender<Command>, mpsc::Receiver<UiEvent>, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);
        let actor = Self::new(
            engine,
            notifier,
            state_store,
            cmd_rx,
            cmd_tx.clone(),
            event_tx,
        );
        let handle = tokio::spawn(actor.run());
        (cmd_tx, event_rx, handle)
    }

    pub async fn run(mut self) {
        info!("orchestrator started");

        self.rehydrate().await;
        self.admission_pass().await;
        self.persist().await;

        while let Some(cmd) = self.receiver.recv().await {
            if matches!(cmd, Command::Shutdown) {
                info!("orchestrator shutting down");
                self.persist().await;
                break;
            }
            self.handle(cmd).await;

            // Admission scheduled by a terminal transition runs in its own
            // turn, after the triggering reconciliation step has finished.
            if self.admission_scheduled {
                self.admission_scheduled = false;
                self.admission_pass().await;
                self.persist().await;
            }
        }
        self.stop_flush_ticker();
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::AnalyzeUrl { url } => self.handle_analyze(url).await,
            Command::MetadataFetched { url, result } => {
                self.handle_metadata_fetched(url, result).await
            }
            Command::ConfirmDownload { format_spec } => self.handle_confirm(format_spec).await,
            Command::CancelAnalysis => {
                self.analysis = None;
            }

            Command::AddTask { spec } => self.enqueue(spec).await,
            Command::PauseTask(id) => self.handle_pause(id).await,
            Command::ResumeTask(id) => self.handle_resume(id).await,
            Command::RetryTask(id) => self.handle_retry(id).await,
            Command::CancelTask(id) => self.handle_cancel(id).await,
            Command::RemoveTask(id) => self.handle_remove(id).await,
            Command::ClearFinished => self.handle_clear_finished().await,
            Command::OpenFolder(id) => self.handle_open_folder(id).await,

            Command::UpdateSettings(patch) => {
                self.settings.apply(patch);
                self.persist().await;
                // a raised limit must pull queued work immediately
                self.admission_scheduled = true;
            }
            Command::SetDownloadPath(path) => {
                self.download_dir = Some(path);
                self.persist().await;
            }

            Command::Progress(event) => self.handle_progress(event).await,
            Command::FlushProgress => self.handle_flush().await,
            Command::StartFinished {
                provisional_id,
                result,
            } => self.handle_start_finished(provisional_id, result).await,
            Command::ProcessQueue => {
                self.admission_pass().await;
                self.persist().await;
            }

            // The run loop intercepts this before dispatch.
            Command::Shutdown => debug!("shutdown reached dispatch, ignoring"),
        }
    }

    // ---- metadata / format selection -----------------------------------

    async fn handle_analyze(&mut self, url: String) {
        if url.trim().is_empty() {
            return;
        }
        self.emit(UiEvent::AnalysisStarted).await;

        let engine = Arc::clone(&self.engine);
        let tx = self.self_sender.clone();
        tokio::spawn(async move {
            let result = engine
                .fetch_metadata(&url)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(Command::MetadataFetched { url, result }).await;
        });
    }

    async fn handle_metadata_fetched(&mut self, url: String, result: Result<Metadata, String>) {
        match result {
            Ok(metadata) => {
                self.analysis = Some(AnalysisContext {
                    url,
                    metadata: metadata.clone(),
                });
                self.emit(UiEvent::AnalysisCompleted(Ok(metadata))).await;
            }
            Err(e) => {
                // The only failure surfaced globally: no task record exists yet.
                warn!(url = %url, error = %e, "metadata fetch failed");
                self.emit(UiEvent::AnalysisCompleted(Err(
                    "Failed to fetch video metadata. Check URL or connection.".to_string(),
                )))
                .await;
            }
        }
    }

    async fn handle_confirm(&mut self, format_spec: String) {
        let Some(ctx) = self.analysis.take() else {
            debug!("confirm without a pending analysis, ignoring");
            return;
        };
        let format = if format_spec == "audio" {
            MediaFormat::Audio
        } else {
            MediaFormat::Video
        };
        let spec = TaskSpec {
            url: ctx.url,
            source_url: Some(ctx.metadata.webpage_url),
            title: Some(ctx.metadata.title),
            format: Some(format),
            format_spec: Some(format_spec),
            download_dir: self.download_dir.clone(),
            thumbnail: Some(ctx.metadata.thumbnail),
            duration: ctx.metadata.duration,
        };
        self.enqueue(spec).await;
    }

    // ---- task lifecycle -------------------------------------------------

    async fn enqueue(&mut self, spec: TaskSpec) {
        match self.store.add_task(spec) {
            Ok(id) => {
                info!(id = %id, "task queued");
                self.emit(UiEvent::TaskStatusChanged {
                    id,
                    status: TaskStatus::Queued,
                })
                .await;
                self.admission_pass().await;
                self.persist().await;
            }
            Err(e) => {
                warn!(error = %e, "rejected add request");
                self.emit(UiEvent::Notice(e.to_string())).await;
            }
        }
    }

    async fn handle_pause(&mut self, id: String) {
        let Some(task) = self.store.get(&id) else {
            warn!(id = %id, "pause requested for unknown task");
            return;
        };
        if task.status != TaskStatus::Downloading {
            debug!(id = %id, status = task.status.as_str(), "pause ignored");
            return;
        }
        if let Err(e) = self.engine.pause(&id).await {
            warn!(id = %id, error = %e, "engine refused pause");
            return;
        }
        if self
            .store
            .transition(&id, TaskStatus::Paused, TransitionFields::default())
            .is_ok()
        {
            self.emit(UiEvent::TaskStatusChanged {
                id,
                status: TaskStatus::Paused,
            })
            .await;
            self.persist().await;
        }
    }

    async fn handle_resume(&mut self, id: String) {
        let Some(task) = self.store.get(&id) else {
            warn!(id = %id, "resume requested for unknown task");
            return;
        };
        if task.status != TaskStatus::Paused {
            debug!(id = %id, status = task.status.as_str(), "resume ignored");
            return;
        }
        if let Err(e) = self.engine.resume(&id).await {
            warn!(id = %id, error = %e, "engine refused resume");
            return;
        }
        if self
            .store
            .transition(&id, TaskStatus::Downloading, TransitionFields::default())
            .is_ok()
        {
            self.emit(UiEvent::TaskStatusChanged {
                id,
                status: TaskStatus::Downloading,
            })
            .await;
            self.persist().await;
        }
    }

    async fn handle_retry(&mut self, id: String) {
        match self.store.retry(&id) {
            Ok(new_id) => {
                info!(old_id = %id, new_id = %new_id, "retrying task");
                self.reconciler.forget(&id);
                self.emit(UiEvent::TaskRemoved(id)).await;
                self.emit(UiEvent::TaskStatusChanged {
                    id: new_id,
                    status: TaskStatus::Queued,
                })
                .await;
                self.persist().await;
                self.admission_scheduled = true;
            }
            Err(e) => warn!(id = %id, error = %e, "retry rejected"),
        }
    }

    /// Idempotent: cancelling an already-terminal task is a no-op. The record
    /// stays visible; `RemoveTask` is the hard-delete path.
    async fn handle_cancel(&mut self, id: String) {
        let Some(task) = self.store.get(&id) else {
            warn!(id = %id, "cancel requested for unknown task");
            return;
        };
        if task.status.is_terminal() {
            debug!(id = %id, "cancel on terminal task, nothing to do");
            return;
        }
        if engine_owns(task.status) {
            if let Err(e) = self.engine.cancel(&id).await {
                warn!(id = %id, error = %e, "engine cancel failed");
            }
        }
        if self
            .store
            .transition(&id, TaskStatus::Cancelled, TransitionFields::default())
            .is_ok()
        {
            info!(id = %id, "task cancelled");
            self.reconciler.forget(&id);
            self.emit(UiEvent::TaskStatusChanged {
                id,
                status: TaskStatus::Cancelled,
            })
            .await;
            self.persist().await;
            self.admission_scheduled = true;
        }
    }

    async fn handle_remove(&mut self, id: String) {
        let Some(task) = self.store.get(&id) else {
            warn!(id = %id, "remove requested for unknown task");
            return;
        };
        if engine_owns(task.status) {
            if let Err(e) = self.engine.cancel(&id).await {
                warn!(id = %id, error = %e, "engine cancel failed");
            }
        }
        self.store.remove(&id);
        self.reconciler.forget(&id);
        info!(id = %id, "task removed");
        self.emit(UiEvent::TaskRemoved(id)).await;
        self.persist().await;
        self.admission_scheduled = true;
    }

    async fn handle_clear_finished(&mut self) {
        let removed = self.store.clear_finished();
        if removed.is_empty() {
            return;
        }
        info!(count = removed.len(), "cleared finished tasks");
        for id in removed {
            self.emit(UiEvent::TaskRemoved(id)).await;
        }
        self.persist().await;
    }

    async fn handle_open_folder(&mut self, id: String) {
        let dir = self
            .store
            .get(&id)
            .and_then(|t| t.download_dir.clone())
            .or_else(|| self.download_dir.clone());
        match dir {
            Some(dir) => {
                if let Err(e) = self.engine.show_in_folder(&dir).await {
                    warn!(id = %id, error = %e, "failed to reveal folder");
                }
            }
            None => debug!(id = %id, "no folder known for task"),
        }
    }

    // ---- admission ------------------------------------------------------

    async fn admission_pass(&mut self) {
        let admitted = admission::plan(&self.store, &self.settings);
        for id in admitted {
            // Reserve the slot before anything in this turn can suspend:
            // a later pass re-reading active counts must see it taken.
            if let Err(e) =
                self.store
                    .transition(&id, TaskStatus::Preparing, TransitionFields::default())
            {
                warn!(id = %id, error = %e, "admission reservation failed");
                continue;
            }
            let Some(task) = self.store.get(&id) else {
                continue;
            };
            let url = task.url.clone();
            let options = StartOptions {
                title: task.title.clone(),
                directory: task
                    .download_dir
                    .clone()
                    .or_else(|| self.download_dir.clone()),
                format_spec: task.format_spec.clone(),
                cookies: self.settings.cookies.clone(),
            };
            info!(id = %id, "admitting task");
            self.emit(UiEvent::TaskStatusChanged {
                id: id.clone(),
                status: TaskStatus::Preparing,
            })
            .await;

            let engine = Arc::clone(&self.engine);
            let tx = self.self_sender.clone();
            tokio::spawn(async move {
                let result = engine.start(&url, options).await.map_err(|e| e.to_string());
                let _ = tx
                    .send(Command::StartFinished {
                        provisional_id: id,
                        result,
                    })
                    .await;
            });
        }
    }

    async fn handle_start_finished(&mut self, provisional_id: String, result: Result<String, String>) {
        match result {
            Ok(engine_id) => self.handle_start_ok(provisional_id, engine_id).await,
            Err(e) => {
                warn!(id = %provisional_id, error = %e, "engine start failed");
                match self.store.transition(
                    &provisional_id,
                    TaskStatus::Error,
                    TransitionFields {
                        error: Some("Failed to start".to_string()),
                        ..Default::default()
                    },
                ) {
                    Ok(_) => {
                        self.emit(UiEvent::TaskStatusChanged {
                            id: provisional_id,
                            status: TaskStatus::Error,
                        })
                        .await;
                    }
                    Err(e) => debug!(id = %provisional_id, error = %e, "start-failure for gone task"),
                }
                self.persist().await;
                // fill the slot this failure just freed
                self.admission_pass().await;
                self.persist().await;
            }
        }
    }

    async fn handle_start_ok(&mut self, provisional_id: String, engine_id: String) {
        if let Err(e) = self.store.reassign_id(&provisional_id, &engine_id) {
            // Record disappeared while start was in flight; the engine-side
            // transfer is now an orphan and has to be stopped.
            warn!(id = %provisional_id, error = %e, "start finished for gone task");
            self.spawn_engine_cancel(engine_id);
            return;
        }
        self.reconciler.forget(&provisional_id);
        self.emit(UiEvent::TaskReassigned {
            old_id: provisional_id,
            new_id: engine_id.clone(),
        })
        .await;

        match self
            .store
            .transition(&engine_id, TaskStatus::Downloading, TransitionFields::default())
        {
            Ok(_) => {
                info!(id = %engine_id, "download started");
                self.emit(UiEvent::TaskStatusChanged {
                    id: engine_id,
                    status: TaskStatus::Downloading,
                })
                .await;
            }
            Err(_) => {
                // User cancelled while the start call was suspended.
                debug!(id = %engine_id, "task no longer startable, cancelling engine side");
                self.spawn_engine_cancel(engine_id);
            }
        }
        self.persist().await;
    }

    fn spawn_engine_cancel(&self, engine_id: String) {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            if let Err(e) = engine.cancel(&engine_id).await {
                warn!(id = %engine_id, error = %e, "orphan cancel failed");
            }
        });
    }

    // ---- progress reconciliation ---------------------------------------

    async fn handle_progress(&mut self, event: ProgressEvent) {
        match self.reconciler.on_event(&mut self.store, event) {
            Reconciliation::Applied(update) => {
                let task = self.store.get(&update.id).cloned();
                if let Some(task) = task {
                    self.dispatcher.on_transition(update.prev, &task);
                }
                self.emit(UiEvent::TaskStatusChanged {
                    id: update.id,
                    status: update.status,
                })
                .await;
                self.persist().await;
                if update.status.is_terminal() {
                    self.admission_scheduled = true;
                }
            }
            Reconciliation::Buffered => self.ensure_flush_ticker(),
            Reconciliation::Dropped => {}
        }
    }

    async fn handle_flush(&mut self) {
        if !self.reconciler.has_pending() {
            // an idle tick means no events arrived since the last flush
            self.stop_flush_ticker();
            return;
        }
        let applied = self.reconciler.flush(&mut self.store);
        for update in applied {
            let Some(task) = self.store.get(&update.id) else {
                continue;
            };
            let progress = UiEvent::TaskProgress {
                id: update.id.clone(),
                progress: task.progress,
                speed: task.speed.clone(),
                eta: task.eta.clone(),
            };
            self.emit(progress).await;
            if update.prev != update.status {
                self.emit(UiEvent::TaskStatusChanged {
                    id: update.id,
                    status: update.status,
                })
                .await;
            }
        }
        self.persist().await;
    }

    fn ensure_flush_ticker(&mut self) {
        if self.flush_ticker.is_some() {
            return;
        }
        let tx = self.self_sender.clone();
        self.flush_ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                if tx.send(Command::FlushProgress).await.is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_flush_ticker(&mut self) {
        if let Some(handle) = self.flush_ticker.take() {
            handle.abort();
        }
    }

    // ---- persistence ----------------------------------------------------

    /// Restore persisted state. Tasks that were mid-transfer are re-queued;
    /// their engine handles did not survive the restart. Paused records come
    /// back as-is, but their old engine id is dead too, so resuming one is
    /// refused engine-side and the task leaves `Paused` only via cancel,
    /// remove, or re-adding the url.
    async fn rehydrate(&mut self) {
        match self.state_store.load().await {
            Ok(Some(state)) => {
                self.settings = state.settings;
                self.download_dir = state.download_dir;
                let tasks = state
                    .tasks
                    .into_iter()
                    .map(|mut t| {
                        if t.status.is_active() {
                            // Engine handles do not survive a restart; re-queue
                            // so the opening admission pass starts them over.
                            t.status = TaskStatus::Queued;
                            t.speed = None;
                            t.eta = None;
                            t.version = 0;
                        }
                        t
                    })
                    .collect();
                self.store = TaskStore::from_tasks(tasks);
                info!(count = self.store.tasks().len(), "restored persisted state");
            }
            Ok(None) => debug!("no persisted state, starting fresh"),
            Err(e) => warn!(error = %e, "failed to load persisted state"),
        }
    }

    async fn persist(&mut self) {
        let state = PersistedState {
            tasks: self.store.snapshot(),
            download_dir: self.download_dir.clone(),
            settings: self.settings.clone(),
        };
        match self.state_store.save(&state).await {
            Ok(()) => self.persist_notice_sent = false,
            Err(e) => {
                warn!(error = %e, "failed to persist state, keeping in-memory state");
                if !self.persist_notice_sent {
                    self.persist_notice_sent = true;
                    self.emit(UiEvent::Notice(
                        "Could not save download state to disk.".to_string(),
                    ))
                    .await;
                }
            }
        }
    }

    async fn emit(&self, event: UiEvent) {
        let _ = self.events.send(event).await;
    }
}

/// Whether the engine currently holds a live transfer for a task in this state
fn engine_owns(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::Downloading | TaskStatus::Paused | TaskStatus::Merging
    )
}
