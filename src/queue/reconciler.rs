//! Coalescing reconciliation of engine progress events

use crate::engine::models::{EngineStatus, ProgressEvent};
use crate::queue::store::{TaskStatus, TaskStore, TransitionFields};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Outcome of feeding one event into the reconciler
#[derive(Debug)]
pub enum Reconciliation {
    /// Non-terminal event parked in the buffer until the next flush
    Buffered,
    /// Terminal event applied to the store immediately
    Applied(AppliedUpdate),
    /// Stale, unknown-id or state-machine-rejected event; no state change
    Dropped,
}

/// A store mutation produced by the reconciler
#[derive(Debug, Clone)]
pub struct AppliedUpdate {
    pub id: String,
    pub prev: TaskStatus,
    pub status: TaskStatus,
}

/// Buffers rapid progress ticks and applies them in batches
///
/// Terminal events bypass the buffer so completion side effects (notification,
/// queue refill) never wait out a flush interval. The buffer keeps at most one
/// pending event per task id, last write wins.
#[derive(Debug, Default)]
pub struct ProgressReconciler {
    pending: HashMap<String, ProgressEvent>,
}

impl ProgressReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one event from the engine's progress stream.
    pub fn on_event(&mut self, store: &mut TaskStore, event: ProgressEvent) -> Reconciliation {
        let Some(task) = store.get(&event.id) else {
            debug!(id = %event.id, "dropping progress event for unknown task");
            return Reconciliation::Dropped;
        };
        if event.version <= task.version {
            debug!(
                id = %event.id,
                event_version = event.version,
                stored_version = task.version,
                "dropping stale progress event"
            );
            return Reconciliation::Dropped;
        }

        if event.status.is_terminal() {
            // Whatever was buffered for this task is now moot.
            self.pending.remove(&event.id);
            match apply(store, &event) {
                Some(update) => Reconciliation::Applied(update),
                None => Reconciliation::Dropped,
            }
        } else {
            self.pending.insert(event.id.clone(), event);
            Reconciliation::Buffered
        }
    }

    /// Apply the whole pending batch to the store and clear the buffer.
    pub fn flush(&mut self, store: &mut TaskStore) -> Vec<AppliedUpdate> {
        let mut applied = Vec::with_capacity(self.pending.len());
        for (_, event) in self.pending.drain() {
            // Re-check the fence: a terminal event may have overtaken this
            // buffered tick since it was parked.
            let still_fresh = store
                .get(&event.id)
                .is_some_and(|t| event.version > t.version && !t.status.is_terminal());
            if !still_fresh {
                debug!(id = %event.id, "discarding overtaken buffered event");
                continue;
            }
            if let Some(update) = apply(store, &event) {
                applied.push(update);
            }
        }
        applied
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drop any buffered event for an id that no longer exists in the store
    /// (removed, or renamed away by an id reassignment).
    pub fn forget(&mut self, id: &str) {
        self.pending.remove(id);
    }
}

fn apply(store: &mut TaskStore, event: &ProgressEvent) -> Option<AppliedUpdate> {
    let status = task_status(event.status);
    let fields = TransitionFields {
        progress: Some(event.progress),
        speed: event.speed.clone(),
        eta: event.eta.clone(),
        total_size: event.total_size.clone(),
        downloaded_bytes: event.downloaded_bytes,
        error: event.error.clone(),
        version: Some(event.version),
    };
    match store.transition(&event.id, status, fields) {
        Ok(prev) => Some(AppliedUpdate {
            id: event.id.clone(),
            prev,
            status,
        }),
        Err(e) => {
            warn!(id = %event.id, error = %e, "progress event rejected by state machine");
            None
        }
    }
}

fn task_status(status: EngineStatus) -> TaskStatus {
    match status {
        EngineStatus::Downloading => TaskStatus::Downloading,
        EngineStatus::Paused => TaskStatus::Paused,
        EngineStatus::Merging => TaskStatus::Merging,
        EngineStatus::Completed => TaskStatus::Completed,
        EngineStatus::Error => TaskStatus::Error,
        EngineStatus::Cancelled => TaskStatus::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::store::TaskSpec;

    fn downloading_task(store: &mut TaskStore, url: &str) -> String {
        let id = store
            .add_task(TaskSpec {
                url: url.to_string(),
                ..Default::default()
            })
            .unwrap();
        store.transition(&id, TaskStatus::Preparing, TransitionFields::default()).unwrap();
        store.transition(&id, TaskStatus::Downloading, TransitionFields::default()).unwrap();
        id
    }

    fn tick(id: &str, progress: f64, version: u64) -> ProgressEvent {
        ProgressEvent {
            id: id.to_string(),
            progress,
            speed: Some("1.2MiB/s".to_string()),
            eta: Some("00:42".to_string()),
            total_size: None,
            downloaded_bytes: None,
            status: EngineStatus::Downloading,
            error: None,
            version,
        }
    }

    #[test]
    fn test_coalesces_to_last_write_per_flush() {
        let mut store = TaskStore::new();
        let mut reconciler = ProgressReconciler::new();
        let id = downloading_task(&mut store, "https://a");

        for (i, progress) in (10..=90).step_by(10).enumerate() {
            let r = reconciler.on_event(&mut store, tick(&id, progress as f64, i as u64 + 1));
            assert!(matches!(r, Reconciliation::Buffered));
        }
        // Nothing applied until the flush turn
        assert_eq!(store.get(&id).unwrap().progress, 0.0);

        let applied = reconciler.flush(&mut store);
        assert_eq!(applied.len(), 1);
        assert_eq!(store.get(&id).unwrap().progress, 90.0);
        assert!(!reconciler.has_pending());
    }

    #[test]
    fn test_stale_event_is_dropped() {
        let mut store = TaskStore::new();
        let mut reconciler = ProgressReconciler::new();
        let id = downloading_task(&mut store, "https://a");

        reconciler.on_event(&mut store, tick(&id, 50.0, 5));
        reconciler.flush(&mut store);
        assert_eq!(store.get(&id).unwrap().version, 5);

        let r = reconciler.on_event(&mut store, tick(&id, 10.0, 3));
        assert!(matches!(r, Reconciliation::Dropped));
        assert_eq!(store.get(&id).unwrap().progress, 50.0);
    }

    #[test]
    fn test_terminal_event_bypasses_buffer() {
        let mut store = TaskStore::new();
        let mut reconciler = ProgressReconciler::new();
        let id = downloading_task(&mut store, "https://a");

        reconciler.on_event(&mut store, tick(&id, 42.0, 1));

        let mut done = tick(&id, 100.0, 2);
        done.status = EngineStatus::Completed;
        let r = reconciler.on_event(&mut store, done);

        let Reconciliation::Applied(update) = r else {
            panic!("terminal event should apply immediately");
        };
        assert_eq!(update.prev, TaskStatus::Downloading);
        assert_eq!(update.status, TaskStatus::Completed);
        assert_eq!(store.get(&id).unwrap().status, TaskStatus::Completed);

        // The buffered tick must not resurrect the task on the next flush
        assert!(reconciler.flush(&mut store).is_empty());
    }

    #[test]
    fn test_unknown_id_is_dropped() {
        let mut store = TaskStore::new();
        let mut reconciler = ProgressReconciler::new();
        let r = reconciler.on_event(&mut store, tick("nope", 10.0, 1));
        assert!(matches!(r, Reconciliation::Dropped));
        assert!(!reconciler.has_pending());
    }

    #[test]
    fn test_forget_drops_buffered_event() {
        let mut store = TaskStore::new();
        let mut reconciler = ProgressReconciler::new();
        let id = downloading_task(&mut store, "https://a");

        reconciler.on_event(&mut store, tick(&id, 30.0, 1));
        reconciler.forget(&id);
        assert!(!reconciler.has_pending());
        assert!(reconciler.flush(&mut store).is_empty());
    }
}
