//! Completion notifications

use crate::queue::store::{DownloadTask, TaskStatus};
use std::sync::Arc;
use tracing::debug;

/// Platform notification capability
pub trait Notifier: Send + Sync {
    /// Ask the platform for permission to notify. Called at most once per
    /// process; the result is cached by the dispatcher.
    fn request_permission(&self) -> bool;

    fn send(&self, title: &str, body: &str);
}

/// Fires exactly one user notification per successful completion
///
/// The previous-status guard protects against duplicate terminal events that
/// survive the stale-version fence (for example a re-delivered completion at
/// the same version boundary).
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    permission: Option<bool>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            permission: None,
        }
    }

    /// Observe a store transition. Returns whether a notification fired.
    pub fn on_transition(&mut self, prev: TaskStatus, task: &DownloadTask) -> bool {
        if task.status != TaskStatus::Completed || prev == TaskStatus::Completed {
            return false;
        }
        if !self.permission_granted() {
            debug!(id = %task.id, "notification permission denied, skipping");
            return false;
        }
        self.notifier.send(
            "Download Complete",
            &format!(
                "\"{}\" has been saved to your computer.",
                task.display_title()
            ),
        );
        true
    }

    fn permission_granted(&mut self) -> bool {
        *self
            .permission
            .get_or_insert_with(|| self.notifier.request_permission())
    }
}
