pub mod admission;
pub mod reconciler;
pub mod store;

pub use reconciler::{AppliedUpdate, ProgressReconciler, Reconciliation};
pub use store::{DownloadTask, MediaFormat, TaskSpec, TaskStatus, TaskStore, TransitionFields};
