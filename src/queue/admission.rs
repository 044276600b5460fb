//! Admission planning for queued tasks

use crate::queue::store::{TaskStatus, TaskStore};
use crate::utils::config::Settings;

/// Decide which queued tasks may begin engine work right now.
///
/// Returns ids oldest-first (stable FIFO by insertion order; the store keeps
/// records most-recent-first, so candidates are read back-to-front). With the
/// concurrency limit disabled every queued task is admitted. Otherwise the
/// pass fills the free slots left by tasks already in a running state.
///
/// Planning is pure; the caller must reserve each admitted slot by
/// transitioning the task to `Preparing` before its first suspension point so
/// overlapping passes cannot both claim the same slot.
pub fn plan(store: &TaskStore, settings: &Settings) -> Vec<String> {
    let queued = store
        .tasks()
        .iter()
        .rev()
        .filter(|t| t.status == TaskStatus::Queued);

    if !settings.concurrency_mode {
        return queued.map(|t| t.id.clone()).collect();
    }

    let free_slots = settings
        .max_concurrent
        .saturating_sub(store.active_count());
    queued.take(free_slots).map(|t| t.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::store::{TaskSpec, TransitionFields};

    fn store_with_queued(urls: &[&str]) -> (TaskStore, Vec<String>) {
        let mut store = TaskStore::new();
        let ids = urls
            .iter()
            .map(|url| {
                store
                    .add_task(TaskSpec {
                        url: url.to_string(),
                        ..Default::default()
                    })
                    .unwrap()
            })
            .collect();
        (store, ids)
    }

    #[test]
    fn test_admits_oldest_first_up_to_limit() {
        let (store, ids) = store_with_queued(&["https://a", "https://b", "https://c"]);
        let settings = Settings {
            max_concurrent: 2,
            ..Default::default()
        };
        assert_eq!(plan(&store, &settings), vec![ids[0].clone(), ids[1].clone()]);
    }

    #[test]
    fn test_running_tasks_consume_slots() {
        let (mut store, ids) = store_with_queued(&["https://a", "https://b"]);
        store
            .transition(&ids[0], TaskStatus::Preparing, TransitionFields::default())
            .unwrap();

        let settings = Settings {
            max_concurrent: 1,
            ..Default::default()
        };
        assert!(plan(&store, &settings).is_empty());
    }

    #[test]
    fn test_unlimited_mode_admits_everything() {
        let (store, ids) = store_with_queued(&["https://a", "https://b", "https://c"]);
        let settings = Settings {
            max_concurrent: 1,
            concurrency_mode: false,
            ..Default::default()
        };
        assert_eq!(plan(&store, &settings).len(), ids.len());
    }

    #[test]
    fn test_paused_and_terminal_tasks_do_not_count() {
        let (mut store, ids) = store_with_queued(&["https://a", "https://b", "https://c"]);
        store.transition(&ids[0], TaskStatus::Preparing, TransitionFields::default()).unwrap();
        store.transition(&ids[0], TaskStatus::Downloading, TransitionFields::default()).unwrap();
        store.transition(&ids[0], TaskStatus::Paused, TransitionFields::default()).unwrap();
        store.transition(&ids[1], TaskStatus::Cancelled, TransitionFields::default()).unwrap();

        let settings = Settings {
            max_concurrent: 1,
            ..Default::default()
        };
        assert_eq!(plan(&store, &settings), vec![ids[2].clone()]);
    }
}
