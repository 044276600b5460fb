//! Snapshot persistence round trips against a real temp directory.

use chrono::Utc;
use tempfile::tempdir;
use vidflow::{
    DownloadTask, JsonStateStore, MediaFormat, PersistedState, Settings, StateStore, TaskStatus,
    Theme,
};

fn sample_task(id: &str, status: TaskStatus) -> DownloadTask {
    DownloadTask {
        id: id.to_string(),
        url: "https://example.com/watch?v=abc".to_string(),
        source_url: Some("https://example.com/watch?v=abc".to_string()),
        title: Some("Test Video".to_string()),
        format: MediaFormat::Video,
        format_spec: Some("137".to_string()),
        download_dir: Some("/tmp/downloads".to_string()),
        thumbnail: Some("https://example.com/t.jpg".to_string()),
        duration: Some(61.5),
        progress: 42.0,
        speed: Some("1.1MiB/s".to_string()),
        eta: Some("00:58".to_string()),
        total_size: Some("80MiB".to_string()),
        downloaded_bytes: Some(33_554_432),
        status,
        error: None,
        version: 7,
        added_at: Utc::now(),
    }
}

#[tokio::test]
async fn missing_file_loads_as_first_run() {
    let temp = tempdir().expect("temp dir");
    let store = JsonStateStore::new(temp.path());
    assert!(store.load().await.expect("load").is_none());
}

#[tokio::test]
async fn snapshot_survives_a_round_trip() {
    let temp = tempdir().expect("temp dir");
    let store = JsonStateStore::new(temp.path());

    let state = PersistedState {
        tasks: vec![
            sample_task("eng-1", TaskStatus::Downloading),
            sample_task("pending-xyz", TaskStatus::Queued),
        ],
        download_dir: Some("/tmp/downloads".to_string()),
        settings: Settings {
            max_concurrent: 4,
            concurrency_mode: false,
            cookies: Some("SID=abc".to_string()),
            theme: Theme::Light,
        },
    };
    store.save(&state).await.expect("save");

    let loaded = store.load().await.expect("load").expect("state present");
    assert_eq!(loaded.tasks.len(), 2);
    assert_eq!(loaded.tasks[0].id, "eng-1");
    assert_eq!(loaded.tasks[0].status, TaskStatus::Downloading);
    assert_eq!(loaded.tasks[0].progress, 42.0);
    assert_eq!(loaded.tasks[0].version, 7);
    assert_eq!(loaded.tasks[1].format, MediaFormat::Video);
    assert_eq!(loaded.download_dir.as_deref(), Some("/tmp/downloads"));
    assert_eq!(loaded.settings.max_concurrent, 4);
    assert!(!loaded.settings.concurrency_mode);
    assert_eq!(loaded.settings.theme, Theme::Light);
}

#[tokio::test]
async fn saves_overwrite_the_single_key() {
    let temp = tempdir().expect("temp dir");
    let store = JsonStateStore::new(temp.path());

    let mut state = PersistedState {
        tasks: vec![sample_task("eng-1", TaskStatus::Downloading)],
        download_dir: None,
        settings: Settings::default(),
    };
    store.save(&state).await.expect("first save");

    state.tasks[0].status = TaskStatus::Completed;
    state.tasks[0].progress = 100.0;
    store.save(&state).await.expect("second save");

    let loaded = store.load().await.expect("load").expect("state present");
    assert_eq!(loaded.tasks.len(), 1);
    assert_eq!(loaded.tasks[0].status, TaskStatus::Completed);

    // only the state file itself remains, no leftover temp artifacts
    let entries: Vec<_> = std::fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("state.json")]);
}

#[tokio::test]
async fn status_serializes_lowercase() {
    let temp = tempdir().expect("temp dir");
    let store = JsonStateStore::new(temp.path());

    let state = PersistedState {
        tasks: vec![sample_task("eng-1", TaskStatus::Merging)],
        download_dir: None,
        settings: Settings::default(),
    };
    store.save(&state).await.expect("save");

    let raw = std::fs::read_to_string(temp.path().join("state.json")).unwrap();
    assert!(raw.contains("\"merging\""));
    assert!(raw.contains("\"video\""));
}
