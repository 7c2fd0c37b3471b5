mod common;

use chrono::Duration;
use common::*;
use gatekeeper_telegram_bot::cache::{read_snapshot, write_snapshot, QueueKind, Snapshot, Store};

#[tokio::test]
async fn test_missing_snapshot_starts_empty() {
    let path = temp_path("snapshot-missing.json");
    let _ = std::fs::remove_file(&path);

    let store = Store::load(&path, CHAT).unwrap();
    let snapshot = store.snapshot().await;
    assert_eq!(snapshot, Snapshot::default());
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let path = temp_path("snapshot-restart.json");
    let _ = std::fs::remove_file(&path);

    let store = Store::load(&path, CHAT).unwrap();
    store.upsert_on_first_seen(42, CHAT).await;
    store.schedule_welcome(1000, 42, CHAT, at(0), Duration::hours(2)).await;
    store.schedule_trigger(1001, 5, CHAT, at(0), Duration::hours(44)).await;
    store.save().await.unwrap();

    let reloaded = Store::load(&path, CHAT).unwrap();
    let before = store.snapshot().await;
    let after = reloaded.snapshot().await;
    assert_eq!(before, after);
    assert!(after.last_changed > 0);
    assert_eq!(reloaded.queue(QueueKind::Welcome).await[0].expires_at, at(7200));
    assert!(!std::path::Path::new(&format!("{}.tmp", path.display())).exists());
}

#[test]
fn test_snapshot_file_layout() {
    let path = temp_path("snapshot-layout.json");
    let snapshot: Snapshot = serde_json::from_str(
        r#"{"members":[{"id":42,"chat_id":7,"acknowledged":false,"rank":0,"message_count":0}],
            "welcome_queue":[{"message_id":1000,"user_id":42,"chat_id":7,"expires_at":"2023-11-14T22:13:20Z"}],
            "trigger_queue":[],
            "last_changed":1700000000}"#,
    )
    .unwrap();
    write_snapshot(&path, &snapshot).unwrap();

    let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    for key in ["members", "welcome_queue", "trigger_queue", "last_changed"] {
        assert!(value.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(read_snapshot(&path).unwrap(), snapshot);
}

#[test]
fn test_corrupt_snapshot_is_an_error() {
    let path = temp_path("snapshot-corrupt.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(read_snapshot(&path).is_err());
}
