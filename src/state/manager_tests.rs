//! Tests for StateManager

use super::*;
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use tokio_test::{assert_err, assert_ok};

fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
}

// ============================================================================
// Construction Tests
// ============================================================================

#[test]
fn test_state_manager_new() {
    let manager = StateManager::new("/tmp/intacct-state.json");
    assert!(!manager.is_in_memory());
    assert_eq!(manager.path().to_str().unwrap(), "/tmp/intacct-state.json");
}

#[test]
fn test_state_manager_without_auto_save() {
    let manager = StateManager::without_auto_save("/tmp/intacct-state.json");
    assert!(!manager.is_in_memory());
}

#[test]
fn test_state_manager_in_memory() {
    let manager = StateManager::in_memory();
    assert!(manager.is_in_memory());
}

// ============================================================================
// Cursor Tests
// ============================================================================

#[tokio::test]
async fn test_get_set_cursor() {
    let manager = StateManager::in_memory();

    assert!(manager.get_cursor("customers", "E100").await.is_none());

    manager.set_cursor("customers", "E100", ts(1)).await.unwrap();
    manager.set_cursor("customers", "E100", ts(8)).await.unwrap();

    assert_eq!(manager.get_cursor("customers", "E100").await, Some(ts(8)));
}

#[tokio::test]
async fn test_cursors_isolated_by_stream_and_entity() {
    let manager = StateManager::in_memory();

    manager.set_cursor("customers", "E100", ts(1)).await.unwrap();
    manager.set_cursor("customers", "E200", ts(2)).await.unwrap();
    manager.set_cursor("vendors", "E100", ts(3)).await.unwrap();

    assert_eq!(manager.get_cursor("customers", "E100").await, Some(ts(1)));
    assert_eq!(manager.get_cursor("customers", "E200").await, Some(ts(2)));
    assert_eq!(manager.get_cursor("vendors", "E100").await, Some(ts(3)));
    assert_eq!(manager.get_cursor("vendors", "E200").await, None);
}

#[tokio::test]
async fn test_stream_state_roundtrip() {
    let manager = StateManager::in_memory();
    assert!(manager.get_stream_state("customers").await.is_none());

    let mut stream = StreamState::new();
    stream.set_cursor("_root", ts(5));
    stream.records_emitted = Some(42);
    manager
        .set_stream_state("customers", stream.clone())
        .await
        .unwrap();

    assert_eq!(manager.get_stream_state("customers").await, Some(stream));
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    {
        let manager = StateManager::new(&path);
        manager.set_cursor("customers", "E100", ts(8)).await.unwrap();
    }

    let manager = StateManager::new(&path);
    manager.load().await.unwrap();
    assert_eq!(manager.get_cursor("customers", "E100").await, Some(ts(8)));
}

#[tokio::test]
async fn test_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(
        &path,
        r#"{"streams": {"vendors": {"entities": {"_root": {"cursor": "2024-03-02T00:00:00Z"}}}}}"#,
    )
    .unwrap();

    let manager = StateManager::from_file(&path).unwrap();
    assert_eq!(manager.get_cursor("vendors", "_root").await, Some(ts(2)));
}

#[tokio::test]
async fn test_from_file_missing_starts_empty() {
    let dir = tempdir().unwrap();
    let manager = StateManager::from_file(dir.path().join("absent.json")).unwrap();
    assert!(manager.state().await.streams.is_empty());
}

#[tokio::test]
async fn test_auto_save() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    let manager = StateManager::new(&path);
    manager.set_cursor("customers", "_root", ts(3)).await.unwrap();

    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("2024-03-03T00:00:00Z"));
}

#[tokio::test]
async fn test_without_auto_save_writes_on_checkpoint() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    let manager = StateManager::without_auto_save(&path);
    manager.set_cursor("customers", "_root", ts(3)).await.unwrap();
    assert!(!path.exists());

    manager.checkpoint().await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_save_to_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("exported.json");

    let manager = StateManager::in_memory();
    manager.set_cursor("customers", "E1", ts(4)).await.unwrap();
    manager.save_to_file(&path).await.unwrap();

    let restored = StateManager::from_file(&path).unwrap();
    assert_eq!(restored.get_cursor("customers", "E1").await, Some(ts(4)));
}

// ============================================================================
// Clear Tests
// ============================================================================

#[tokio::test]
async fn test_clear() {
    let manager = StateManager::in_memory();
    manager.set_cursor("customers", "_root", ts(1)).await.unwrap();
    manager.set_cursor("vendors", "_root", ts(1)).await.unwrap();

    manager.clear().await.unwrap();

    assert!(manager.get_cursor("customers", "_root").await.is_none());
    assert!(manager.get_cursor("vendors", "_root").await.is_none());
}

#[tokio::test]
async fn test_clear_stream() {
    let manager = StateManager::in_memory();
    manager.set_cursor("customers", "_root", ts(1)).await.unwrap();
    manager.set_cursor("vendors", "_root", ts(1)).await.unwrap();

    manager.clear_stream("customers").await.unwrap();

    assert!(manager.get_cursor("customers", "_root").await.is_none());
    assert_eq!(manager.get_cursor("vendors", "_root").await, Some(ts(1)));
}

// ============================================================================
// Misc Tests
// ============================================================================

#[tokio::test]
async fn test_clone_shares_state() {
    let manager = StateManager::in_memory();
    let cloned = manager.clone();

    manager.set_cursor("customers", "_root", ts(6)).await.unwrap();
    assert_eq!(cloned.get_cursor("customers", "_root").await, Some(ts(6)));
}

#[tokio::test]
async fn test_from_json_and_export() {
    let manager = StateManager::from_json(
        r#"{"streams": {"customers": {"entities": {"E1": {"cursor": "03/01/2024 00:00:00"}}}}}"#,
    )
    .unwrap();
    assert!(manager.is_in_memory());
    assert_eq!(manager.get_cursor("customers", "E1").await, Some(ts(1)));

    let json = manager.to_json().await.unwrap();
    assert!(json.contains("2024-03-01T00:00:00Z"));
}

#[test]
fn test_empty_json_is_empty_state() {
    assert_ok!(StateManager::from_json("  "));
}

#[test]
fn test_invalid_cursor_rejected() {
    assert_err!(StateManager::from_json(
        r#"{"streams": {"customers": {"entities": {"E1": {"cursor": "yesterday"}}}}}"#
    ));
}

#[test]
fn test_invalid_json() {
    let result = StateManager::from_json("not valid json");
    assert!(matches!(result, Err(crate::error::Error::State { .. })));
}
