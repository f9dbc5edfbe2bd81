/* affect:meta
id: AFF-20261015-persistence-tests
intent: test
summary: |-
  File-backed state across engine restarts, tolerant loading and isolation of
  store failures from the mutation path.
*/
use std::sync::Arc;
use std::time::Duration;

use affect_engine::config::AffectConfig;
use affect_engine::decay::DecayState;
use affect_engine::persistence::{
    full_reset, JsonFileStore, MemoryStore, PersistedState, StateStore,
};
use affect_engine::state::{AffectEngine, ChangeRecord, Metadata, Trigger};
use chrono::{TimeZone, Utc};
use serde_json::json;
use tempfile::tempdir;

mod common;
use common::{init_recorder, memory_engine, test_config};

fn record(ts: i64, before: i32, after: i32) -> ChangeRecord {
    ChangeRecord {
        timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
        value_before: before,
        value_after: after,
        applied_delta: after - before,
        requested_delta: i64::from(after - before),
        metadata: Metadata::new(),
    }
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("progress-data.json");

    let engine = AffectEngine::new(test_config(), Arc::new(JsonFileStore::new(&path))).unwrap();
    engine.mutate(5, Metadata::new(), Trigger::Sentiment);
    engine.mutate(-2, Metadata::new(), Trigger::Sentiment);
    engine.shutdown().await;

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["currentProgress"], json!(3));
    assert_eq!(raw["history"].as_array().unwrap().len(), 2);
    assert_eq!(raw["history"][1]["oldProgress"], json!(5));
    assert_eq!(raw["history"][1]["newProgress"], json!(3));
    assert_eq!(raw["history"][1]["change"], json!(-2));
    assert!(raw["lastUpdated"].is_string());

    let restored = AffectEngine::new(test_config(), Arc::new(JsonFileStore::new(&path))).unwrap();
    assert_eq!(restored.value(), 3);
    assert_eq!(restored.history_len(), 2);
    assert_eq!(restored.decay_state(), DecayState::Armed);
    restored.shutdown().await;
}

#[tokio::test]
async fn only_recent_history_is_persisted() {
    let (engine, store) = memory_engine(test_config());
    for _ in 0..30 {
        engine.mutate(1, Metadata::new(), Trigger::Sentiment);
    }
    engine.shutdown().await;
    assert_eq!(engine.history_len(), 30);
    let saved = store.saved().unwrap();
    assert_eq!(saved.current_progress, 30);
    assert_eq!(saved.history.len(), 20);
    assert_eq!(saved.history.last().unwrap().value_after, 30);
}

#[tokio::test]
async fn missing_or_corrupt_file_starts_at_zero() {
    let dir = tempdir().unwrap();
    let missing = AffectEngine::new(
        test_config(),
        Arc::new(JsonFileStore::new(dir.path().join("absent.json"))),
    )
    .unwrap();
    assert_eq!(missing.value(), 0);
    assert_eq!(missing.decay_state(), DecayState::Idle);

    let corrupt = dir.path().join("corrupt.json");
    std::fs::write(&corrupt, "][").unwrap();
    let engine = AffectEngine::new(test_config(), Arc::new(JsonFileStore::new(&corrupt))).unwrap();
    assert_eq!(engine.value(), 0);
    assert_eq!(engine.history_len(), 0);
}

#[tokio::test]
async fn loaded_state_is_normalized() {
    let store = Arc::new(MemoryStore::with_state(PersistedState {
        current_progress: 250,
        last_updated: None,
        history: vec![record(2_000, 10, 20), record(1_000, 0, 10)],
    }));
    let engine = AffectEngine::new(test_config(), store).unwrap();
    assert_eq!(engine.value(), 100);
    let history = engine.history(10);
    assert_eq!(history[0].value_after, 10);
    assert_eq!(history[1].value_after, 20);
}

#[tokio::test]
async fn failing_store_does_not_block_mutations() {
    let data = init_recorder();
    let (engine, store) = memory_engine(test_config());
    store.fail_saves(true);
    let outcome = engine.mutate(9, Metadata::new(), Trigger::Manual);
    assert_eq!(outcome.new_value, 9);
    tokio::time::sleep(Duration::from_millis(50)).await;

    store.fail_saves(false);
    engine.mutate(1, Metadata::new(), Trigger::Manual);
    engine.shutdown().await;
    assert_eq!(engine.value(), 10);
    assert_eq!(store.saved().unwrap().current_progress, 10);

    let records = data.lock().unwrap();
    assert!(records
        .iter()
        .any(|(name, _)| name == "affect_persist_failures_total"));
}

#[tokio::test]
async fn fractional_progress_is_rounded_on_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, r#"{"currentProgress": 55.5, "history": []}"#).unwrap();
    let engine = AffectEngine::new(test_config(), Arc::new(JsonFileStore::new(&path))).unwrap();
    assert_eq!(engine.value(), 56);
}

#[tokio::test]
async fn unreadable_history_entries_are_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    let body = json!({
        "currentProgress": 55,
        "lastUpdated": "2026-10-01T12:00:00Z",
        "history": [
            {
                "timestamp": "2026-10-01T11:00:00Z",
                "oldProgress": 49.5,
                "newProgress": 55,
                "change": 5.5,
                "requestedChange": 5.5,
                "metadata": {"trigger": "manual"}
            },
            {"timestamp": "2026-10-01T11:30:00Z", "oldProgress": "lots"},
            {
                "timestamp": "2026-10-01T11:45:00Z",
                "oldProgress": 55,
                "newProgress": 55,
                "change": 0
            }
        ]
    });
    std::fs::write(&path, body.to_string()).unwrap();

    let engine = AffectEngine::new(test_config(), Arc::new(JsonFileStore::new(&path))).unwrap();
    assert_eq!(engine.value(), 55);
    let history = engine.history(10);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].value_before, 50);
    assert_eq!(history[0].requested_delta, 6);
    assert_eq!(history[1].requested_delta, 0);
}

#[tokio::test]
async fn future_last_updated_does_not_pin_new_records() {
    let store = Arc::new(MemoryStore::with_state(PersistedState {
        current_progress: 10,
        last_updated: Some(Utc::now() + chrono::Duration::days(3)),
        history: Vec::new(),
    }));
    let engine = AffectEngine::new(test_config(), store).unwrap();
    let record = engine
        .mutate(1, Metadata::new(), Trigger::Manual)
        .record
        .unwrap();
    assert!(record.timestamp <= Utc::now());
    assert!(engine.snapshot().last_updated <= Utc::now());
}

#[test]
fn full_reset_uses_configured_or_given_path() {
    let dir = tempdir().unwrap();
    let configured = dir.path().join("configured.json");
    let config = AffectConfig {
        state_file: configured.clone(),
        ..test_config()
    };
    let dirty = PersistedState {
        current_progress: 64,
        last_updated: Some(Utc::now()),
        history: vec![record(1_000, 0, 64)],
    };
    JsonFileStore::new(&configured).save(&dirty).unwrap();

    let (path, state) = full_reset(&config, None).unwrap();
    assert_eq!(path, configured);
    assert_eq!(state.current_progress, 0);
    let loaded = JsonFileStore::new(&configured).load().unwrap().unwrap();
    assert_eq!(loaded.current_progress, 0);
    assert!(loaded.history.is_empty());

    JsonFileStore::new(&configured).save(&dirty).unwrap();
    let explicit = dir.path().join("explicit.json");
    let (path, _) = full_reset(&config, Some(explicit.clone())).unwrap();
    assert_eq!(path, explicit);
    assert_eq!(JsonFileStore::new(&explicit).load().unwrap().unwrap().current_progress, 0);
    assert_eq!(
        JsonFileStore::new(&configured).load().unwrap().unwrap().current_progress,
        64
    );
}
