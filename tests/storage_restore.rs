// tests/storage_restore.rs
//
// Snapshot save after each publishing cycle and restore into a fresh engine.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;

use insight_aggregator::ingest::providers::ScriptedAdapter;
use insight_aggregator::storage::{EngineSnapshot, JsonFileStorage, MemoryStorage, SnapshotStorage};
use insight_aggregator::{EngineConfig, InsightEngine, Sample};

fn adapter() -> Arc<ScriptedAdapter> {
    Arc::new(ScriptedAdapter::new("price").with_samples(vec![
        Sample::new("Bitcoin", "price", Utc::now(), 0.5, 100).with_tags(["$BTC", "#halving"]),
        Sample::new("Runes", "price", Utc::now(), -0.3, 20),
    ]))
}

#[tokio::test]
async fn memory_storage_round_trip_into_fresh_engine() {
    let storage = Arc::new(MemoryStorage::new());
    let first = InsightEngine::builder(EngineConfig::default())
        .adapter(adapter())
        .storage(storage.clone())
        .build()
        .unwrap();
    first.force_refresh().await;
    assert_eq!(storage.saves(), 1);
    let saved = storage.latest().unwrap();
    assert_eq!(saved.samples.len(), 2);

    let second = InsightEngine::builder(EngineConfig::default())
        .storage(storage.clone())
        .build()
        .unwrap();
    assert_eq!(second.restore().await.unwrap(), 2);

    let q = second.query();
    let shape = |t: Vec<insight_aggregator::Trend>| {
        t.into_iter()
            .map(|t| (t.topic, t.volume, t.sample_count, t.sources))
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(q.trends(None)), shape(first.query().trends(None)));
    assert_eq!(q.insights(None, None), first.query().insights(None, None));
    let st = q.status();
    assert_eq!(st.sample_count, 2);
    assert_eq!(st.last_update, saved.saved_at);
    assert_eq!(st.generation, 0);
}

#[tokio::test]
async fn json_file_storage_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("engine.json");

    let first = InsightEngine::builder(EngineConfig::default())
        .adapter(adapter())
        .storage(Arc::new(JsonFileStorage::new(&path)))
        .build()
        .unwrap();
    first.force_refresh().await;
    assert!(path.exists());

    let second = InsightEngine::builder(EngineConfig::default())
        .storage(Arc::new(JsonFileStorage::new(&path)))
        .build()
        .unwrap();
    assert_eq!(second.restore().await.unwrap(), 2);
    assert_eq!(second.query().trends(None).len(), 2);
    assert_eq!(second.query().top_keywords(5)[0].keyword, "halving");
}

#[tokio::test]
async fn restore_drops_samples_outside_retention() {
    let old = Sample::new("Bitcoin", "price", Utc::now() - ChronoDuration::days(3), 0.1, 1);
    let fresh = Sample::new("Bitcoin", "price", Utc::now(), 0.1, 1);
    let storage = Arc::new(MemoryStorage::with_snapshot(EngineSnapshot {
        saved_at: Some(Utc::now()),
        samples: vec![old, fresh],
        insights: vec![],
    }));
    let engine = InsightEngine::builder(EngineConfig::default())
        .storage(storage)
        .build()
        .unwrap();
    engine.restore().await.unwrap();
    assert_eq!(engine.query().samples("Bitcoin", None).len(), 1);
}

#[tokio::test]
async fn restore_without_storage_or_snapshot_is_a_no_op() {
    let bare = InsightEngine::builder(EngineConfig::default()).build().unwrap();
    assert_eq!(bare.restore().await.unwrap(), 0);

    let empty = InsightEngine::builder(EngineConfig::default())
        .storage(Arc::new(MemoryStorage::new()))
        .build()
        .unwrap();
    assert_eq!(empty.restore().await.unwrap(), 0);
}

#[tokio::test]
async fn corrupt_snapshot_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    std::fs::write(&path, "not json").unwrap();
    let storage = JsonFileStorage::new(&path);
    assert!(storage.load().await.is_err());

    let engine = InsightEngine::builder(EngineConfig::default())
        .storage(Arc::new(storage))
        .build()
        .unwrap();
    let err = engine.restore().await.unwrap_err();
    assert!(matches!(err, insight_aggregator::EngineError::Storage(_)));
}
