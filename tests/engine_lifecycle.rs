// tests/engine_lifecycle.rs
//
// start / stop / force_refresh / dispose and the subscription feed.
// Timing-sensitive cases use generous margins around scripted delays.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use insight_aggregator::ingest::providers::ScriptedAdapter;
use insight_aggregator::model::SchedulerPhase;
use insight_aggregator::{EngineConfig, EngineUpdate, InsightEngine, Sample, Subscriber};

fn sample(topic: &str, source: &str) -> Sample {
    Sample::new(topic, source, Utc::now(), 0.4, 10)
}

fn slow_adapter(delay_ms: u64) -> Arc<ScriptedAdapter> {
    Arc::new(
        ScriptedAdapter::new("slow")
            .with_samples(vec![sample("Bitcoin", "slow")])
            .with_delay(Duration::from_millis(delay_ms))
            .stamped_now(),
    )
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn force_refresh_during_a_cycle_is_skipped() {
    let adapter = slow_adapter(150);
    let engine = InsightEngine::builder(EngineConfig::default())
        .adapter(adapter.clone())
        .build()
        .unwrap();

    let e2 = engine.clone();
    let first = tokio::spawn(async move { e2.force_refresh().await });
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(engine.force_refresh().await.is_skipped());
    let first = first.await.unwrap();
    assert!(first.report().unwrap().published);

    let st = engine.query().status();
    assert_eq!(adapter.calls(), 1);
    assert_eq!(st.skipped_cycles, 1);
    assert_eq!(st.generation, 1);
}

#[tokio::test]
async fn dropped_force_refresh_still_finishes_its_cycle() {
    let adapter = slow_adapter(200);
    let engine = InsightEngine::builder(EngineConfig::default())
        .adapter(adapter.clone())
        .build()
        .unwrap();

    let e2 = engine.clone();
    let caller = tokio::spawn(async move { e2.force_refresh().await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let st = engine.query().status();
    assert_eq!(st.phase, SchedulerPhase::Idle);
    assert_eq!(st.cycle_count, 1);
    assert_eq!(st.generation, 1);
    assert_eq!(st.sample_count, 1);
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn stop_mid_cycle_waits_for_publish_then_goes_quiet() {
    let adapter = slow_adapter(200);
    let config = EngineConfig {
        collection_interval_ms: 100,
        ..EngineConfig::default()
    };
    let engine = InsightEngine::builder(config)
        .adapter(adapter.clone())
        .build()
        .unwrap();

    engine.start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let during = engine.query().status();
    assert!(during.is_collecting);
    assert_eq!(during.generation, 0);

    engine.stop().await;
    let after = engine.query().status();
    assert!(!after.is_collecting);
    assert_eq!(after.generation, 1, "in-flight cycle must publish before stop returns");
    assert!(!engine.is_running());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(adapter.calls(), 1, "no ticks after stop");

    engine.start();
    assert!(eventually(|| adapter.calls() >= 2).await);
    engine.stop().await;
}

#[tokio::test]
async fn start_twice_keeps_a_single_loop() {
    let adapter = Arc::new(ScriptedAdapter::new("a").with_samples(vec![sample("Runes", "a")]));
    let engine = InsightEngine::builder(EngineConfig::default())
        .adapter(adapter.clone())
        .build()
        .unwrap();

    engine.start();
    engine.start();
    assert!(eventually(|| adapter.calls() >= 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(adapter.calls(), 1);
    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn timer_fires_on_the_collection_interval() {
    let adapter = Arc::new(ScriptedAdapter::new("a").with_samples(vec![sample("Runes", "a")]));
    let engine = InsightEngine::builder(EngineConfig::default())
        .adapter(adapter.clone())
        .build()
        .unwrap();

    engine.start();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(adapter.calls(), 1);

    tokio::time::sleep(Duration::from_secs(121)).await;
    assert_eq!(adapter.calls(), 2);

    engine.stop().await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(adapter.calls(), 2);
}

struct Recorder {
    seen: Arc<Mutex<Vec<u64>>>,
    delay: Duration,
}

#[async_trait]
impl Subscriber for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn on_update(&self, update: &EngineUpdate) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.seen.lock().push(update.generation);
        Ok(())
    }
}

struct Explodes;

#[async_trait]
impl Subscriber for Explodes {
    fn name(&self) -> &str {
        "explodes"
    }

    async fn on_update(&self, _update: &EngineUpdate) -> anyhow::Result<()> {
        panic!("subscriber bug");
    }
}

#[tokio::test]
async fn subscribers_are_isolated_and_ordered() {
    let engine = InsightEngine::builder(EngineConfig::default())
        .adapter(Arc::new(
            ScriptedAdapter::new("a")
                .with_samples(vec![sample("Stacks", "a")])
                .stamped_now(),
        ))
        .build()
        .unwrap();

    let slow_seen = Arc::new(Mutex::new(Vec::new()));
    let fast_seen = Arc::new(Mutex::new(Vec::new()));
    engine.subscribe(Arc::new(Explodes));
    engine.subscribe(Arc::new(Recorder {
        seen: Arc::clone(&slow_seen),
        delay: Duration::from_millis(30),
    }));
    let fs = Arc::clone(&fast_seen);
    engine.on_update(move |u| fs.lock().push(u.generation));

    for _ in 0..4 {
        let out = engine.force_refresh().await;
        assert!(out.report().unwrap().published);
    }

    assert!(eventually(|| fast_seen.lock().len() == 4).await);
    assert!(eventually(|| slow_seen.lock().len() == 4).await);
    assert_eq!(*fast_seen.lock(), vec![1, 2, 3, 4]);
    assert_eq!(*slow_seen.lock(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn update_carries_status_and_snapshots() {
    let engine = InsightEngine::builder(EngineConfig::default())
        .adapter(Arc::new(
            ScriptedAdapter::new("a").with_samples(vec![sample("Ordinals", "a")]),
        ))
        .build()
        .unwrap();

    let got: Arc<Mutex<Option<EngineUpdate>>> = Arc::new(Mutex::new(None));
    let g = Arc::clone(&got);
    let handle = engine.on_update(move |u| *g.lock() = Some(u.clone()));
    engine.force_refresh().await;
    assert!(eventually(|| got.lock().is_some()).await);

    let u = got.lock().clone().unwrap();
    assert_eq!(u.generation, 1);
    assert_eq!(u.status.trend_count, u.trends.len());
    assert_eq!(u.trends[0].topic, "Ordinals");
    assert!(!u.insights.is_empty());

    assert!(engine.unsubscribe(handle));
    assert!(!engine.unsubscribe(handle));
}

#[tokio::test]
async fn dispose_clears_subscribers_and_refuses_start() {
    let adapter = Arc::new(ScriptedAdapter::new("a").with_samples(vec![sample("Runes", "a")]));
    let engine = InsightEngine::builder(EngineConfig::default())
        .adapter(adapter.clone())
        .build()
        .unwrap();
    let seen = Arc::new(Mutex::new(0usize));
    let s = Arc::clone(&seen);
    engine.on_update(move |_| *s.lock() += 1);

    engine.start();
    assert!(eventually(|| *seen.lock() == 1).await);
    engine.dispose().await;
    assert!(!engine.is_running());
    assert!(!engine.query().status().is_collecting);

    engine.start();
    assert!(!engine.is_running());
    engine.force_refresh().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*seen.lock(), 1);
}

#[tokio::test]
async fn start_during_dispose_is_refused() {
    let adapter = slow_adapter(200);
    let engine = InsightEngine::builder(EngineConfig::default())
        .adapter(adapter.clone())
        .build()
        .unwrap();

    engine.start();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let e2 = engine.clone();
    let disposing = tokio::spawn(async move { e2.dispose().await });
    // dispose() is now waiting for the in-flight cycle.
    tokio::time::sleep(Duration::from_millis(30)).await;
    engine.start();

    disposing.await.unwrap();
    assert!(!engine.is_running());
    assert!(!engine.query().status().is_collecting);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(adapter.calls(), 1);
}
