//! # Insight engine
//! Owns the sample store, the current trend set, the insight ring buffer and
//! the status record, and runs collection cycles over the registered adapters.
//!
//! One cycle: Collecting → Synthesizing → Publishing → Idle.
//! - cycles never overlap; a tick or forced refresh that finds one in flight
//!   is skipped, not queued
//! - store writes from all adapters finish before synthesis reads, and
//!   synthesis reads a consistent store snapshot
//! - `last_update` strictly increases across publishing cycles
//! - a cycle where every adapter failed publishes nothing and keeps the
//!   previous trends and insights
//!
//! `InsightEngine` is a cheap handle; clone it into whatever needs it.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::bus::{EngineUpdate, EventBus, FnSubscriber, Subscriber, SubscriptionHandle};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::history::InsightLog;
use crate::ingest::types::{SourceAdapter, TopicQuery};
use crate::ingest::{self, CollectOptions, FetchOutcome};
use crate::insight::InsightGenerator;
use crate::model::{EngineStatus, Insight, SchedulerPhase, SourceStats, Trend};
use crate::query::QueryFacade;
use crate::scheduler::{Scheduler, Trigger};
use crate::storage::{EngineSnapshot, SnapshotStorage};
use crate::store::{AppendReport, SampleStore};
use crate::trend::TrendSynthesizer;

/// Result of asking for a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle was in flight.
    Skipped,
    Completed(CycleReport),
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Skipped => None,
            CycleOutcome::Completed(r) => Some(r),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleOutcome::Skipped)
    }
}

/// What one completed cycle did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Adapters called this cycle (after class-interval gating).
    pub invoked: usize,
    /// `(adapter, topic)` fetches that returned in time.
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub admitted: usize,
    pub rejected: usize,
    /// Evicted by the per-topic cap.
    pub evicted: usize,
    /// Evicted by the retention window.
    pub pruned: usize,
    /// Trends and insights were recomputed (otherwise the previous ones stand).
    pub resynthesized: bool,
    pub published: bool,
    pub generation: u64,
    pub elapsed: Duration,
}

impl CycleReport {
    fn absorb(&mut self, r: AppendReport) {
        self.admitted += r.admitted;
        self.rejected += r.rejected;
        self.evicted += r.evicted;
    }
}

/// Engine internals shared between handles, the timer loop and the query façade.
pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) adapters: Vec<Arc<dyn SourceAdapter>>,
    topics: Vec<TopicQuery>,
    pub(crate) store: RwLock<SampleStore>,
    pub(crate) trends: RwLock<Arc<Vec<Trend>>>,
    /// Ranked insights of the latest generation.
    pub(crate) latest: RwLock<Arc<Vec<Insight>>>,
    pub(crate) history: RwLock<InsightLog>,
    pub(crate) status: RwLock<EngineStatus>,
    last_success: Mutex<HashMap<String, tokio::time::Instant>>,
    bus: EventBus,
    scheduler: Scheduler,
    cycle_lock: tokio::sync::Mutex<()>,
    storage: Option<Arc<dyn SnapshotStorage>>,
    synth: TrendSynthesizer,
    generator: InsightGenerator,
    disposed: AtomicBool,
}

pub struct EngineBuilder {
    config: EngineConfig,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    storage: Option<Arc<dyn SnapshotStorage>>,
    generator: InsightGenerator,
}

impl EngineBuilder {
    pub fn adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn adapters(mut self, adapters: impl IntoIterator<Item = Arc<dyn SourceAdapter>>) -> Self {
        self.adapters.extend(adapters);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn SnapshotStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn generator(mut self, generator: InsightGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Validates the config and rejects duplicate adapter names.
    pub fn build(self) -> Result<InsightEngine> {
        self.config.validate()?;
        let mut seen = BTreeSet::new();
        for a in &self.adapters {
            if !seen.insert(a.name().to_string()) {
                return Err(EngineError::Config(format!(
                    "adapter `{}` registered twice",
                    a.name()
                )));
            }
        }
        crate::metrics::ensure_described();

        let registered: Vec<_> = self
            .adapters
            .iter()
            .map(|a| (a.name().to_string(), a.category()))
            .collect();
        let topics = self
            .config
            .topics
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| TopicQuery::Named(t.to_string()))
            .collect();

        let shared = Shared {
            store: RwLock::new(SampleStore::new(
                self.config.retention_window(),
                self.config.max_samples_per_topic,
            )),
            trends: RwLock::new(Arc::new(Vec::new())),
            latest: RwLock::new(Arc::new(Vec::new())),
            history: RwLock::new(InsightLog::with_capacity(self.config.insight_retention)),
            status: RwLock::new(EngineStatus::new(&registered)),
            last_success: Mutex::new(HashMap::new()),
            bus: EventBus::new(),
            scheduler: Scheduler::new(),
            cycle_lock: tokio::sync::Mutex::new(()),
            synth: TrendSynthesizer::new(self.config.min_samples_per_topic),
            generator: self.generator,
            storage: self.storage,
            adapters: self.adapters,
            topics,
            config: self.config,
            disposed: AtomicBool::new(false),
        };
        Ok(InsightEngine {
            shared: Arc::new(shared),
        })
    }
}

#[derive(Clone)]
pub struct InsightEngine {
    shared: Arc<Shared>,
}

impl InsightEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            adapters: Vec::new(),
            storage: None,
            generator: InsightGenerator::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        self.shared.scheduler.is_running()
    }

    /// Idle → Running: fires one cycle right away, then one per collection
    /// interval. Logs and returns when already running or disposed.
    pub fn start(&self) {
        if self.shared.disposed.load(Ordering::SeqCst) {
            tracing::warn!(target: "scheduler", "start() on a disposed engine ignored");
            return;
        }
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let tick = move || timer_tick(weak.clone());
        let period = self.shared.config.collection_interval();
        if !self.shared.scheduler.start(period, tick) {
            tracing::warn!(target: "scheduler", "start() called while already running");
            return;
        }
        // dispose() may have begun between the check above and the spawn.
        if self.shared.disposed.load(Ordering::SeqCst) {
            let _ = self.shared.scheduler.cancel();
            tracing::warn!(target: "scheduler", "start() raced with dispose(); loop cancelled");
            return;
        }
        self.shared.status.write().is_collecting = true;
        tracing::info!(
            target: "scheduler",
            adapters = self.shared.adapters.len(),
            interval_ms = self.shared.config.collection_interval_ms,
            "engine started"
        );
    }

    /// Running → Idle. The timer is cancelled immediately; returns once any
    /// in-flight cycle has published.
    pub async fn stop(&self) {
        let Some(task) = self.shared.scheduler.cancel() else {
            tracing::debug!(target: "scheduler", "stop() while idle");
            return;
        };
        if let Err(e) = task.await {
            tracing::warn!(target: "scheduler", error = %e, "collection loop ended abnormally");
        }
        // A forced refresh may still hold the cycle.
        let _cycle = self.shared.cycle_lock.lock().await;
        let running = self.shared.scheduler.is_running();
        self.shared.status.write().is_collecting = running;
        tracing::info!(target: "scheduler", "engine stopped");
    }

    /// One immediate cycle regardless of the timer (skipped if one is in
    /// flight). Class-interval gating does not apply.
    ///
    /// The cycle runs on its own task: dropping the returned future (a client
    /// hanging up on `POST /refresh`) does not abort it.
    pub async fn force_refresh(&self) -> CycleOutcome {
        let engine = self.clone();
        match tokio::spawn(async move { engine.run_cycle(Trigger::Forced).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(target: "scheduler", error = %e, "forced cycle task failed");
                self.set_phase(SchedulerPhase::Idle);
                CycleOutcome::Skipped
            }
        }
    }

    /// Stop, drop every subscription and refuse further starts.
    pub async fn dispose(&self) {
        self.shared.disposed.store(true, Ordering::SeqCst);
        self.stop().await;
        self.shared.bus.clear();
        tracing::info!("engine disposed");
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionHandle {
        self.shared.bus.subscribe(subscriber)
    }

    /// Closure form of `subscribe`.
    pub fn on_update<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&EngineUpdate) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnSubscriber::new("on_update", callback)))
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.shared.bus.unsubscribe(handle)
    }

    pub fn query(&self) -> QueryFacade {
        QueryFacade::new(Arc::clone(&self.shared))
    }

    /// Load the injected storage's snapshot into the store and insight log,
    /// then recompute trends without publishing. Returns how many samples were
    /// admitted; `0` without storage or without a saved snapshot.
    pub async fn restore(&self) -> Result<usize> {
        let Some(storage) = self.shared.storage.clone() else {
            return Ok(0);
        };
        let snapshot = storage
            .load()
            .await
            .map_err(|e| EngineError::Storage(format!("{e:#}")))?;
        let Some(snapshot) = snapshot else {
            tracing::info!("no snapshot to restore");
            return Ok(0);
        };

        let _cycle = self.shared.cycle_lock.lock().await;
        let now = Utc::now();
        let s = &self.shared;

        let (report, trends) = {
            let mut store = s.store.write();
            let report = store.extend(snapshot.samples);
            store.prune_expired(now);
            let trends = s.synth.compute(&store, now);
            (report, trends)
        };
        let (latest, retained) = {
            let mut history = s.history.write();
            history.push_batch(snapshot.insights);
            (
                history.snapshot(None, Some(s.config.insight_limit)),
                history.len(),
            )
        };
        let sample_count = s.store.read().len();

        {
            let mut st = s.status.write();
            st.sample_count = sample_count;
            st.trend_count = trends.len();
            st.insight_count = retained;
            if st.last_update.is_none() {
                st.last_update = snapshot.saved_at;
            }
        }
        *s.trends.write() = Arc::new(trends);
        *s.latest.write() = Arc::new(latest);

        tracing::info!(
            admitted = report.admitted,
            rejected = report.rejected,
            insights = retained,
            "restored snapshot"
        );
        Ok(report.admitted)
    }

    async fn run_cycle(&self, trigger: Trigger) -> CycleOutcome {
        let s = &self.shared;
        let Ok(_cycle) = s.cycle_lock.try_lock() else {
            s.status.write().skipped_cycles += 1;
            counter!("engine_cycles_skipped_total").increment(1);
            tracing::debug!(target: "scheduler", ?trigger, "cycle in flight; skipping");
            return CycleOutcome::Skipped;
        };
        let t0 = std::time::Instant::now();
        let mut report = CycleReport::default();

        // Collecting
        self.set_phase(SchedulerPhase::Collecting);
        let due = self.due_adapters(trigger);
        report.invoked = due.len();
        let opts = CollectOptions {
            timeout: s.config.adapter_timeout(),
            max_parallel: s.config.max_parallel_adapters,
        };
        let outcomes = if due.is_empty() {
            Vec::new()
        } else {
            ingest::collect(&due, &s.topics, opts).await
        };

        let now = Utc::now();
        self.record_sources(&outcomes, now);
        for o in &outcomes {
            match &o.result {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    report.failed += 1;
                    if e.is_timeout() {
                        report.timed_out += 1;
                    }
                }
            }
        }
        let any_success = report.succeeded > 0;

        let sample_count = {
            let mut store = s.store.write();
            for o in outcomes {
                if let Ok(samples) = o.result {
                    report.absorb(store.extend(samples));
                }
            }
            report.pruned = store.prune_expired(now);
            store.len()
        };

        if any_success {
            let stamp = self.next_stamp(now);

            // Synthesizing
            if report.admitted > 0 || report.pruned > 0 {
                self.set_phase(SchedulerPhase::Synthesizing);
                let (trends, insights) = {
                    let store = s.store.read();
                    let trends = s.synth.compute(&store, stamp);
                    let insights =
                        s.generator
                            .generate(&trends, &store, s.config.insight_limit, stamp);
                    (trends, insights)
                };
                s.history.write().push_batch(insights.iter().cloned());
                *s.trends.write() = Arc::new(trends);
                *s.latest.write() = Arc::new(insights);
                report.resynthesized = true;
            } else {
                tracing::debug!(target: "scheduler", "no new samples; keeping previous trends and insights");
            }

            // Publishing
            self.set_phase(SchedulerPhase::Publishing);
            let trends = Arc::clone(&*s.trends.read());
            let insights = Arc::clone(&*s.latest.read());
            let retained = s.history.read().len();
            let status = {
                let mut st = s.status.write();
                st.last_update = Some(stamp);
                st.sample_count = sample_count;
                st.trend_count = trends.len();
                st.insight_count = retained;
                st.generation += 1;
                st.cycle_count += 1;
                st.clone()
            };
            report.generation = status.generation;
            report.published = true;

            let update = EngineUpdate {
                generation: status.generation,
                status,
                trends,
                insights,
            };
            let delivered = s.bus.publish(Arc::new(update));
            gauge!("engine_last_update_ts").set(stamp.timestamp() as f64);
            tracing::debug!(target: "bus", generation = report.generation, subscribers = delivered, "published update");

            self.persist(stamp).await;
        } else {
            let mut st = s.status.write();
            st.sample_count = sample_count;
            st.cycle_count += 1;
            report.generation = st.generation;
            if report.invoked > 0 {
                tracing::warn!(
                    target: "scheduler",
                    failed = report.failed,
                    "every adapter failed; serving previous snapshot"
                );
            }
        }

        self.set_phase(SchedulerPhase::Idle);
        report.elapsed = t0.elapsed();

        counter!("engine_cycles_total").increment(1);
        counter!("engine_samples_admitted_total").increment(report.admitted as u64);
        counter!("engine_samples_evicted_total").increment((report.evicted + report.pruned) as u64);
        histogram!("engine_cycle_ms").record(report.elapsed.as_secs_f64() * 1_000.0);
        gauge!("engine_store_samples").set(sample_count as f64);

        tracing::info!(
            target: "scheduler",
            ?trigger,
            invoked = report.invoked,
            ok = report.succeeded,
            failed = report.failed,
            admitted = report.admitted,
            evicted = report.evicted,
            pruned = report.pruned,
            generation = report.generation,
            published = report.published,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "cycle complete"
        );
        CycleOutcome::Completed(report)
    }

    fn set_phase(&self, phase: SchedulerPhase) {
        self.shared.status.write().phase = phase;
    }

    /// Forced cycles call everything; timer cycles skip adapters whose last
    /// success is younger than their refresh interval.
    fn due_adapters(&self, trigger: Trigger) -> Vec<Arc<dyn SourceAdapter>> {
        let all = &self.shared.adapters;
        if trigger == Trigger::Forced {
            return all.clone();
        }
        let now = tokio::time::Instant::now();
        let last = self.shared.last_success.lock();
        all.iter()
            .filter(|a| match (a.refresh_every(), last.get(a.name())) {
                (Some(every), Some(at)) => {
                    let due = now.duration_since(*at) >= every;
                    if !due {
                        tracing::trace!(target: "scheduler", source = a.name(), "not due yet");
                    }
                    due
                }
                _ => true,
            })
            .cloned()
            .collect()
    }

    fn record_sources(&self, outcomes: &[FetchOutcome], at: DateTime<Utc>) {
        let s = &self.shared;
        let mut st = s.status.write();
        let mut last = s.last_success.lock();
        let tick = tokio::time::Instant::now();

        for o in outcomes {
            st.sources
                .entry(o.source.clone())
                .or_insert_with(|| SourceStats::new(o.category))
                .last_samples = 0;
        }
        for o in outcomes {
            let Some(stats) = st.sources.get_mut(&o.source) else {
                continue;
            };
            match &o.result {
                Ok(samples) => {
                    stats.successes += 1;
                    stats.last_samples += samples.len();
                    stats.last_error = None;
                    stats.last_success_at = Some(at);
                    last.insert(o.source.clone(), tick);
                }
                Err(e) => {
                    stats.failures += 1;
                    if e.is_timeout() {
                        stats.timeouts += 1;
                    }
                    stats.last_error = Some(e.to_string());
                }
            }
        }
    }

    /// `max(now, previous + 1ms)`, so published timestamps strictly increase.
    fn next_stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.shared.status.read().last_update {
            Some(prev) if now <= prev => prev + chrono::Duration::milliseconds(1),
            _ => now,
        }
    }

    async fn persist(&self, stamp: DateTime<Utc>) {
        let Some(storage) = self.shared.storage.clone() else {
            return;
        };
        let snapshot = {
            let store = self.shared.store.read();
            let samples = store
                .topics()
                .flat_map(|t| store.chronological(t))
                .cloned()
                .collect();
            EngineSnapshot {
                saved_at: Some(stamp),
                samples,
                insights: self.shared.history.read().to_vec(),
            }
        };
        let budget = self.shared.config.adapter_timeout();
        match tokio::time::timeout(budget, storage.save(&snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %format!("{e:#}"), "snapshot save failed"),
            Err(_) => tracing::warn!(timeout_ms = budget.as_millis() as u64, "snapshot save timed out"),
        }
    }
}

/// One timer tick. `false` once every engine handle is gone, which ends the
/// loop.
async fn timer_tick(weak: Weak<Shared>) -> bool {
    let Some(shared) = weak.upgrade() else {
        return false;
    };
    InsightEngine { shared }.run_cycle(Trigger::Timer).await;
    true
}
