// src/ingest/mod.rs
pub mod providers;
pub mod types;

use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::SourceError;
use crate::ingest::types::{SourceAdapter, TopicQuery};
use crate::model::{Sample, SourceCategory};

/// Limits applied to one collection round.
#[derive(Debug, Clone, Copy)]
pub struct CollectOptions {
    pub timeout: Duration,
    pub max_parallel: usize,
}

/// Result of one `(adapter, topic)` fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub source: String,
    pub category: SourceCategory,
    pub topic: TopicQuery,
    pub result: Result<Vec<Sample>, SourceError>,
    pub elapsed: Duration,
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Fetch from every adapter for every topic, concurrently.
///
/// Each call runs under its own timeout once it holds a parallelism permit.
/// Outcomes come back in job order (adapter-major), regardless of completion
/// order, so downstream writes are deterministic.
pub async fn collect(
    adapters: &[Arc<dyn SourceAdapter>],
    topics: &[TopicQuery],
    opts: CollectOptions,
) -> Vec<FetchOutcome> {
    let all = [TopicQuery::All];
    let topics: &[TopicQuery] = if topics.is_empty() { &all } else { topics };

    let jobs: Vec<(Arc<dyn SourceAdapter>, TopicQuery)> = adapters
        .iter()
        .flat_map(|a| topics.iter().map(move |t| (Arc::clone(a), t.clone())))
        .collect();
    if jobs.is_empty() {
        return Vec::new();
    }

    let permits = opts.max_parallel.min(jobs.len()).max(1);
    let sem = Arc::new(Semaphore::new(permits));
    let timeout_ms = u64::try_from(opts.timeout.as_millis()).unwrap_or(u64::MAX);

    // Pre-filled so a panicking job still yields an outcome.
    let mut slots: Vec<(String, SourceCategory, TopicQuery, Option<FetchOutcome>)> = jobs
        .iter()
        .map(|(a, t)| (a.name().to_string(), a.category(), t.clone(), None))
        .collect();

    let mut set = JoinSet::new();
    for (idx, (adapter, topic)) in jobs.into_iter().enumerate() {
        let sem = Arc::clone(&sem);
        set.spawn(async move {
            // The semaphore is never closed; a failed acquire just runs unthrottled.
            let _permit = sem.acquire_owned().await.ok();
            let name = adapter.name().to_string();
            let t0 = Instant::now();
            let result = match tokio::time::timeout(opts.timeout, adapter.fetch(&topic)).await {
                Ok(Ok(samples)) => Ok(retain_topic(samples, &topic, &name)),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(SourceError::Timeout {
                    adapter: name.clone(),
                    timeout_ms,
                }),
            };
            let outcome = FetchOutcome {
                source: name,
                category: adapter.category(),
                topic,
                result,
                elapsed: t0.elapsed(),
            };
            (idx, outcome)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, outcome)) => slots[idx].3 = Some(outcome),
            Err(e) => tracing::warn!(target: "ingest", error = %e, "adapter task aborted"),
        }
    }

    slots
        .into_iter()
        .map(|(source, category, topic, outcome)| {
            outcome.unwrap_or_else(|| FetchOutcome {
                result: Err(SourceError::unavailable(&source, "adapter task panicked")),
                source,
                category,
                topic,
                elapsed: Duration::ZERO,
            })
        })
        .inspect(record_outcome)
        .collect()
}

/// Drop samples an adapter returned for a topic it was not asked about.
fn retain_topic(samples: Vec<Sample>, topic: &TopicQuery, source: &str) -> Vec<Sample> {
    let before = samples.len();
    let kept: Vec<Sample> = samples.into_iter().filter(|s| topic.matches(&s.topic)).collect();
    if kept.len() != before {
        tracing::debug!(
            target: "ingest",
            source,
            %topic,
            dropped = before - kept.len(),
            "adapter returned off-topic samples"
        );
    }
    kept
}

fn record_outcome(o: &FetchOutcome) {
    let ms = o.elapsed.as_secs_f64() * 1_000.0;
    histogram!("engine_fetch_ms", "source" => o.source.clone()).record(ms);
    match &o.result {
        Ok(samples) => {
            tracing::debug!(
                target: "ingest",
                source = %o.source,
                topic = %o.topic,
                samples = samples.len(),
                elapsed_ms = ms,
                "fetch ok"
            );
        }
        Err(e) => {
            tracing::warn!(target: "ingest", source = %o.source, topic = %o.topic, error = %e, "fetch failed");
            counter!(
                "engine_source_failures_total",
                "source" => o.source.clone(),
                "kind" => e.kind()
            )
            .increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::providers::scripted::ScriptedAdapter;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn opts(timeout_ms: u64) -> CollectOptions {
        CollectOptions {
            timeout: Duration::from_millis(timeout_ms),
            max_parallel: 8,
        }
    }

    #[tokio::test]
    async fn outcomes_follow_job_order() {
        let slow: Arc<dyn SourceAdapter> = Arc::new(
            ScriptedAdapter::new("slow")
                .with_samples(vec![Sample::new("A", "slow", Utc::now(), 0.1, 1)])
                .with_delay(Duration::from_millis(30)),
        );
        let fast: Arc<dyn SourceAdapter> = Arc::new(
            ScriptedAdapter::new("fast").with_samples(vec![Sample::new("A", "fast", Utc::now(), 0.1, 1)]),
        );
        let out = collect(&[slow, fast], &[], opts(1_000)).await;
        let names: Vec<&str> = out.iter().map(|o| o.source.as_str()).collect();
        assert_eq!(names, vec!["slow", "fast"]);
        assert!(out.iter().all(FetchOutcome::is_ok));
    }

    #[tokio::test]
    async fn named_topics_fan_out_and_filter() {
        let a: Arc<dyn SourceAdapter> = Arc::new(ScriptedAdapter::new("a").with_samples(vec![
            Sample::new("Bitcoin", "a", Utc::now(), 0.1, 1),
            Sample::new("Runes", "a", Utc::now(), 0.1, 1),
        ]));
        let topics = vec![
            TopicQuery::Named("bitcoin".into()),
            TopicQuery::Named("Runes".into()),
        ];
        let out = collect(&[a], &topics, opts(1_000)).await;
        assert_eq!(out.len(), 2);
        for o in &out {
            let samples = o.result.as_ref().unwrap();
            assert_eq!(samples.len(), 1);
            assert!(o.topic.matches(&samples[0].topic));
        }
    }

    #[tokio::test]
    async fn failure_is_reported_not_raised() {
        let bad: Arc<dyn SourceAdapter> = Arc::new(ScriptedAdapter::new("bad").failing("upstream 503"));
        let out = collect(&[bad], &[], opts(1_000)).await;
        assert_eq!(
            out[0].result,
            Err(SourceError::unavailable("bad", "upstream 503"))
        );
    }

    #[tokio::test]
    async fn panicking_adapter_becomes_unavailable() {
        let p: Arc<dyn SourceAdapter> = Arc::new(ScriptedAdapter::new("boom").panicking());
        let out = collect(&[p], &[], opts(1_000)).await;
        assert!(matches!(out[0].result, Err(SourceError::Unavailable { .. })));
    }

    struct Gauge {
        name: String,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SourceAdapter for Gauge {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch(&self, _topic: &TopicQuery) -> Result<Vec<Sample>, SourceError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn parallelism_is_capped() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let adapters: Vec<Arc<dyn SourceAdapter>> = (0..6)
            .map(|i| {
                Arc::new(Gauge {
                    name: format!("gauge-{i}"),
                    in_flight: Arc::clone(&in_flight),
                    peak: Arc::clone(&peak),
                }) as Arc<dyn SourceAdapter>
            })
            .collect();

        let capped = CollectOptions {
            timeout: Duration::from_secs(1),
            max_parallel: 2,
        };
        let out = collect(&adapters, &[], capped).await;
        assert_eq!(out.len(), 6);
        assert!(out.iter().all(FetchOutcome::is_ok));
        assert_eq!(peak.load(Ordering::SeqCst), 2);

        // Topic fan-out shares the same permits.
        peak.store(0, Ordering::SeqCst);
        let topics = vec![TopicQuery::Named("A".into()), TopicQuery::Named("B".into())];
        collect(&adapters[..2], &topics, CollectOptions { max_parallel: 3, ..capped }).await;
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }
}
