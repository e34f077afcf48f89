//! # Trend Synthesizer
//! Pure per-topic aggregation over a consistent store snapshot.
//!
//! - sentiment: volume-weighted mean (plain mean when every volume is zero)
//! - volume: sum of sample volumes
//! - change24h: newest third vs oldest third of the window, as a percentage
//! - output ranked by volume desc, ties by topic name

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::model::{clamp_sentiment, Sample, Trend};
use crate::store::SampleStore;

/// Denominator floor for the momentum ratio, so a near-neutral baseline
/// does not explode the percentage.
const CHANGE_BASELINE_FLOOR: f64 = 0.1;
const CHANGE_CAP: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct TrendSynthesizer {
    min_samples: usize,
}

impl Default for TrendSynthesizer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TrendSynthesizer {
    pub fn new(min_samples: usize) -> Self {
        Self {
            min_samples: min_samples.max(1),
        }
    }

    /// One `Trend` per topic with at least `min_samples` samples.
    pub fn compute(&self, store: &SampleStore, now: DateTime<Utc>) -> Vec<Trend> {
        let mut trends: Vec<Trend> = store
            .topics()
            .filter_map(|topic| {
                let samples = store.chronological(topic);
                if samples.len() < self.min_samples {
                    return None;
                }
                Some(build_trend(topic, &samples, now))
            })
            .collect();

        rank_trends(&mut trends);
        trends
    }
}

/// Volume desc, then topic name.
pub fn rank_trends(trends: &mut [Trend]) {
    trends.sort_by(|a, b| b.volume.cmp(&a.volume).then_with(|| a.topic.cmp(&b.topic)));
}

fn build_trend(topic: &str, samples: &[&Sample], now: DateTime<Utc>) -> Trend {
    let volume: u64 = samples.iter().map(|s| s.volume).fold(0u64, u64::saturating_add);
    let sources: BTreeSet<String> = samples.iter().map(|s| s.source.clone()).collect();

    Trend {
        topic: topic.to_string(),
        sentiment: weighted_sentiment(samples),
        volume,
        change_24h: momentum(samples),
        sources,
        sample_count: samples.len(),
        computed_at: now,
    }
}

/// Volume-weighted mean; falls back to the unweighted mean when volumes sum to zero.
pub fn weighted_sentiment(samples: &[&Sample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: f64 = samples.iter().map(|s| s.volume as f64).sum();
    let value = if total > 0.0 {
        samples.iter().map(|s| s.sentiment * s.volume as f64).sum::<f64>() / total
    } else {
        mean(samples.iter().map(|s| s.sentiment))
    };
    clamp_sentiment(value)
}

/// `samples` must be chronological.
fn momentum(samples: &[&Sample]) -> f64 {
    let k = samples.len() / 3;
    if k == 0 {
        return 0.0;
    }
    let old = mean(samples[..k].iter().map(|s| s.sentiment));
    let recent = mean(samples[samples.len() - k..].iter().map(|s| s.sentiment));
    let change = 100.0 * (recent - old) / old.abs().max(CHANGE_BASELINE_FLOOR);
    change.clamp(-CHANGE_CAP, CHANGE_CAP)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
