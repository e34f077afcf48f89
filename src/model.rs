//! # Data model
//! Shapes shared by the whole pipeline: raw observations (`Sample`), per-topic
//! aggregates (`Trend`), synthesized statements (`Insight`) and the engine's
//! status record.
//!
//! Everything here is plain data with `serde` support so read snapshots can be
//! handed to the HTTP layer (camelCase on the wire) or persisted as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use uuid::Uuid;

/// One normalized observation produced by a source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub topic: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    /// Always within [-1, 1] once admitted by the store.
    pub sentiment: f64,
    pub volume: u64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Sample {
    pub fn new(
        topic: impl Into<String>,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
        sentiment: f64,
        volume: u64,
    ) -> Self {
        Self {
            topic: topic.into(),
            source: source.into(),
            timestamp,
            sentiment: clamp_sentiment(sentiment),
            volume,
            tags: BTreeSet::new(),
        }
    }

    /// Builder-style tag attachment (normalized via `text::normalize_tag`).
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for t in tags {
            if let Some(tag) = crate::text::normalize_tag(t.as_ref()) {
                self.tags.insert(tag);
            }
        }
        self
    }
}

/// Per-topic aggregate, fully recomputed each cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub topic: String,
    pub sentiment: f64,
    pub volume: u64,
    /// Percentage momentum between the newest and oldest third of the window.
    #[serde(rename = "change24h")]
    pub change_24h: f64,
    pub sources: BTreeSet<String>,
    pub sample_count: usize,
    pub computed_at: DateTime<Utc>,
}

/// Which rule produced an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Sentiment,
    Momentum,
    Divergence,
}

/// A ranked, explained, confidence-scored statement about one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: Uuid,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub kind: InsightKind,
    pub source_attribution: String,
    pub text: String,
    pub sentiment: f64,
    /// 0..=100
    pub confidence: u8,
    pub topics: BTreeSet<String>,
    pub related_assets: BTreeSet<String>,
}

impl Insight {
    /// True when the insight mentions `topic` (case-insensitive).
    pub fn mentions(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t.eq_ignore_ascii_case(topic))
    }
}

/// Coarse data class of an adapter; drives the default refresh cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Price,
    Social,
    Network,
    TokenActivity,
    Custom,
}

impl SourceCategory {
    /// Default refresh cadence per data class. `None` means every tick.
    pub fn default_interval(self) -> Option<Duration> {
        match self {
            SourceCategory::Price => Some(Duration::from_secs(2 * 60)),
            SourceCategory::Social => Some(Duration::from_secs(5 * 60)),
            SourceCategory::Network => Some(Duration::from_secs(10 * 60)),
            SourceCategory::TokenActivity => Some(Duration::from_secs(15 * 60)),
            SourceCategory::Custom => None,
        }
    }
}

/// Where the scheduler currently is inside a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    #[default]
    Idle,
    Collecting,
    Synthesizing,
    Publishing,
}

/// Per-adapter counters kept in the engine status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStats {
    pub category: SourceCategory,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub last_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
}

impl SourceStats {
    pub fn new(category: SourceCategory) -> Self {
        Self {
            category,
            successes: 0,
            failures: 0,
            timeouts: 0,
            last_samples: 0,
            last_error: None,
            last_success_at: None,
        }
    }
}

/// Engine-wide status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub is_collecting: bool,
    pub phase: SchedulerPhase,
    /// Last time a cycle with at least one successful adapter finished.
    pub last_update: Option<DateTime<Utc>>,
    pub sample_count: usize,
    pub trend_count: usize,
    pub insight_count: usize,
    pub cycle_count: u64,
    pub skipped_cycles: u64,
    /// Number of snapshots published so far.
    pub generation: u64,
    pub registered_sources: Vec<String>,
    pub sources: BTreeMap<String, SourceStats>,
}

impl EngineStatus {
    pub fn new(sources: &[(String, SourceCategory)]) -> Self {
        Self {
            is_collecting: false,
            phase: SchedulerPhase::Idle,
            last_update: None,
            sample_count: 0,
            trend_count: 0,
            insight_count: 0,
            cycle_count: 0,
            skipped_cycles: 0,
            generation: 0,
            registered_sources: sources.iter().map(|(n, _)| n.clone()).collect(),
            sources: sources
                .iter()
                .map(|(n, c)| (n.clone(), SourceStats::new(*c)))
                .collect(),
        }
    }
}

/// Clamp to [-1, 1]; non-finite input collapses to neutral.
pub fn clamp_sentiment(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Clamp and round to the 0..=100 confidence scale.
pub fn clamp_confidence(x: f64) -> u8 {
    if !x.is_finite() {
        return 0;
    }
    x.round().clamp(0.0, 100.0) as u8
}
