//! # Sample Store
//! Append-oriented, per-topic buffer of admitted samples with bounded retention.
//!
//! Admission never blocks the pipeline: out-of-range values are clamped,
//! a full topic evicts its oldest sample first, and every admitted sample gets
//! a store-wide sequence number so iteration order is deterministic.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use crate::model::{clamp_sentiment, Sample};
use crate::text::normalize_tag;

#[derive(Debug, Clone)]
struct Stored {
    seq: u64,
    sample: Sample,
}

/// Outcome of admitting one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Stored; `evicted` older samples of the same topic were dropped to make room.
    Admitted { evicted: usize },
    /// Missing topic/source; nothing stored.
    Rejected,
}

/// Totals for a batch append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendReport {
    pub admitted: usize,
    pub evicted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone)]
pub struct SampleStore {
    topics: BTreeMap<String, VecDeque<Stored>>,
    next_seq: u64,
    max_per_topic: usize,
    retention: ChronoDuration,
}

impl SampleStore {
    pub fn new(retention: Duration, max_per_topic: usize) -> Self {
        let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
        Self {
            topics: BTreeMap::new(),
            next_seq: 0,
            max_per_topic: max_per_topic.max(1),
            retention: ChronoDuration::milliseconds(retention_ms),
        }
    }

    /// Admit one sample (clamped and tag-normalized).
    pub fn append(&mut self, mut sample: Sample) -> Admission {
        sample.topic = sample.topic.trim().to_string();
        sample.source = sample.source.trim().to_string();
        if sample.topic.is_empty() || sample.source.is_empty() {
            return Admission::Rejected;
        }
        sample.sentiment = clamp_sentiment(sample.sentiment);
        sample.tags = std::mem::take(&mut sample.tags)
            .into_iter()
            .filter_map(|t| normalize_tag(&t))
            .collect();

        let seq = self.next_seq;
        self.next_seq += 1;

        let buf = self.topics.entry(sample.topic.clone()).or_default();
        let mut evicted = 0;
        while buf.len() >= self.max_per_topic {
            buf.pop_front();
            evicted += 1;
        }
        buf.push_back(Stored { seq, sample });
        Admission::Admitted { evicted }
    }

    /// Admit a batch in order and report totals.
    pub fn extend<I: IntoIterator<Item = Sample>>(&mut self, samples: I) -> AppendReport {
        let mut report = AppendReport::default();
        for s in samples {
            match self.append(s) {
                Admission::Admitted { evicted } => {
                    report.admitted += 1;
                    report.evicted += evicted;
                }
                Admission::Rejected => report.rejected += 1,
            }
        }
        report
    }

    /// Samples of `topic` with `timestamp >= since`, in insertion order.
    pub fn query(&self, topic: &str, since: Option<DateTime<Utc>>) -> Vec<Sample> {
        self.topics
            .get(topic)
            .map(|buf| {
                buf.iter()
                    .filter(|s| since.map_or(true, |t| s.sample.timestamp >= t))
                    .map(|s| s.sample.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Evict everything older than `before`. Returns how many samples were dropped.
    pub fn prune(&mut self, before: DateTime<Utc>) -> usize {
        let mut dropped = 0;
        for buf in self.topics.values_mut() {
            let n = buf.len();
            buf.retain(|s| s.sample.timestamp >= before);
            dropped += n - buf.len();
        }
        self.topics.retain(|_, buf| !buf.is_empty());
        dropped
    }

    /// Prune relative to `now` using the configured retention window.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        match now.checked_sub_signed(self.retention) {
            Some(before) => self.prune(before),
            None => 0,
        }
    }

    /// Samples of `topic` ordered by `(timestamp, seq)`.
    pub fn chronological(&self, topic: &str) -> Vec<&Sample> {
        let Some(buf) = self.topics.get(topic) else {
            return Vec::new();
        };
        let mut v: Vec<&Stored> = buf.iter().collect();
        v.sort_by(|a, b| {
            a.sample
                .timestamp
                .cmp(&b.sample.timestamp)
                .then(a.seq.cmp(&b.seq))
        });
        v.into_iter().map(|s| &s.sample).collect()
    }

    /// Topic names in lexical order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    pub fn contains_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// All samples, topic by topic, insertion order within a topic.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.topics.values().flat_map(|buf| buf.iter().map(|s| &s.sample))
    }

    pub fn topic_len(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, VecDeque::len)
    }

    pub fn len(&self) -> usize {
        self.topics.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn max_per_topic(&self) -> usize {
        self.max_per_topic
    }
}
