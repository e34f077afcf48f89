//! Read-only views over engine state. Every call returns an owned snapshot,
//! so a reader never observes a half-written cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::Shared;
use crate::insight::top_keywords;
use crate::model::{EngineStatus, Insight, Sample, Trend};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceActivity {
    pub source: String,
    pub samples: usize,
    pub volume: u64,
}

#[derive(Clone)]
pub struct QueryFacade {
    shared: Arc<Shared>,
}

impl QueryFacade {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Retained insights, newest first then by confidence. `limit` defaults to
    /// the configured insight limit.
    pub fn insights(&self, topic: Option<&str>, limit: Option<usize>) -> Vec<Insight> {
        let limit = limit.unwrap_or(self.shared.config.insight_limit);
        self.shared.history.read().snapshot(topic, Some(limit))
    }

    /// Ranked insights of the most recent generation only.
    pub fn latest_insights(&self) -> Arc<Vec<Insight>> {
        Arc::clone(&*self.shared.latest.read())
    }

    /// Current trend set (volume desc, topic asc), optionally for one topic.
    pub fn trends(&self, topic: Option<&str>) -> Vec<Trend> {
        let trends = Arc::clone(&*self.shared.trends.read());
        trends
            .iter()
            .filter(|t| topic.map_or(true, |q| t.topic.eq_ignore_ascii_case(q)))
            .cloned()
            .collect()
    }

    /// Retained samples of `topic` (exact name) at or after `since`.
    pub fn samples(&self, topic: &str, since: Option<DateTime<Utc>>) -> Vec<Sample> {
        self.shared.store.read().query(topic, since)
    }

    pub fn status(&self) -> EngineStatus {
        self.shared.status.read().clone()
    }

    /// Most frequent plain keyword tags across retained samples.
    pub fn top_keywords(&self, count: usize) -> Vec<KeywordCount> {
        let store = self.shared.store.read();
        top_keywords(store.iter(), count)
            .into_iter()
            .map(|(keyword, count)| KeywordCount { keyword, count })
            .collect()
    }

    /// Sources by total retained volume, then sample count, then name.
    pub fn top_sources(&self, count: usize) -> Vec<SourceActivity> {
        let mut by_source: BTreeMap<&str, (usize, u64)> = BTreeMap::new();
        let store = self.shared.store.read();
        for s in store.iter() {
            let e = by_source.entry(s.source.as_str()).or_default();
            e.0 += 1;
            e.1 = e.1.saturating_add(s.volume);
        }
        let mut ranked: Vec<SourceActivity> = by_source
            .into_iter()
            .map(|(source, (samples, volume))| SourceActivity {
                source: source.to_string(),
                samples,
                volume,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.volume
                .cmp(&a.volume)
                .then_with(|| b.samples.cmp(&a.samples))
                .then_with(|| a.source.cmp(&b.source))
        });
        ranked.truncate(count);
        ranked
    }
}
