//! Outbound notifications. The webhook notifier is an ordinary event-bus
//! subscriber, so its network latency never touches a collection cycle.

pub mod cooldown;
pub mod webhook;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bus::EngineUpdate;

pub use webhook::WebhookNotifier;

/// Compact JSON body posted for one published generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    pub generation: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub sample_count: usize,
    pub trend_count: usize,
    pub top_insights: Vec<InsightLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightLine {
    pub text: String,
    pub confidence: u8,
    pub sentiment: f64,
    pub topics: Vec<String>,
}

impl UpdateSummary {
    /// Summary with at most `top` insights, in the order the generator ranked them.
    pub fn from_update(update: &EngineUpdate, top: usize) -> Self {
        Self {
            generation: update.generation,
            last_update: update.status.last_update,
            sample_count: update.status.sample_count,
            trend_count: update.trends.len(),
            top_insights: update
                .insights
                .iter()
                .take(top)
                .map(|i| InsightLine {
                    text: i.text.clone(),
                    confidence: i.confidence,
                    sentiment: i.sentiment,
                    topics: i.topics.iter().cloned().collect(),
                })
                .collect(),
        }
    }
}
