// src/ingest/providers/token_activity.rs
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;

use super::{ticker_for, uniform, SimCore, SimulationParams};
use crate::error::SourceError;
use crate::ingest::types::{SourceAdapter, TopicQuery};
use crate::model::{Sample, SourceCategory};

pub const NAME: &str = "token_activity";

/// Smoothing factor of the mint-count baseline.
const ALPHA: f64 = 0.2;

/// Inscription / mint counts per topic compared against a moving baseline.
/// A burst above baseline is bullish, a drought bearish.
pub struct TokenActivityAdapter {
    core: SimCore<HashMap<String, f64>>,
}

impl TokenActivityAdapter {
    pub fn new(params: &SimulationParams) -> Self {
        Self {
            core: SimCore::new(NAME, SourceCategory::TokenActivity, 0x44, params, HashMap::new()),
        }
    }

    pub fn with_refresh_every(mut self, every: Option<Duration>) -> Self {
        self.core.set_refresh(every);
        self
    }
}

#[async_trait]
impl SourceAdapter for TokenActivityAdapter {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn category(&self) -> SourceCategory {
        SourceCategory::TokenActivity
    }

    fn refresh_every(&self) -> Option<Duration> {
        self.core.refresh()
    }

    async fn fetch(&self, topic: &TopicQuery) -> Result<Vec<Sample>, SourceError> {
        let topics = self.core.topics_for(topic);
        let now = Utc::now();
        self.core.with_state(|rng, baselines| {
            topics
                .into_iter()
                .map(|topic| {
                    let baseline = baselines.entry(topic.clone()).or_insert(1_000.0);
                    let mints = (*baseline * uniform(rng, 0.5, 1.8)).max(1.0);
                    let deviation = (mints - *baseline) / *baseline;
                    *baseline = (1.0 - ALPHA) * *baseline + ALPHA * mints;

                    let sentiment = (deviation * 2.0).tanh();
                    let mut tags = vec![
                        "inscriptions".to_string(),
                        "mints".to_string(),
                        format!("${}", ticker_for(&topic)),
                    ];
                    if deviation > 0.5 {
                        tags.push("mint_wave".to_string());
                    }
                    Sample::new(topic, NAME, now, sentiment, mints.round() as u64).with_tags(tags)
                })
                .collect()
        })
    }
}
