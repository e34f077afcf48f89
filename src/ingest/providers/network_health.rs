// src/ingest/providers/network_health.rs
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;

use super::{uniform, SimCore, SimulationParams};
use crate::error::SourceError;
use crate::ingest::types::{SourceAdapter, TopicQuery};
use crate::model::{Sample, SourceCategory};

pub const NAME: &str = "network_health";

#[derive(Debug, Clone, Copy)]
struct Chain {
    fee_rate: f64,
    mempool_mb: f64,
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            fee_rate: 20.0,
            mempool_mb: 50.0,
        }
    }
}

/// Fee pressure, mempool backlog and hash-rate drift per topic. Congestion
/// reads as negative sentiment, hash-rate growth as positive.
pub struct NetworkHealthAdapter {
    core: SimCore<HashMap<String, Chain>>,
}

impl NetworkHealthAdapter {
    pub fn new(params: &SimulationParams) -> Self {
        Self {
            core: SimCore::new(NAME, SourceCategory::Network, 0x33, params, HashMap::new()),
        }
    }

    pub fn with_refresh_every(mut self, every: Option<Duration>) -> Self {
        self.core.set_refresh(every);
        self
    }
}

/// 0 when idle, 1 when fees and backlog are both at their ceiling.
fn congestion(c: &Chain) -> f64 {
    ((c.fee_rate / 300.0) * 0.5 + (c.mempool_mb / 300.0) * 0.5).clamp(0.0, 1.0)
}

#[async_trait]
impl SourceAdapter for NetworkHealthAdapter {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn category(&self) -> SourceCategory {
        SourceCategory::Network
    }

    fn refresh_every(&self) -> Option<Duration> {
        self.core.refresh()
    }

    async fn fetch(&self, topic: &TopicQuery) -> Result<Vec<Sample>, SourceError> {
        let topics = self.core.topics_for(topic);
        let now = Utc::now();
        self.core.with_state(|rng, chains| {
            topics
                .into_iter()
                .map(|topic| {
                    let chain = chains.entry(topic.clone()).or_default();
                    chain.fee_rate = (chain.fee_rate * uniform(rng, 0.7, 1.4)).clamp(1.0, 300.0);
                    chain.mempool_mb = (chain.mempool_mb + uniform(rng, -25.0, 25.0)).clamp(1.0, 300.0);
                    let hashrate_change = uniform(rng, -5.0, 5.0);

                    let load = congestion(chain);
                    let sentiment = 0.6 * (hashrate_change / 5.0) - 0.8 * (load - 0.3);
                    let tx_count = uniform(rng, 100_000.0, 450_000.0).round() as u64;

                    let mut tags = vec!["fees", "mempool", "hashrate"];
                    if load > 0.6 {
                        tags.push("congestion");
                    }
                    Sample::new(topic, NAME, now, sentiment, tx_count).with_tags(tags)
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn congestion_is_bounded() {
        assert_eq!(congestion(&Chain { fee_rate: 1_000.0, mempool_mb: 1_000.0 }), 1.0);
        assert!(congestion(&Chain::default()) < 0.2);
    }

    #[tokio::test]
    async fn emits_one_sample_per_topic() {
        let a = NetworkHealthAdapter::new(&SimulationParams {
            topics: vec!["Bitcoin".into(), "Stacks".into()],
            seed: Some(5),
            failure_rate: 0.0,
        });
        let out = a.fetch(&TopicQuery::All).await.unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|s| s.tags.contains("mempool")));
    }
}
