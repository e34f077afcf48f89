// src/ingest/providers/price_momentum.rs
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;

use super::{ticker_for, uniform, SimCore, SimulationParams};
use crate::error::SourceError;
use crate::ingest::types::{SourceAdapter, TopicQuery};
use crate::model::{Sample, SourceCategory};

pub const NAME: &str = "price_momentum";

/// Random-walk spot prices per topic. Sentiment follows the size and sign of
/// the last move; volume is traded notional in thousands.
pub struct PriceMomentumAdapter {
    core: SimCore<HashMap<String, f64>>,
}

impl PriceMomentumAdapter {
    pub fn new(params: &SimulationParams) -> Self {
        Self {
            core: SimCore::new(NAME, SourceCategory::Price, 0x11, params, HashMap::new()),
        }
    }

    pub fn with_refresh_every(mut self, every: Option<Duration>) -> Self {
        self.core.set_refresh(every);
        self
    }
}

fn opening_price(ticker: &str) -> f64 {
    match ticker {
        "BTC" => 65_000.0,
        "ORDI" => 40.0,
        "RUNE" => 5.0,
        "STX" => 2.0,
        _ => 100.0,
    }
}

#[async_trait]
impl SourceAdapter for PriceMomentumAdapter {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn category(&self) -> SourceCategory {
        SourceCategory::Price
    }

    fn refresh_every(&self) -> Option<Duration> {
        self.core.refresh()
    }

    async fn fetch(&self, topic: &TopicQuery) -> Result<Vec<Sample>, SourceError> {
        let topics = self.core.topics_for(topic);
        let now = Utc::now();
        self.core.with_state(|rng, prices| {
            topics
                .into_iter()
                .map(|topic| {
                    let ticker = ticker_for(&topic);
                    let price = prices
                        .entry(topic.clone())
                        .or_insert_with(|| opening_price(&ticker));
                    let pct = uniform(rng, -0.04, 0.04);
                    *price = (*price * (1.0 + pct)).max(0.0001);

                    // A 4% move saturates around 0.66.
                    let sentiment = (pct * 20.0).tanh();
                    let volume = uniform(rng, 500.0, 50_000.0).round() as u64;

                    let mut tags = vec![format!("${ticker}"), "price".to_string()];
                    if pct.abs() >= 0.025 {
                        tags.push(if pct > 0.0 { "breakout" } else { "selloff" }.to_string());
                    }
                    Sample::new(topic, NAME, now, sentiment, volume).with_tags(tags)
                })
                .collect()
        })
    }
}
