//! Built-in adapters.
//!
//! The four simulated data classes produce plausible, bounded values from a
//! seedable RNG so a whole engine run can be reproduced. `ScriptedAdapter` is
//! the deterministic test double. Real integrations implement the same
//! `SourceAdapter` trait.

pub mod network_health;
pub mod price_momentum;
pub mod scripted;
pub mod social_chatter;
pub mod token_activity;

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

use crate::config::SimulationConfig;
use crate::error::SourceError;
use crate::ingest::types::{SourceAdapter, TopicQuery};
use crate::model::SourceCategory;

pub use network_health::NetworkHealthAdapter;
pub use price_momentum::PriceMomentumAdapter;
pub use scripted::ScriptedAdapter;
pub use social_chatter::SocialChatterAdapter;
pub use token_activity::TokenActivityAdapter;

/// Shared knobs for the simulated adapters.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub topics: Vec<String>,
    pub seed: Option<u64>,
    /// Probability in [0,1] that one fetch reports `SourceUnavailable`.
    pub failure_rate: f64,
}

impl From<&SimulationConfig> for SimulationParams {
    fn from(c: &SimulationConfig) -> Self {
        Self {
            topics: c.topics.clone(),
            seed: c.seed,
            failure_rate: c.failure_rate,
        }
    }
}

/// All four simulated data classes, ready to register.
pub fn simulated_suite(params: &SimulationParams) -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(PriceMomentumAdapter::new(params)),
        Arc::new(SocialChatterAdapter::new(params)),
        Arc::new(NetworkHealthAdapter::new(params)),
        Arc::new(TokenActivityAdapter::new(params)),
    ]
}

/// Common state of a simulated adapter: name, topic list, RNG-backed state
/// and the injected failure rate.
pub(crate) struct SimCore<S> {
    name: &'static str,
    topics: Vec<String>,
    failure_rate: f64,
    refresh: Option<Duration>,
    inner: Mutex<(StdRng, S)>,
}

impl<S> SimCore<S> {
    pub(crate) fn new(
        name: &'static str,
        category: SourceCategory,
        salt: u64,
        params: &SimulationParams,
        state: S,
    ) -> Self {
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_mul(31).wrapping_add(salt)),
            None => StdRng::from_os_rng(),
        };
        Self {
            name,
            topics: params.topics.clone(),
            failure_rate: params.failure_rate.clamp(0.0, 1.0),
            refresh: category.default_interval(),
            inner: Mutex::new((rng, state)),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn refresh(&self) -> Option<Duration> {
        self.refresh
    }

    pub(crate) fn set_refresh(&mut self, every: Option<Duration>) {
        self.refresh = every;
    }

    /// Topics to emit for `query`. A named topic outside the configured list is
    /// still served so callers can ask about anything.
    pub(crate) fn topics_for(&self, query: &TopicQuery) -> Vec<String> {
        match query {
            TopicQuery::All => self.topics.clone(),
            TopicQuery::Named(t) => vec![self
                .topics
                .iter()
                .find(|c| c.eq_ignore_ascii_case(t))
                .cloned()
                .unwrap_or_else(|| t.clone())],
        }
    }

    /// Run `f` with exclusive access to the RNG and adapter state, after rolling
    /// the injected failure.
    pub(crate) fn with_state<R>(
        &self,
        f: impl FnOnce(&mut StdRng, &mut S) -> R,
    ) -> Result<R, SourceError> {
        let mut guard = self.inner.lock();
        let (rng, state) = &mut *guard;
        if self.failure_rate > 0.0 && rng.random_bool(self.failure_rate) {
            return Err(SourceError::unavailable(
                self.name,
                "simulated upstream outage",
            ));
        }
        Ok(f(rng, state))
    }
}

/// Ticker used for cash-tags: known assets map explicitly, anything else
/// becomes its first four letters upper-cased.
pub fn ticker_for(topic: &str) -> String {
    match topic.to_ascii_lowercase().as_str() {
        "bitcoin" => "BTC".to_string(),
        "ordinals" => "ORDI".to_string(),
        "runes" => "RUNE".to_string(),
        "stacks" => "STX".to_string(),
        "ethereum" => "ETH".to_string(),
        "solana" => "SOL".to_string(),
        other => other
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .take(4)
            .collect::<String>()
            .to_ascii_uppercase(),
    }
}

/// Uniform in `[lo, hi)`; degenerate ranges return `lo`.
pub(crate) fn uniform(rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        rng.random_range(lo..hi)
    } else {
        lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tickers() {
        assert_eq!(ticker_for("Bitcoin"), "BTC");
        assert_eq!(ticker_for("Stacks"), "STX");
        assert_eq!(ticker_for("Lightning"), "LIGH");
    }

    #[tokio::test]
    async fn seeded_suite_is_reproducible() {
        let params = SimulationParams {
            topics: vec!["Bitcoin".into(), "Runes".into()],
            seed: Some(7),
            failure_rate: 0.0,
        };
        let a = simulated_suite(&params);
        let b = simulated_suite(&params);
        for (x, y) in a.iter().zip(b.iter()) {
            let sx = x.fetch(&TopicQuery::All).await.unwrap();
            let sy = y.fetch(&TopicQuery::All).await.unwrap();
            let kx: Vec<(String, f64, u64)> =
                sx.iter().map(|s| (s.topic.clone(), s.sentiment, s.volume)).collect();
            let ky: Vec<(String, f64, u64)> =
                sy.iter().map(|s| (s.topic.clone(), s.sentiment, s.volume)).collect();
            assert_eq!(kx, ky, "adapter {}", x.name());
            assert!(!sx.is_empty());
        }
    }

    #[tokio::test]
    async fn simulated_values_are_bounded() {
        let params = SimulationParams {
            topics: vec!["Bitcoin".into(), "Ordinals".into(), "Stacks".into()],
            seed: Some(42),
            failure_rate: 0.0,
        };
        for adapter in simulated_suite(&params) {
            for _ in 0..20 {
                for s in adapter.fetch(&TopicQuery::All).await.unwrap() {
                    assert!((-1.0..=1.0).contains(&s.sentiment), "{} {}", adapter.name(), s.sentiment);
                    assert_eq!(s.source, adapter.name());
                }
            }
        }
    }

    #[tokio::test]
    async fn failure_rate_one_always_fails() {
        let params = SimulationParams {
            topics: vec!["Bitcoin".into()],
            seed: Some(1),
            failure_rate: 1.0,
        };
        for adapter in simulated_suite(&params) {
            let err = adapter.fetch(&TopicQuery::All).await.unwrap_err();
            assert_eq!(err.kind(), "unavailable");
        }
    }
}
