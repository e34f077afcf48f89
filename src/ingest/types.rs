// src/ingest/types.rs
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::SourceError;
use crate::model::{Sample, SourceCategory};

/// What an adapter is asked to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicQuery {
    All,
    Named(String),
}

impl TopicQuery {
    /// Case-insensitive topic match; `All` matches everything.
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicQuery::All => true,
            TopicQuery::Named(t) => t.eq_ignore_ascii_case(topic),
        }
    }
}

impl fmt::Display for TopicQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicQuery::All => f.write_str("all"),
            TopicQuery::Named(t) => f.write_str(t),
        }
    }
}

/// One category of raw data. Stateless per call from the engine's point of view:
/// a transient problem is reported as `Err(SourceError)`, never a panic.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable name; also used as `Sample::source` by the built-in adapters.
    fn name(&self) -> &str;

    fn category(&self) -> SourceCategory {
        SourceCategory::Custom
    }

    /// Minimum spacing between timer-driven fetches. `None` = every tick.
    fn refresh_every(&self) -> Option<Duration> {
        self.category().default_interval()
    }

    async fn fetch(&self, topic: &TopicQuery) -> Result<Vec<Sample>, SourceError>;
}
