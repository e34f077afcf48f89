// src/lib.rs
// Public library surface: the engine, its building blocks and the HTTP router.

pub mod api;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod ingest;
pub mod insight;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod query;
pub mod scheduler;
pub mod sentiment;
pub mod storage;
pub mod store;
pub mod text;
pub mod trend;

// ---- Re-exports for the common entry points ----
pub use crate::api::router;
pub use crate::bus::{EngineUpdate, Subscriber, SubscriptionHandle};
pub use crate::config::{EngineConfig, Settings};
pub use crate::engine::{CycleOutcome, CycleReport, EngineBuilder, InsightEngine};
pub use crate::error::{EngineError, SourceError};
pub use crate::ingest::types::{SourceAdapter, TopicQuery};
pub use crate::model::{EngineStatus, Insight, InsightKind, Sample, SourceCategory, Trend};
pub use crate::query::QueryFacade;
