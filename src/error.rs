//! Error types for the aggregation engine.
//!
//! Adapter failures are values, not panics: a cycle records them and moves on.
//! Capacity pressure in the sample store is handled by eviction and never
//! surfaces here.

use thiserror::Error;

/// Why an adapter produced no samples this cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("source `{adapter}` unavailable: {reason}")]
    Unavailable { adapter: String, reason: String },

    #[error("source `{adapter}` timed out after {timeout_ms}ms")]
    Timeout { adapter: String, timeout_ms: u64 },
}

impl SourceError {
    pub fn unavailable(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }

    /// Short label used for metrics and status (`unavailable` | `timeout`).
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Unavailable { .. } => "unavailable",
            SourceError::Timeout { .. } => "timeout",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SourceError::Timeout { .. })
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("subscriber `{name}` failed: {reason}")]
    Subscriber { name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
