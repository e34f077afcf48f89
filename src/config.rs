//! # Configuration
//! Engine knobs plus the ambient settings the binary needs (HTTP bind address,
//! storage, webhook, simulation).
//!
//! Resolution order (first hit wins):
//! 1) `$INSIGHT_CONFIG_PATH` (error if it points to a missing file)
//! 2) `config/engine.toml`
//! 3) `config/engine.json`
//! 4) built-in defaults
//!
//! After the file is loaded, `INSIGHT_*` env vars override individual knobs.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EngineError, Result};

pub const ENV_CONFIG_PATH: &str = "INSIGHT_CONFIG_PATH";

/// Everything the binary reads at boot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
    pub simulation: SimulationConfig,
}

/// Engine options. camelCase aliases match the names dashboards already use.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(alias = "collectionIntervalMs")]
    pub collection_interval_ms: u64,
    #[serde(alias = "retentionWindowMs")]
    pub retention_window_ms: u64,
    #[serde(alias = "maxSamplesPerTopic")]
    pub max_samples_per_topic: usize,
    #[serde(alias = "insightLimit")]
    pub insight_limit: usize,
    #[serde(alias = "adapterTimeoutMs")]
    pub adapter_timeout_ms: u64,
    #[serde(alias = "maxParallelAdapters")]
    pub max_parallel_adapters: usize,
    /// Topics with fewer samples than this get no trend.
    #[serde(alias = "minSamplesPerTopic")]
    pub min_samples_per_topic: usize,
    /// Capacity of the insight ring buffer.
    #[serde(alias = "insightRetention")]
    pub insight_retention: usize,
    /// Empty means "all topics".
    pub topics: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collection_interval_ms: 120_000,
            retention_window_ms: 24 * 3600 * 1000,
            max_samples_per_topic: 5_000,
            insight_limit: 10,
            adapter_timeout_ms: 10_000,
            max_parallel_adapters: 8,
            min_samples_per_topic: 1,
            insight_retention: 100,
            topics: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn collection_interval(&self) -> Duration {
        Duration::from_millis(self.collection_interval_ms)
    }

    pub fn retention_window(&self) -> Duration {
        Duration::from_millis(self.retention_window_ms)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }

    /// Reject values that would stall or disable the pipeline.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, bool); 7] = [
            ("collection_interval_ms", self.collection_interval_ms > 0),
            ("retention_window_ms", self.retention_window_ms > 0),
            ("max_samples_per_topic", self.max_samples_per_topic > 0),
            ("insight_limit", self.insight_limit > 0),
            ("adapter_timeout_ms", self.adapter_timeout_ms > 0),
            ("max_parallel_adapters", self.max_parallel_adapters > 0),
            ("insight_retention", self.insight_retention > 0),
        ];
        for (name, ok) in checks {
            if !ok {
                return Err(EngineError::Config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    /// Apply `INSIGHT_*` env overrides; unparsable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        override_from_env("INSIGHT_COLLECTION_INTERVAL_MS", &mut self.collection_interval_ms);
        override_from_env("INSIGHT_RETENTION_WINDOW_MS", &mut self.retention_window_ms);
        override_from_env("INSIGHT_MAX_SAMPLES_PER_TOPIC", &mut self.max_samples_per_topic);
        override_from_env("INSIGHT_LIMIT", &mut self.insight_limit);
        override_from_env("INSIGHT_ADAPTER_TIMEOUT_MS", &mut self.adapter_timeout_ms);
        override_from_env("INSIGHT_MAX_PARALLEL_ADAPTERS", &mut self.max_parallel_adapters);
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub enable_metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            enable_metrics: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON snapshot file; `None` keeps everything in memory only.
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u8,
    pub cooldown_secs: i64,
    /// How many top insights go into one webhook message.
    pub top_insights: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 5,
            max_retries: 3,
            cooldown_secs: 300,
            top_insights: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub seed: Option<u64>,
    pub topics: Vec<String>,
    /// Probability in [0,1] that a simulated fetch fails.
    pub failure_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: None,
            topics: vec![
                "Bitcoin".to_string(),
                "Ordinals".to_string(),
                "Runes".to_string(),
                "Stacks".to_string(),
            ],
            failure_rate: 0.0,
        }
    }
}

impl Settings {
    /// Load from an explicit path. TOML or JSON, chosen by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let settings: Settings = match ext.as_str() {
            "json" => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        Ok(settings)
    }

    /// Load using env var + fallbacks, then apply env overrides and validate.
    pub fn load_default() -> Result<Self> {
        let mut settings = match locate_config()? {
            Some(p) => {
                tracing::info!(path = %p.display(), "loading engine config");
                Self::load_from(&p)?
            }
            None => Self::default(),
        };
        settings.engine.apply_env_overrides();
        if let Ok(addr) = std::env::var("INSIGHT_BIND_ADDR") {
            settings.server.bind_addr = addr;
        }
        settings.engine.validate()?;
        Ok(settings)
    }
}

fn locate_config() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        return Err(EngineError::Config(format!(
            "{ENV_CONFIG_PATH} points to non-existent path {}",
            pb.display()
        )));
    }
    for candidate in ["config/engine.toml", "config/engine.json"] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return Ok(Some(pb));
        }
    }
    Ok(None)
}

fn override_from_env<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable env override"),
        }
    }
}
