// src/storage.rs
//! Optional flush/restore of engine state across restarts.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::model::{Insight, Sample};

/// What gets persisted: retained samples (chronological per topic) and the
/// insight ring buffer (insertion order).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub samples: Vec<Sample>,
    #[serde(default)]
    pub insights: Vec<Insight>,
}

#[async_trait::async_trait]
pub trait SnapshotStorage: Send + Sync {
    async fn save(&self, snapshot: &EngineSnapshot) -> Result<()>;

    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<EngineSnapshot>>;
}

/// Pretty JSON on disk. Writes go to a sibling temp file which is then renamed
/// over the target, so a crash never leaves a truncated snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait::async_trait]
impl SnapshotStorage for JsonFileStorage {
    async fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
        }
        let body = serde_json::to_vec_pretty(snapshot).context("serialize snapshot")?;
        let tmp = self.temp_path();
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename {} -> {}", tmp.display(), self.path.display()))?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<EngineSnapshot>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read {}", self.path.display())),
        };
        let snap = serde_json::from_str(&raw)
            .with_context(|| format!("parse {}", self.path.display()))?;
        Ok(Some(snap))
    }
}

/// In-process storage, mainly for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<EngineSnapshot>>,
    saves: Mutex<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: EngineSnapshot) -> Self {
        Self {
            slot: Mutex::new(Some(snapshot)),
            saves: Mutex::new(0),
        }
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock()
    }

    pub fn latest(&self) -> Option<EngineSnapshot> {
        self.slot.lock().clone()
    }
}

#[async_trait::async_trait]
impl SnapshotStorage for MemoryStorage {
    async fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        *self.slot.lock() = Some(snapshot.clone());
        *self.saves.lock() += 1;
        Ok(())
    }

    async fn load(&self) -> Result<Option<EngineSnapshot>> {
        Ok(self.slot.lock().clone())
    }
}
