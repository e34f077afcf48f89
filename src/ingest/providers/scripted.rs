// src/ingest/providers/scripted.rs
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::SourceError;
use crate::ingest::types::{SourceAdapter, TopicQuery};
use crate::model::{Sample, SourceCategory};

/// Deterministic test double: returns scripted samples or failures, optionally
/// after a delay.
///
/// Queued responses (`then_ok` / `then_err`) are consumed one per call; once the
/// queue is empty the default response is used.
pub struct ScriptedAdapter {
    name: String,
    category: SourceCategory,
    refresh: Option<Duration>,
    samples: Vec<Sample>,
    failure: Option<String>,
    delay: Option<Duration>,
    panic: bool,
    stamp_now: bool,
    queue: Mutex<VecDeque<Result<Vec<Sample>, String>>>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: SourceCategory::Custom,
            refresh: None,
            samples: Vec::new(),
            failure: None,
            delay: None,
            panic: false,
            stamp_now: false,
            queue: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_samples(mut self, samples: Vec<Sample>) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_category(mut self, category: SourceCategory, refresh: Option<Duration>) -> Self {
        self.category = category;
        self.refresh = refresh;
        self
    }

    /// Re-stamp every returned sample with the fetch time.
    pub fn stamped_now(mut self) -> Self {
        self.stamp_now = true;
        self
    }

    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    pub fn then_ok(self, samples: Vec<Sample>) -> Self {
        self.queue.lock().push_back(Ok(samples));
        self
    }

    pub fn then_err(self, reason: impl Into<String>) -> Self {
        self.queue.lock().push_back(Err(reason.into()));
        self
    }

    /// How many times `fetch` has been entered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> SourceCategory {
        self.category
    }

    fn refresh_every(&self) -> Option<Duration> {
        self.refresh
    }

    async fn fetch(&self, _topic: &TopicQuery) -> Result<Vec<Sample>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.panic {
            panic!("scripted adapter `{}` panicked", self.name);
        }

        let queued = self.queue.lock().pop_front();
        let response = match queued {
            Some(r) => r,
            None => match &self.failure {
                Some(reason) => Err(reason.clone()),
                None => Ok(self.samples.clone()),
            },
        };

        let mut samples = response.map_err(|reason| SourceError::unavailable(&self.name, reason))?;
        if self.stamp_now {
            let now = Utc::now();
            for s in &mut samples {
                s.timestamp = now;
            }
        }
        Ok(samples)
    }
}
