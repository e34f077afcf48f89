//! Bounded in-memory log of generated insights.

use std::collections::VecDeque;

use crate::model::Insight;

/// Ring buffer keeping the most recent `cap` insights.
#[derive(Debug, Clone)]
pub struct InsightLog {
    inner: VecDeque<Insight>,
    cap: usize,
}

impl InsightLog {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Append one generation's insights, dropping the oldest beyond capacity.
    pub fn push_batch(&mut self, batch: impl IntoIterator<Item = Insight>) {
        for insight in batch {
            self.inner.push_back(insight);
        }
        if self.inner.len() > self.cap {
            let excess = self.inner.len() - self.cap;
            self.inner.drain(0..excess);
        }
    }

    /// Newest first, then confidence desc. Optional topic filter, optional limit.
    pub fn snapshot(&self, topic: Option<&str>, limit: Option<usize>) -> Vec<Insight> {
        let mut rows: Vec<Insight> = self
            .inner
            .iter()
            .filter(|i| topic.map_or(true, |t| i.mentions(t)))
            .cloned()
            .collect();
        // Stable sort keeps the generator's tie order inside one generation.
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.confidence.cmp(&a.confidence))
        });
        if let Some(n) = limit {
            rows.truncate(n);
        }
        rows
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Raw contents in insertion order (used for persistence).
    pub fn to_vec(&self) -> Vec<Insight> {
        self.inner.iter().cloned().collect()
    }
}
