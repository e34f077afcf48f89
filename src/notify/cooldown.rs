// src/notify/cooldown.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Minimum spacing between outgoing notifications.
/// - The first notification always passes.
/// - Inside the cooldown, notifications are suppressed.
/// - State only advances via `record` after a successful send.
#[derive(Debug, Clone, Default)]
pub struct Cooldown {
    window: ChronoDuration,
    last_sent: Option<DateTime<Utc>>,
}

impl Cooldown {
    /// `secs` < 0 is treated as 0 (no cooldown).
    pub fn new(secs: i64) -> Self {
        Self {
            window: ChronoDuration::seconds(secs.max(0)),
            last_sent: None,
        }
    }

    pub fn allows(&self, now: DateTime<Utc>) -> bool {
        match self.last_sent {
            None => true,
            Some(ts) => now.signed_duration_since(ts) >= self.window,
        }
    }

    pub fn record(&mut self, now: DateTime<Utc>) {
        self.last_sent = Some(now);
    }

    pub fn last_sent(&self) -> Option<DateTime<Utc>> {
        self.last_sent
    }
}
