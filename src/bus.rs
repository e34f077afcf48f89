//! Event bus for `DataUpdated` notifications.
//!
//! Updates go into one bounded broadcast ring; every subscriber has its own
//! worker task reading from it, so a slow or failing handler only delays
//! itself. Within one subscriber, updates are handled strictly in publish
//! (generation) order. A subscriber that falls more than `capacity` updates
//! behind skips the oldest ones and resumes at the oldest still buffered.
//! Each delivery runs in its own task; a panic is caught at the join and
//! reported like an error.

use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::oneshot;

use crate::error::EngineError;
use crate::model::{EngineStatus, Insight, Trend};

/// Updates buffered for a lagging subscriber before the oldest are dropped.
pub const DEFAULT_CAPACITY: usize = 64;

/// Snapshot delivered to subscribers after each successful cycle. Collections
/// are shared, not copied per subscriber.
#[derive(Debug, Clone)]
pub struct EngineUpdate {
    pub generation: u64,
    pub status: EngineStatus,
    pub trends: Arc<Vec<Trend>>,
    pub insights: Arc<Vec<Insight>>,
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;

    async fn on_update(&self, update: &EngineUpdate) -> anyhow::Result<()>;
}

/// Adapts a plain closure to `Subscriber` (the `on_update(callback)` form).
pub struct FnSubscriber<F> {
    name: String,
    f: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&EngineUpdate) + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn(&EngineUpdate) + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_update(&self, update: &EngineUpdate) -> anyhow::Result<()> {
        (self.f)(update);
        Ok(())
    }
}

/// Opaque token returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

struct Slot {
    name: String,
    // Dropping the sender stops the worker.
    _stop: oneshot::Sender<()>,
}

pub struct EventBus {
    tx: broadcast::Sender<Arc<EngineUpdate>>,
    slots: Mutex<BTreeMap<u64, Slot>>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            slots: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register `sub` and spawn its delivery worker. Needs a Tokio runtime.
    /// The subscriber sees every update published after this call.
    pub fn subscribe(&self, sub: Arc<dyn Subscriber>) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let rx = self.tx.subscribe();
        let (stop_tx, stop_rx) = oneshot::channel();
        let name = sub.name().to_string();
        tokio::spawn(deliver(sub, rx, stop_rx));
        self.slots.lock().insert(
            id,
            Slot {
                name: name.clone(),
                _stop: stop_tx,
            },
        );
        tracing::debug!(target: "bus", id, subscriber = %name, "subscribed");
        SubscriptionHandle(id)
    }

    /// Returns `false` if the handle was unknown (already removed). A delivery
    /// already in progress finishes; nothing after it is delivered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let removed = self.slots.lock().remove(&handle.0);
        if let Some(slot) = &removed {
            tracing::debug!(target: "bus", id = handle.0, subscriber = %slot.name, "unsubscribed");
        }
        removed.is_some()
    }

    /// Enqueue `update` for every subscriber; never waits on a handler.
    /// Returns the number of registered subscribers.
    pub fn publish(&self, update: Arc<EngineUpdate>) -> usize {
        let slots = self.slots.lock();
        // Err only means no worker is listening right now.
        let _ = self.tx.send(update);
        slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Drop every subscription and stop their workers.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

async fn deliver(
    sub: Arc<dyn Subscriber>,
    mut rx: broadcast::Receiver<Arc<EngineUpdate>>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let update = tokio::select! {
            biased;
            _ = &mut stop => break,
            msg = rx.recv() => match msg {
                Ok(update) => update,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "bus", subscriber = %sub.name(), skipped, "subscriber lagging; dropped oldest updates");
                    counter!("engine_subscriber_lagged_total").increment(skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };
        let s = Arc::clone(&sub);
        let generation = update.generation;
        let joined = tokio::spawn(async move { s.on_update(&update).await }).await;
        let failure = match joined {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(e) if e.is_panic() => Some("handler panicked".to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = failure {
            let err = EngineError::Subscriber {
                name: sub.name().to_string(),
                reason,
            };
            tracing::warn!(target: "bus", generation, error = %err, "subscriber failed");
            counter!("engine_subscriber_errors_total").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn update(generation: u64) -> Arc<EngineUpdate> {
        Arc::new(EngineUpdate {
            generation,
            status: EngineStatus::new(&[]),
            trends: Arc::new(Vec::new()),
            insights: Arc::new(Vec::new()),
        })
    }

    struct Panics;

    #[async_trait]
    impl Subscriber for Panics {
        fn name(&self) -> &str {
            "panics"
        }
        async fn on_update(&self, _u: &EngineUpdate) -> anyhow::Result<()> {
            panic!("boom");
        }
    }

    struct Fails;

    #[async_trait]
    impl Subscriber for Fails {
        fn name(&self) -> &str {
            "fails"
        }
        async fn on_update(&self, _u: &EngineUpdate) -> anyhow::Result<()> {
            anyhow::bail!("nope")
        }
    }

    async fn wait_for(seen: &Arc<Mutex<Vec<u64>>>, n: usize) {
        for _ in 0..200 {
            if seen.lock().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn failing_subscribers_do_not_affect_others() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s2 = Arc::clone(&seen);
        bus.subscribe(Arc::new(Panics));
        bus.subscribe(Arc::new(Fails));
        bus.subscribe(Arc::new(FnSubscriber::new("rec", move |u: &EngineUpdate| {
            s2.lock().push(u.generation)
        })));

        for g in 1..=5 {
            assert_eq!(bus.publish(update(g)), 3);
        }
        wait_for(&seen, 5).await;
        assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s2 = Arc::clone(&seen);
        let h = bus.subscribe(Arc::new(FnSubscriber::new("rec", move |u: &EngineUpdate| {
            s2.lock().push(u.generation)
        })));
        bus.publish(update(1));
        wait_for(&seen, 1).await;

        assert!(bus.unsubscribe(h));
        assert!(!bus.unsubscribe(h));
        assert_eq!(bus.publish(update(2)), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*seen.lock(), vec![1]);
    }

    struct Stalls {
        seen: Arc<Mutex<Vec<u64>>>,
        release: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl Subscriber for Stalls {
        fn name(&self) -> &str {
            "stalls"
        }
        async fn on_update(&self, u: &EngineUpdate) -> anyhow::Result<()> {
            self.seen.lock().push(u.generation);
            if u.generation == 1 {
                self.release.notified().await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn stalled_subscriber_keeps_only_the_newest_updates() {
        let bus = EventBus::with_capacity(2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let release = Arc::new(tokio::sync::Notify::new());
        bus.subscribe(Arc::new(Stalls {
            seen: Arc::clone(&seen),
            release: Arc::clone(&release),
        }));

        bus.publish(update(1));
        wait_for(&seen, 1).await;
        for g in 2..=5 {
            bus.publish(update(g));
        }
        release.notify_one();
        wait_for(&seen, 3).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*seen.lock(), vec![1, 4, 5]);
    }

    #[tokio::test]
    async fn clear_drops_everyone() {
        let bus = EventBus::new();
        bus.subscribe(Arc::new(Fails));
        bus.subscribe(Arc::new(Fails));
        assert_eq!(bus.len(), 2);
        bus.clear();
        assert!(bus.is_empty());
    }
}
