// src/scheduler.rs
//! Timer half of the collection scheduler: `Idle ⇄ Running`.
//!
//! While running, one background task fires a cycle immediately and then once
//! per period. A cycle is always awaited to completion inside the loop, so the
//! stop signal is only observed between cycles. A tick that returns `false`
//! ends the loop on its own. Phase tracking and the overlap guard live in the
//! engine.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// What asked for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    Forced,
}

enum RunState {
    Idle,
    Running {
        cancel: watch::Sender<bool>,
        task: JoinHandle<()>,
    },
}

pub struct Scheduler {
    state: Mutex<RunState>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::Idle),
        }
    }

    /// `false` once the loop was cancelled or ended by its tick.
    pub fn is_running(&self) -> bool {
        matches!(&*self.state.lock(), RunState::Running { task, .. } if !task.is_finished())
    }

    /// Spawn the timer loop. Returns `false` (and does nothing) when a loop is
    /// already running. The loop keeps going while `tick` resolves to `true`.
    pub fn start<F, Fut>(&self, period: Duration, tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut state = self.state.lock();
        if matches!(&*state, RunState::Running { task, .. } if !task.is_finished()) {
            return false;
        }
        let (cancel, rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(period, rx, tick));
        *state = RunState::Running { cancel, task };
        true
    }

    /// Signal the loop to stop and hand back its task so the caller can wait
    /// for an in-flight cycle. `None` when already idle.
    pub fn cancel(&self) -> Option<JoinHandle<()>> {
        let prev = std::mem::replace(&mut *self.state.lock(), RunState::Idle);
        match prev {
            RunState::Idle => None,
            RunState::Running { cancel, task } => {
                // The loop may already be gone; the handle still resolves.
                let _ = cancel.send(true);
                Some(task)
            }
        }
    }
}

async fn run_loop<F, Fut>(period: Duration, mut cancel: watch::Receiver<bool>, mut tick: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    tracing::info!(target: "scheduler", period_ms = period.as_millis() as u64, "collection loop started");

    if !tick().await {
        tracing::info!(target: "scheduler", "collection loop finished by its tick");
        return;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *cancel.borrow() {
            break;
        }
        tokio::select! {
            biased;
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if !tick().await {
                    tracing::info!(target: "scheduler", "collection loop finished by its tick");
                    return;
                }
            }
        }
    }
    tracing::info!(target: "scheduler", "collection loop stopped");
}
