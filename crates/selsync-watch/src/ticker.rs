//! Tick sources that drive the polling tasks.
//!
//! Production tasks tick on a [`tokio::time::Interval`]; tests and replays
//! use a [`ManualClock`] that runs exactly one tick per call and hands back
//! its outcome, so nothing depends on wall-clock timing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use selsync_core::host::Side;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior};

use crate::watcher::TickOutcome;

/// One request to run a tick, optionally waiting for its outcome.
#[derive(Debug, Default)]
pub struct TickRequest {
    reply: Option<oneshot::Sender<TickOutcome>>,
}

impl TickRequest {
    /// Fire-and-forget tick from a timer.
    pub fn scheduled() -> Self {
        Self::default()
    }

    pub fn complete(self, outcome: TickOutcome) {
        if let Some(reply) = self.reply {
            // The requester may have given up waiting.
            let _ = reply.send(outcome);
        }
    }
}

/// A stream of tick requests for one polling task.
#[async_trait]
pub trait TickSource: Send {
    /// Wait for the next tick. `None` ends the task.
    async fn next_tick(&mut self) -> Option<TickRequest>;
}

/// Creates the tick source for each side whenever the watchers start.
pub trait TickSchedule: Send + Sync {
    fn ticks_for(&self, side: Side) -> Box<dyn TickSource>;
}

// ---------------------------------------------------------------------------
// Interval
// ---------------------------------------------------------------------------

/// Fixed-period ticks; the first tick fires immediately.
#[derive(Debug, Clone, Copy)]
pub struct IntervalSchedule {
    period: Duration,
}

impl IntervalSchedule {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl TickSchedule for IntervalSchedule {
    fn ticks_for(&self, _side: Side) -> Box<dyn TickSource> {
        Box::new(IntervalTicks {
            period: self.period,
            interval: None,
        })
    }
}

struct IntervalTicks {
    period: Duration,
    // Created on first poll so the schedule can be built outside a runtime.
    interval: Option<Interval>,
}

#[async_trait]
impl TickSource for IntervalTicks {
    async fn next_tick(&mut self) -> Option<TickRequest> {
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
        Some(TickRequest::scheduled())
    }
}

// ---------------------------------------------------------------------------
// Manual
// ---------------------------------------------------------------------------

/// Test and replay clock: each [`ManualClock::tick`] runs one tick on the
/// task currently polling that side.
#[derive(Debug, Default)]
pub struct ManualClock {
    senders: Mutex<HashMap<Side, mpsc::UnboundedSender<TickRequest>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one tick on `side` and wait for its outcome. `None` when no task
    /// is polling that side (never started, stopped or faulted).
    pub async fn tick(&self, side: Side) -> Option<TickOutcome> {
        let sender = self.lock_senders().get(&side).cloned()?;
        let (reply, outcome) = oneshot::channel();
        sender.send(TickRequest { reply: Some(reply) }).ok()?;
        outcome.await.ok()
    }

    /// Tick the table side, then the region side.
    pub async fn tick_both(&self) -> [Option<TickOutcome>; 2] {
        let table = self.tick(Side::Table).await;
        let regions = self.tick(Side::Regions).await;
        [table, regions]
    }

    fn lock_senders(&self) -> MutexGuard<'_, HashMap<Side, mpsc::UnboundedSender<TickRequest>>> {
        match self.senders.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TickSchedule for ManualClock {
    fn ticks_for(&self, side: Side) -> Box<dyn TickSource> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock_senders().insert(side, sender);
        Box::new(ManualTicks { receiver })
    }
}

struct ManualTicks {
    receiver: mpsc::UnboundedReceiver<TickRequest>,
}

#[async_trait]
impl TickSource for ManualTicks {
    async fn next_tick(&mut self) -> Option<TickRequest> {
        self.receiver.recv().await
    }
}
