//! selsync-watch: polling tasks that keep a results table and a region list
//! selecting the same object.
//!
//! [`watcher::ChangeWatcher`] runs one synchronous tick per side;
//! [`lifecycle::WatcherLifecycle`] owns the two tokio tasks that drive it
//! from a [`ticker::TickSchedule`].

pub mod lifecycle;
pub mod state;
pub mod ticker;
pub mod watcher;

pub use lifecycle::{
    LifecycleError, LifecycleState, StartOutcome, StopOutcome, StopReason, TaskStatus,
    WatcherLifecycle,
};
pub use ticker::{IntervalSchedule, ManualClock, TickSchedule};
pub use watcher::{ChangeWatcher, TickOutcome};
