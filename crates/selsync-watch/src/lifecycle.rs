//! Start/Stop lifecycle of the two polling tasks.

use std::sync::{Arc, Mutex, MutexGuard};

use selsync_core::config::FaultPolicy;
use selsync_core::event::{SyncEvent, SyncEventKind};
use selsync_core::host::Side;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ticker::{TickSchedule, TickSource};
use crate::watcher::ChangeWatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Running,
}

/// Status of one polling task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    /// Ended by a task fault.
    Faulted,
    Stopped,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Faulted => "faulted",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit Stop command.
    Manual,
    /// The external cancellation signal fired.
    Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("no tokio runtime available to spawn watchers")]
    NoRuntime,
}

fn started_message(side: Side) -> &'static str {
    match side {
        Side::Table => "Results table \u{2192} region manager watcher started.",
        Side::Regions => "Region manager \u{2192} results table watcher started.",
    }
}

/// Per-side task status for one run.
#[derive(Debug)]
struct TaskBoard {
    statuses: Mutex<[TaskStatus; 2]>,
}

impl TaskBoard {
    fn new() -> Self {
        Self {
            statuses: Mutex::new([TaskStatus::Running; 2]),
        }
    }

    fn slot(side: Side) -> usize {
        match side {
            Side::Table => 0,
            Side::Regions => 1,
        }
    }

    fn get(&self, side: Side) -> TaskStatus {
        lock(&self.statuses)[Self::slot(side)]
    }

    fn set(&self, side: Side, status: TaskStatus) {
        lock(&self.statuses)[Self::slot(side)] = status;
    }
}

struct ActiveRun {
    cancel: CancellationToken,
    board: Arc<TaskBoard>,
    handles: Vec<JoinHandle<()>>,
}

impl ActiveRun {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

/// Owns the scheduling resource for both polling tasks.
///
/// At most one pair of tasks exists at a time. Both tasks share one
/// cancellation token; cancelling it ends both at their next await point.
pub struct WatcherLifecycle {
    watcher: Arc<ChangeWatcher>,
    schedule: Arc<dyn TickSchedule>,
    policy: FaultPolicy,
    active: Mutex<Option<ActiveRun>>,
}

impl WatcherLifecycle {
    pub fn new(
        watcher: ChangeWatcher,
        schedule: Arc<dyn TickSchedule>,
        policy: FaultPolicy,
    ) -> Self {
        Self {
            watcher: Arc::new(watcher),
            schedule,
            policy,
            active: Mutex::new(None),
        }
    }

    /// Start both polling tasks, or do nothing if they are already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<StartOutcome, LifecycleError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| LifecycleError::NoRuntime)?;
        let mut active = self.lock_active();

        if active.as_ref().is_some_and(ActiveRun::is_live) {
            self.log(None, SyncEventKind::AlreadyRunning, "Watchers already running.");
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.watcher.reset();
        let cancel = CancellationToken::new();
        let board = Arc::new(TaskBoard::new());
        let mut handles = Vec::with_capacity(Side::BOTH.len());
        for side in Side::BOTH {
            // Tick sources are created before spawning so the first tick
            // request can never race the task startup.
            let ticks = self.schedule.ticks_for(side);
            handles.push(runtime.spawn(run_side(
                side,
                Arc::clone(&self.watcher),
                ticks,
                cancel.clone(),
                Arc::clone(&board),
                self.policy,
            )));
            self.log(Some(side), SyncEventKind::WatcherStarted, started_message(side));
        }

        *active = Some(ActiveRun {
            cancel,
            board,
            handles,
        });
        Ok(StartOutcome::Started)
    }

    /// Cancel both polling tasks. Never fails; stopping twice only logs.
    pub fn stop(&self, reason: StopReason) -> StopOutcome {
        match self.take_live_run() {
            Some(run) => {
                self.cancel_run(&run, reason);
                StopOutcome::Stopped
            }
            None => StopOutcome::NotRunning,
        }
    }

    /// Like [`WatcherLifecycle::stop`], then waits for both tasks to exit.
    pub async fn shutdown(&self, reason: StopReason) -> StopOutcome {
        let Some(run) = self.take_live_run() else {
            return StopOutcome::NotRunning;
        };
        self.cancel_run(&run, reason);
        for handle in run.handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "watcher task did not exit cleanly");
            }
        }
        StopOutcome::Stopped
    }

    pub fn state(&self) -> LifecycleState {
        if self.lock_active().as_ref().is_some_and(ActiveRun::is_live) {
            LifecycleState::Running
        } else {
            LifecycleState::Stopped
        }
    }

    pub fn task_status(&self, side: Side) -> TaskStatus {
        match self.lock_active().as_ref() {
            Some(run) => run.board.get(side),
            None => TaskStatus::Stopped,
        }
    }

    /// Token of the current run, if one is live.
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.lock_active()
            .as_ref()
            .filter(|run| run.is_live())
            .map(|run| run.cancel.clone())
    }

    fn take_live_run(&self) -> Option<ActiveRun> {
        let mut active = self.lock_active();
        match active.take() {
            Some(run) if run.is_live() => Some(run),
            // A run whose token was cancelled by a fault is already over.
            _ => {
                drop(active);
                self.log(
                    None,
                    SyncEventKind::StopFailed,
                    "Failed to stop watchers: none running.",
                );
                None
            }
        }
    }

    fn cancel_run(&self, run: &ActiveRun, reason: StopReason) {
        run.cancel.cancel();
        let message = match reason {
            StopReason::Manual => "Watchers manually stopped.",
            StopReason::Signal => "Watchers stopped by cancel signal.",
        };
        self.log(None, SyncEventKind::WatchersStopped, message);
    }

    fn log(&self, side: Option<Side>, kind: SyncEventKind, message: &str) {
        self.watcher
            .bridge()
            .events()
            .record(SyncEvent::new(side, kind, message));
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        lock(&self.active)
    }
}

impl Drop for WatcherLifecycle {
    fn drop(&mut self) {
        if let Some(run) = lock(&self.active).take() {
            run.cancel.cancel();
        }
    }
}

async fn run_side(
    side: Side,
    watcher: Arc<ChangeWatcher>,
    mut ticks: Box<dyn TickSource>,
    cancel: CancellationToken,
    board: Arc<TaskBoard>,
    policy: FaultPolicy,
) {
    loop {
        let request = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            request = ticks.next_tick() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let outcome = watcher.tick(side);
        if outcome.is_fault() {
            // Status and cancellation settle before the requester sees the outcome.
            board.set(side, TaskStatus::Faulted);
            if policy == FaultPolicy::StopAll {
                cancel.cancel();
                watcher.bridge().events().record(SyncEvent::new(
                    Some(side),
                    SyncEventKind::WatchersStopped,
                    "Watchers stopped after task fault.",
                ));
            }
            request.complete(outcome);
            return;
        }
        request.complete(outcome);
    }
    tracing::debug!(%side, "watcher task exited");
    board.set(side, TaskStatus::Stopped);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
