//! Runs session commands against a watcher lifecycle.

use std::sync::Arc;

use selsync_core::bridge::{BridgeOutcome, SelectionBridge};
use selsync_core::config::SyncConfig;
use selsync_core::error::ConfigError;
use selsync_core::event::{SyncEvent, SyncEventSink};
use selsync_core::host::{RegionManager, ResultsTable, Side};
use selsync_core::resolve::MatchResolver;
use selsync_watch::{
    ChangeWatcher, IntervalSchedule, LifecycleState, ManualClock, StopOutcome, StopReason,
    TickOutcome, TickSchedule, WatcherLifecycle,
};

use crate::script::Command;
use crate::session::Session;

pub struct SessionDriver {
    session: Session,
    lifecycle: WatcherLifecycle,
    clock: Option<Arc<ManualClock>>,
}

impl SessionDriver {
    /// Driver whose watchers only tick on `tick` commands.
    pub fn manual(
        session: Session,
        config: &SyncConfig,
        events: Arc<dyn SyncEventSink>,
    ) -> Result<Self, ConfigError> {
        let clock = Arc::new(ManualClock::new());
        Self::build(session, config, events, clock.clone(), Some(clock))
    }

    /// Driver whose watchers poll at the configured interval.
    pub fn polling(
        session: Session,
        config: &SyncConfig,
        events: Arc<dyn SyncEventSink>,
    ) -> Result<Self, ConfigError> {
        let schedule = Arc::new(IntervalSchedule::new(config.poll_interval));
        Self::build(session, config, events, schedule, None)
    }

    fn build(
        session: Session,
        config: &SyncConfig,
        events: Arc<dyn SyncEventSink>,
        schedule: Arc<dyn TickSchedule>,
        clock: Option<Arc<ManualClock>>,
    ) -> Result<Self, ConfigError> {
        let resolver = MatchResolver::with_pattern(&config.depth_pattern)?;
        let bridge = SelectionBridge::new(session.host(), resolver, events);
        let lifecycle = WatcherLifecycle::new(
            ChangeWatcher::new(bridge),
            schedule,
            config.fault_policy,
        );
        Ok(Self {
            session,
            lifecycle,
            clock,
        })
    }

    pub fn lifecycle(&self) -> &WatcherLifecycle {
        &self.lifecycle
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run one command and return its output lines. `Quit` is left to the
    /// caller.
    pub async fn execute(&self, command: Command) -> Result<Vec<String>, String> {
        let table = &self.session.table;
        let regions = &self.session.regions;
        match command {
            Command::Row(row) => {
                let size = table.size().map_err(|err| err.to_string())?;
                if row >= size {
                    return Err(format!("row {row} out of range (table has {size} rows)"));
                }
                table.user_select(row);
            }
            Command::Region(index) => {
                let count = regions.count().map_err(|err| err.to_string())?;
                if index >= count {
                    return Err(format!(
                        "region {index} out of range ({count} regions)"
                    ));
                }
                regions.user_select(index);
            }
            Command::ClearRow => table.user_clear(),
            Command::ClearRegion => regions.user_clear(),
            Command::Start => {
                self.lifecycle.start().map_err(|err| err.to_string())?;
            }
            Command::Stop => {
                self.lifecycle.stop(StopReason::Manual);
            }
            Command::Status => return Ok(vec![self.status_line()]),
            Command::Tick(side) => return self.tick(side).await,
            Command::Quit => {}
        }
        Ok(Vec::new())
    }

    /// Stop the watchers if they are running and wait for both tasks.
    pub async fn shutdown(&self, reason: StopReason) -> StopOutcome {
        if self.lifecycle.state() == LifecycleState::Stopped {
            return StopOutcome::NotRunning;
        }
        self.lifecycle.shutdown(reason).await
    }

    pub fn status_line(&self) -> String {
        let state = match self.lifecycle.state() {
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
        };
        format!(
            "watchers: {state} (table: {}, regions: {}); row: {}; region: {}",
            self.lifecycle.task_status(Side::Table).as_str(),
            self.lifecycle.task_status(Side::Regions).as_str(),
            or_dash(self.session.table.selected_row()),
            or_dash(self.session.regions.selected_index()),
        )
    }

    async fn tick(&self, side: Option<Side>) -> Result<Vec<String>, String> {
        let Some(clock) = &self.clock else {
            return Err("tick is only available in replay".into());
        };
        let sides = match side {
            Some(side) => vec![side],
            None => Side::BOTH.to_vec(),
        };
        let mut lines = Vec::with_capacity(sides.len());
        for side in sides {
            let outcome = clock.tick(side).await;
            lines.push(format!("tick {side}: {}", describe(outcome.as_ref())));
        }
        Ok(lines)
    }
}

fn or_dash(value: Option<usize>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub fn describe(outcome: Option<&TickOutcome>) -> String {
    match outcome {
        None => "no watcher".into(),
        Some(TickOutcome::Unchanged) => "unchanged".into(),
        Some(TickOutcome::Deselected) => "deselected".into(),
        Some(TickOutcome::Dispatched(BridgeOutcome::Selected { side, index })) => match side {
            Side::Table => format!("selected row {index}"),
            Side::Regions => format!("selected region {index}"),
        },
        Some(TickOutcome::Dispatched(BridgeOutcome::Skipped)) => "skipped".into(),
        Some(TickOutcome::Aborted(err)) => format!("aborted ({err})"),
        Some(TickOutcome::Fault(err)) => format!("fault ({err})"),
    }
}

pub fn format_event(event: &SyncEvent) -> String {
    let side = event.side.map(Side::as_str).unwrap_or("-");
    format!("[{side}] {}: {}", event.kind, event.message)
}
