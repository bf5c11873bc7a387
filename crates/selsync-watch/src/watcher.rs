//! Change detection for both sides.
//!
//! A tick reads one side's current selection, compares it with the last
//! observation and, on a change, records the new value before handing it to
//! the bridge. When the bridge writes the counterpart, the written index is
//! recorded as the counterpart's last observation, so the next counterpart
//! tick sees no change and nothing bounces back.

use std::sync::{Mutex, MutexGuard};

use selsync_core::bridge::{BridgeOutcome, SelectionBridge};
use selsync_core::error::{HostError, SyncError};
use selsync_core::event::{SyncEvent, SyncEventKind};
use selsync_core::host::Side;

use crate::state::{SelectionState, WatchPhase};

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Selection equal to the last observation; no side effects.
    Unchanged,
    /// Selection cleared; recorded, not dispatched.
    Deselected,
    /// New selection dispatched to the bridge.
    Dispatched(BridgeOutcome),
    /// New selection recorded but the dispatch failed; the task keeps polling.
    Aborted(SyncError),
    /// The task must stop.
    Fault(SyncError),
}

impl TickOutcome {
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    /// Whether the tick handed a selection to the bridge.
    pub fn dispatched(&self) -> bool {
        matches!(self, Self::Dispatched(_) | Self::Aborted(_))
    }
}

/// Polls both sides and dispatches changes through a [`SelectionBridge`].
pub struct ChangeWatcher {
    bridge: SelectionBridge,
    state: Mutex<SelectionState>,
}

impl ChangeWatcher {
    pub fn new(bridge: SelectionBridge) -> Self {
        Self {
            bridge,
            state: Mutex::new(SelectionState::default()),
        }
    }

    pub fn bridge(&self) -> &SelectionBridge {
        &self.bridge
    }

    pub fn phase(&self, side: Side) -> WatchPhase {
        self.lock_state().phase(side)
    }

    /// Forget all observations.
    pub fn reset(&self) {
        self.lock_state().reset();
    }

    /// Run one tick for `side`.
    ///
    /// Holds the state lock for the whole tick, so the two sides never
    /// interleave between a counterpart write and its echo record. The two
    /// polling tasks are therefore not independent: a tick on one side waits
    /// for an in-flight tick on the other side to finish.
    pub fn tick(&self, side: Side) -> TickOutcome {
        let mut state = self.lock_state();

        let current = match self.bridge.host().current_selection(side) {
            Ok(current) => current,
            // A closed collaborator is not a fault; it may come back.
            Err(HostError::Unavailable { component }) => {
                tracing::trace!(%side, component = %component, "selection source unavailable");
                return TickOutcome::Unchanged;
            }
            Err(err) => return self.fault(side, SyncError::from(err)),
        };

        if current == state.phase(side).last_seen() {
            return TickOutcome::Unchanged;
        }
        state.record(side, current);

        let Some(index) = current else {
            tracing::debug!(%side, "selection cleared");
            return TickOutcome::Deselected;
        };

        match self.bridge.apply(side, index) {
            Ok(outcome) => {
                if let BridgeOutcome::Selected {
                    side: counterpart,
                    index: written,
                } = outcome
                {
                    state.record(counterpart, Some(written));
                }
                TickOutcome::Dispatched(outcome)
            }
            Err(err) if err.is_task_fault() => self.fault(side, err),
            Err(err) => {
                self.bridge.events().record(SyncEvent::from_error(side, &err));
                TickOutcome::Aborted(err)
            }
        }
    }

    fn fault(&self, side: Side, err: SyncError) -> TickOutcome {
        self.bridge.events().record(SyncEvent::new(
            Some(side),
            SyncEventKind::TaskFault,
            format!("{side} watcher error: {err}"),
        ));
        TickOutcome::Fault(err)
    }

    fn lock_state(&self) -> MutexGuard<'_, SelectionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use selsync_core::config::DEFAULT_DEPTH_PATTERN;
    use selsync_core::event::InMemoryEventSink;
    use selsync_core::host::{RegionInfo, SyncHost};
    use selsync_core::memory::{InMemoryContexts, InMemoryRegionManager, InMemoryTable};
    use selsync_core::resolve::MatchResolver;

    use super::*;

    struct Fixture {
        table: Arc<InMemoryTable>,
        regions: Arc<InMemoryRegionManager>,
        events: Arc<InMemoryEventSink>,
        watcher: ChangeWatcher,
    }

    fn fixture() -> Fixture {
        let table = Arc::new(InMemoryTable::from_labels([
            "imgA:cell1:z:3",
            "imgA:cell1:z:5",
            "imgA:cell2",
        ]));
        let regions = Arc::new(InMemoryRegionManager::new(vec![
            RegionInfo::new("cell1", 3),
            RegionInfo::new("cell1", 5),
            RegionInfo::new("cell2", 9),
        ]));
        let contexts = Arc::new(InMemoryContexts::new(["imgA"]));
        let events = Arc::new(InMemoryEventSink::new());
        let bridge = SelectionBridge::new(
            SyncHost::new(table.clone(), regions.clone(), contexts),
            MatchResolver::with_pattern(DEFAULT_DEPTH_PATTERN).unwrap(),
            events.clone(),
        );
        Fixture {
            table,
            regions,
            events,
            watcher: ChangeWatcher::new(bridge),
        }
    }

    #[test]
    fn nothing_selected_is_unchanged_from_idle() {
        let fx = fixture();
        assert_eq!(fx.watcher.tick(Side::Table), TickOutcome::Unchanged);
        assert_eq!(fx.watcher.phase(Side::Table), WatchPhase::Idle);
    }

    #[test]
    fn new_selection_is_recorded_then_dispatched() {
        let fx = fixture();
        fx.regions.user_select(1);
        let outcome = fx.watcher.tick(Side::Regions);
        assert_eq!(
            outcome,
            TickOutcome::Dispatched(BridgeOutcome::Selected {
                side: Side::Table,
                index: 1
            })
        );
        assert_eq!(fx.watcher.phase(Side::Regions).last_seen(), Some(1));
        assert_eq!(fx.table.selected_row(), Some(1));
    }

    #[test]
    fn repeated_tick_has_no_side_effects() {
        let fx = fixture();
        fx.table.user_select(2);
        assert!(fx.watcher.tick(Side::Table).dispatched());
        let calls = fx.regions.calls().len();

        assert_eq!(fx.watcher.tick(Side::Table), TickOutcome::Unchanged);
        assert_eq!(fx.regions.calls().len(), calls);
        assert_eq!(fx.events.count(), 0);
    }

    #[test]
    fn counterpart_write_is_not_seen_as_a_change() {
        let fx = fixture();
        fx.regions.user_select(1);
        fx.watcher.tick(Side::Regions);
        assert_eq!(fx.watcher.tick(Side::Table), TickOutcome::Unchanged);
        assert_eq!(fx.watcher.tick(Side::Regions), TickOutcome::Unchanged);
        assert!(fx.regions.calls().is_empty());
    }

    #[test]
    fn deselection_is_recorded_without_dispatch() {
        let fx = fixture();
        fx.table.user_select(0);
        fx.watcher.tick(Side::Table);
        fx.table.user_clear();
        assert_eq!(fx.watcher.tick(Side::Table), TickOutcome::Deselected);
        assert_eq!(
            fx.watcher.phase(Side::Table),
            WatchPhase::Armed { last_seen: None }
        );
        // Reselecting the same row after a deselection dispatches again.
        fx.table.user_select(0);
        assert!(fx.watcher.tick(Side::Table).dispatched());
    }

    #[test]
    fn failed_dispatch_is_logged_and_keeps_polling() {
        let fx = fixture();
        let table = Arc::new(InMemoryTable::from_labels(["broken"]));
        let bridge = SelectionBridge::new(
            SyncHost::new(
                table.clone(),
                fx.regions.clone(),
                Arc::new(InMemoryContexts::new(["imgA"])),
            ),
            MatchResolver::with_pattern(DEFAULT_DEPTH_PATTERN).unwrap(),
            fx.events.clone(),
        );
        let watcher = ChangeWatcher::new(bridge);
        table.user_select(0);

        let outcome = watcher.tick(Side::Table);
        assert!(matches!(outcome, TickOutcome::Aborted(SyncError::Parse { .. })));
        assert!(!outcome.is_fault());
        assert_eq!(watcher.phase(Side::Table).last_seen(), Some(0));
        assert_eq!(fx.events.kinds(), vec![SyncEventKind::InvalidLabel]);
    }

    #[test]
    fn read_failure_is_a_fault() {
        let fx = fixture();
        fx.table.set_read_fault(Some(HostError::failed("panel disposed")));
        let outcome = fx.watcher.tick(Side::Table);
        assert!(outcome.is_fault());
        let events = fx.events.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, SyncEventKind::TaskFault);
        assert_eq!(
            events[0].message,
            "table watcher error: task fault: panel disposed"
        );
    }

    #[test]
    fn unavailable_source_skips_the_tick() {
        let fx = fixture();
        fx.regions.user_select(0);
        fx.regions.set_available(false);
        assert_eq!(fx.watcher.tick(Side::Regions), TickOutcome::Unchanged);
        assert_eq!(fx.watcher.phase(Side::Regions), WatchPhase::Idle);
        assert_eq!(fx.events.count(), 0);
    }

    #[test]
    fn reset_returns_both_sides_to_idle() {
        let fx = fixture();
        fx.regions.user_select(0);
        fx.watcher.tick(Side::Regions);
        fx.watcher.reset();
        for side in Side::BOTH {
            assert_eq!(fx.watcher.phase(side), WatchPhase::Idle);
        }
    }
}
