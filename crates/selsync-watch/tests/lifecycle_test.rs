#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use selsync_core::bridge::{BridgeOutcome, SelectionBridge};
use selsync_core::config::{FaultPolicy, DEFAULT_DEPTH_PATTERN};
use selsync_core::error::HostError;
use selsync_core::event::{InMemoryEventSink, SyncEventKind};
use selsync_core::host::{RegionInfo, Side, SyncHost};
use selsync_core::memory::{InMemoryContexts, InMemoryRegionManager, InMemoryTable};
use selsync_core::resolve::MatchResolver;
use selsync_watch::{
    ChangeWatcher, IntervalSchedule, LifecycleState, ManualClock, StartOutcome, StopOutcome,
    StopReason, TaskStatus, TickOutcome, TickSchedule, WatcherLifecycle,
};

struct Harness {
    table: Arc<InMemoryTable>,
    regions: Arc<InMemoryRegionManager>,
    events: Arc<InMemoryEventSink>,
    lifecycle: WatcherLifecycle,
}

fn harness(schedule: Arc<dyn TickSchedule>, policy: FaultPolicy) -> Harness {
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
    let events = Arc::new(InMemoryEventSink::new());
    let bridge = SelectionBridge::new(
        SyncHost::new(
            table.clone(),
            regions.clone(),
            Arc::new(InMemoryContexts::new(["imgA"])),
        ),
        MatchResolver::with_pattern(DEFAULT_DEPTH_PATTERN).unwrap(),
        events.clone(),
    );
    Harness {
        table,
        regions,
        events,
        lifecycle: WatcherLifecycle::new(ChangeWatcher::new(bridge), schedule, policy),
    }
}

fn manual(policy: FaultPolicy) -> (Harness, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    (harness(clock.clone(), policy), clock)
}

#[tokio::test]
async fn start_twice_keeps_a_single_pair_of_tasks() {
    let (h, clock) = manual(FaultPolicy::Isolate);
    assert_eq!(h.lifecycle.start().unwrap(), StartOutcome::Started);
    h.regions.user_select(1);
    clock.tick(Side::Regions).await.unwrap();

    assert_eq!(h.lifecycle.start().unwrap(), StartOutcome::AlreadyRunning);
    assert_eq!(
        h.events.kinds(),
        vec![
            SyncEventKind::WatcherStarted,
            SyncEventKind::WatcherStarted,
            SyncEventKind::AlreadyRunning,
        ]
    );
    // The running pair kept its state: no reset, no second dispatch.
    assert_eq!(clock.tick(Side::Regions).await, Some(TickOutcome::Unchanged));
    assert_eq!(h.table.calls().len(), 1);
}

#[tokio::test]
async fn stop_ends_both_tasks_and_stopping_again_only_logs() {
    let (h, clock) = manual(FaultPolicy::Isolate);
    h.lifecycle.start().unwrap();
    let token = h.lifecycle.cancellation_token().unwrap();
    h.events.clear();

    assert_eq!(h.lifecycle.stop(StopReason::Manual), StopOutcome::Stopped);
    assert!(token.is_cancelled());
    assert_eq!(h.lifecycle.state(), LifecycleState::Stopped);

    h.regions.user_select(0);
    assert_eq!(clock.tick(Side::Regions).await, None);
    assert_eq!(clock.tick(Side::Table).await, None);
    assert!(h.table.calls().is_empty());

    assert_eq!(h.lifecycle.stop(StopReason::Manual), StopOutcome::NotRunning);
    let events = h.events.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].message, "Watchers manually stopped.");
    assert_eq!(events[1].kind, SyncEventKind::StopFailed);
    assert_eq!(events[1].message, "Failed to stop watchers: none running.");
}

#[tokio::test]
async fn signal_stop_is_logged_with_its_reason() {
    let (h, _clock) = manual(FaultPolicy::Isolate);
    h.lifecycle.start().unwrap();
    h.events.clear();
    assert_eq!(
        h.lifecycle.shutdown(StopReason::Signal).await,
        StopOutcome::Stopped
    );
    let events = h.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SyncEventKind::WatchersStopped);
    assert_eq!(events[0].message, "Watchers stopped by cancel signal.");
    for side in Side::BOTH {
        assert_eq!(h.lifecycle.task_status(side), TaskStatus::Stopped);
    }
}

#[tokio::test]
async fn restart_forgets_previous_observations() {
    let (h, clock) = manual(FaultPolicy::Isolate);
    h.lifecycle.start().unwrap();
    h.regions.user_select(1);
    clock.tick(Side::Regions).await.unwrap();
    h.lifecycle.stop(StopReason::Manual);

    h.lifecycle.start().unwrap();
    let outcome = clock.tick(Side::Regions).await.unwrap();
    assert_eq!(
        outcome,
        TickOutcome::Dispatched(BridgeOutcome::Selected {
            side: Side::Table,
            index: 1
        })
    );
    assert_eq!(h.table.calls().len(), 2);
}

#[tokio::test]
async fn isolated_fault_ends_only_the_faulted_task() {
    let (h, clock) = manual(FaultPolicy::Isolate);
    h.lifecycle.start().unwrap();
    h.events.clear();
    h.table.set_read_fault(Some(HostError::failed("table disposed")));

    let outcome = clock.tick(Side::Table).await.unwrap();
    assert!(outcome.is_fault());
    assert_eq!(h.lifecycle.task_status(Side::Table), TaskStatus::Faulted);
    assert_eq!(h.lifecycle.task_status(Side::Regions), TaskStatus::Running);
    assert_eq!(h.lifecycle.state(), LifecycleState::Running);
    assert_eq!(h.events.kinds(), vec![SyncEventKind::TaskFault]);

    // The dead task never ticks again; the other side keeps synchronizing.
    assert_eq!(clock.tick(Side::Table).await, None);
    h.regions.user_select(2);
    assert!(clock.tick(Side::Regions).await.unwrap().dispatched());
    assert_eq!(h.table.selected_row(), Some(2));

    // Start while one task is dead is still a no-op.
    assert_eq!(h.lifecycle.start().unwrap(), StartOutcome::AlreadyRunning);
}

#[tokio::test]
async fn stop_all_fault_cancels_both_tasks() {
    let (h, clock) = manual(FaultPolicy::StopAll);
    h.lifecycle.start().unwrap();
    h.events.clear();
    h.regions.set_read_fault(Some(HostError::failed("manager crashed")));

    assert!(clock.tick(Side::Regions).await.unwrap().is_fault());
    assert_eq!(h.lifecycle.state(), LifecycleState::Stopped);
    assert_eq!(clock.tick(Side::Table).await, None);
    assert_eq!(h.lifecycle.task_status(Side::Regions), TaskStatus::Faulted);
    assert_eq!(h.lifecycle.task_status(Side::Table), TaskStatus::Stopped);
    assert_eq!(
        h.events.kinds(),
        vec![SyncEventKind::TaskFault, SyncEventKind::WatchersStopped]
    );

    assert_eq!(h.lifecycle.stop(StopReason::Manual), StopOutcome::NotRunning);
    assert_eq!(h.lifecycle.start().unwrap(), StartOutcome::Started);
}

#[tokio::test(start_paused = true)]
async fn interval_schedule_polls_without_manual_ticks() {
    let h = harness(
        Arc::new(IntervalSchedule::new(Duration::from_millis(200))),
        FaultPolicy::Isolate,
    );
    h.lifecycle.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.regions.user_select(1);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.table.selected_row(), Some(1));

    h.table.user_select(2);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.regions.selected_index(), Some(2));

    h.lifecycle.shutdown(StopReason::Manual).await;
}
