//! Log events for the user-facing sync log.
//!
//! Every line the engine wants a user to see (watchers started, label could
//! not be parsed, no match found) is recorded as a [`SyncEvent`] into a
//! [`SyncEventSink`]. Sinks never fail.

use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::host::Side;

/// What an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncEventKind {
    WatcherStarted,
    AlreadyRunning,
    WatchersStopped,
    StopFailed,
    InvalidLabel,
    LookupFailed,
    NoMatch,
    TaskFault,
}

impl SyncEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WatcherStarted => "watcher_started",
            Self::AlreadyRunning => "already_running",
            Self::WatchersStopped => "watchers_stopped",
            Self::StopFailed => "stop_failed",
            Self::InvalidLabel => "invalid_label",
            Self::LookupFailed => "lookup_failed",
            Self::NoMatch => "no_match",
            Self::TaskFault => "task_fault",
        }
    }

    pub fn level(self) -> tracing::Level {
        match self {
            Self::WatcherStarted | Self::WatchersStopped | Self::AlreadyRunning => {
                tracing::Level::INFO
            }
            Self::InvalidLabel | Self::LookupFailed | Self::NoMatch | Self::StopFailed => {
                tracing::Level::WARN
            }
            Self::TaskFault => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for SyncEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log line.
#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub timestamp: DateTime<Utc>,
    pub side: Option<Side>,
    pub kind: SyncEventKind,
    pub message: String,
}

impl SyncEvent {
    pub fn new(side: Option<Side>, kind: SyncEventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            side,
            kind,
            message: message.into(),
        }
    }

    /// Event for a dispatch that failed on `side`.
    pub fn from_error(side: Side, err: &SyncError) -> Self {
        let kind = match err {
            SyncError::Parse { .. } => SyncEventKind::InvalidLabel,
            SyncError::Lookup { .. } => SyncEventKind::LookupFailed,
            SyncError::ResolutionMiss { .. } => SyncEventKind::NoMatch,
            SyncError::TaskFault { .. } => SyncEventKind::TaskFault,
        };
        Self::new(Some(side), kind, err.to_string())
    }
}

/// Receiver of log events.
pub trait SyncEventSink: Send + Sync {
    fn record(&self, event: SyncEvent);
}

/// In-memory event sink for testing.
#[derive(Default)]
pub struct InMemoryEventSink {
    events: std::sync::Mutex<Vec<SyncEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn kinds(&self) -> Vec<SyncEventKind> {
        self.events().into_iter().map(|event| event.kind).collect()
    }

    pub fn clear(&self) {
        match self.events.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl SyncEventSink for InMemoryEventSink {
    fn record(&self, event: SyncEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Forwards events to `tracing`.
pub struct TracingEventSink;

impl SyncEventSink for TracingEventSink {
    fn record(&self, event: SyncEvent) {
        let side = event.side.map(Side::as_str).unwrap_or("-");
        let kind = event.kind.as_str();
        match event.kind.level() {
            tracing::Level::ERROR => tracing::error!(side, kind, "{}", event.message),
            tracing::Level::WARN => tracing::warn!(side, kind, "{}", event.message),
            _ => tracing::info!(side, kind, "{}", event.message),
        }
    }
}
