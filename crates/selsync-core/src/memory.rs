//! In-memory host collaborators.
//!
//! Used by tests and by the CLI's session fixtures. Every mutating host call
//! is recorded so tests can assert exactly what the engine did, and user-side
//! selection changes are made through separate `user_*` methods that are not
//! recorded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::HostError;
use crate::host::{ContextResolver, RegionInfo, RegionManager, ResultsTable, SourceContext};

/// A recorded host call made by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    SetTableSelection { start: usize, end: usize },
    SelectRegion { context: String, index: usize },
    ShowContext { key: String },
}

/// Shared call log for one set of in-memory collaborators.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<HostCall>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        lock(&self.calls).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }

    fn push(&self, call: HostCall) {
        lock(&self.calls).push(call);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn check_fault(fault: &Mutex<Option<HostError>>) -> Result<(), HostError> {
    match lock(fault).clone() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TableState {
    labels: Vec<Option<String>>,
    selection: Option<(usize, usize)>,
}

/// In-memory results table.
#[derive(Debug, Default)]
pub struct InMemoryTable {
    state: Mutex<TableState>,
    read_fault: Mutex<Option<HostError>>,
    log: CallLog,
}

impl InMemoryTable {
    pub fn new(labels: Vec<Option<String>>) -> Self {
        Self {
            state: Mutex::new(TableState {
                labels,
                selection: None,
            }),
            ..Self::default()
        }
    }

    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(labels.into_iter().map(|l| Some(l.to_string())).collect())
    }

    /// Record host calls into `log` instead of a private log.
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Make every selection read fail with `err` until cleared.
    pub fn set_read_fault(&self, err: Option<HostError>) {
        *lock(&self.read_fault) = err;
    }

    /// Selection change made by the user, not by the engine.
    pub fn user_select(&self, row: usize) {
        lock(&self.state).selection = Some((row, row));
    }

    pub fn user_clear(&self) {
        lock(&self.state).selection = None;
    }

    pub fn selected_row(&self) -> Option<usize> {
        lock(&self.state).selection.map(|(start, _)| start)
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.log.calls()
    }
}

impl ResultsTable for InMemoryTable {
    fn size(&self) -> Result<usize, HostError> {
        Ok(lock(&self.state).labels.len())
    }

    fn label_of(&self, row: usize) -> Result<Option<String>, HostError> {
        Ok(lock(&self.state).labels.get(row).cloned().flatten())
    }

    fn selection_range(&self) -> Result<Option<(usize, usize)>, HostError> {
        check_fault(&self.read_fault)?;
        Ok(lock(&self.state).selection)
    }

    fn set_selection(&self, start: usize, end: usize) -> Result<(), HostError> {
        self.log.push(HostCall::SetTableSelection { start, end });
        lock(&self.state).selection = Some((start, end));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RegionState {
    regions: Vec<RegionInfo>,
    selected: Vec<usize>,
    available: bool,
}

/// In-memory region manager.
#[derive(Debug)]
pub struct InMemoryRegionManager {
    state: Mutex<RegionState>,
    read_fault: Mutex<Option<HostError>>,
    log: CallLog,
}

impl InMemoryRegionManager {
    pub fn new(regions: Vec<RegionInfo>) -> Self {
        Self {
            state: Mutex::new(RegionState {
                regions,
                selected: Vec::new(),
                available: true,
            }),
            read_fault: Mutex::new(None),
            log: CallLog::new(),
        }
    }

    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// An unavailable manager answers every call with `HostError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        lock(&self.state).available = available;
    }

    pub fn set_read_fault(&self, err: Option<HostError>) {
        *lock(&self.read_fault) = err;
    }

    pub fn user_select(&self, index: usize) {
        lock(&self.state).selected = vec![index];
    }

    pub fn user_clear(&self) {
        lock(&self.state).selected.clear();
    }

    pub fn selected_index(&self) -> Option<usize> {
        lock(&self.state).selected.first().copied()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.log.calls()
    }

    fn guard(&self) -> Result<MutexGuard<'_, RegionState>, HostError> {
        let state = lock(&self.state);
        if state.available {
            Ok(state)
        } else {
            Err(HostError::unavailable("region manager"))
        }
    }
}

impl RegionManager for InMemoryRegionManager {
    fn count(&self) -> Result<usize, HostError> {
        Ok(self.guard()?.regions.len())
    }

    fn region_at(&self, index: usize) -> Result<Option<RegionInfo>, HostError> {
        Ok(self.guard()?.regions.get(index).cloned())
    }

    fn selected_indexes(&self) -> Result<Vec<usize>, HostError> {
        check_fault(&self.read_fault)?;
        Ok(self.guard()?.selected.clone())
    }

    fn select(&self, context: &dyn SourceContext, index: usize) -> Result<(), HostError> {
        let mut state = self.guard()?;
        if index >= state.regions.len() {
            return Err(HostError::failed(format!("region index {index} out of range")));
        }
        self.log.push(HostCall::SelectRegion {
            context: context.key().to_string(),
            index,
        });
        state.selected = vec![index];
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// In-memory display context; counts how often it was shown.
#[derive(Debug)]
pub struct InMemoryContext {
    key: String,
    shown: AtomicUsize,
    log: CallLog,
}

impl InMemoryContext {
    pub fn shown_count(&self) -> usize {
        self.shown.load(Ordering::Relaxed)
    }
}

impl SourceContext for InMemoryContext {
    fn key(&self) -> &str {
        &self.key
    }

    fn show(&self) -> Result<(), HostError> {
        self.shown.fetch_add(1, Ordering::Relaxed);
        self.log.push(HostCall::ShowContext {
            key: self.key.clone(),
        });
        Ok(())
    }
}

/// In-memory context resolver keyed by source key.
#[derive(Debug, Default)]
pub struct InMemoryContexts {
    contexts: HashMap<String, Arc<InMemoryContext>>,
    log: CallLog,
}

impl InMemoryContexts {
    pub fn new<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self::with_call_log(keys, CallLog::new())
    }

    pub fn with_call_log<'a>(keys: impl IntoIterator<Item = &'a str>, log: CallLog) -> Self {
        let contexts = keys
            .into_iter()
            .map(|key| {
                let ctx = InMemoryContext {
                    key: key.to_string(),
                    shown: AtomicUsize::new(0),
                    log: log.clone(),
                };
                (key.to_string(), Arc::new(ctx))
            })
            .collect();
        Self { contexts, log }
    }

    pub fn get(&self, key: &str) -> Option<Arc<InMemoryContext>> {
        self.contexts.get(key).cloned()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.log.calls()
    }
}

impl ContextResolver for InMemoryContexts {
    fn lookup(&self, source_key: &str) -> Result<Option<Arc<dyn SourceContext>>, HostError> {
        Ok(self
            .contexts
            .get(source_key)
            .map(|ctx| Arc::clone(ctx) as Arc<dyn SourceContext>))
    }
}
