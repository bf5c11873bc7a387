//! Host collaborator interfaces.
//!
//! The engine never talks to a display toolkit directly. A host provides the
//! results table, the region manager and the context resolver through these
//! traits; `crate::memory` has in-process implementations.

use std::sync::Arc;

use crate::error::HostError;

/// One of the two synchronized collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Table,
    Regions,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Table, Side::Regions];

    pub fn counterpart(self) -> Self {
        match self {
            Self::Table => Self::Regions,
            Self::Regions => Self::Table,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Regions => "regions",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name and depth position of one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    pub name: String,
    pub depth: i64,
}

impl RegionInfo {
    pub fn new(name: impl Into<String>, depth: i64) -> Self {
        Self {
            name: name.into(),
            depth,
        }
    }
}

/// The tabular result list. Rows carry compound labels.
pub trait ResultsTable: Send + Sync {
    fn size(&self) -> Result<usize, HostError>;

    /// Label of `row`, `None` when the row has no label or is out of range.
    fn label_of(&self, row: usize) -> Result<Option<String>, HostError>;

    /// Inclusive selected row range, `None` when nothing is selected.
    fn selection_range(&self) -> Result<Option<(usize, usize)>, HostError>;

    fn set_selection(&self, start: usize, end: usize) -> Result<(), HostError>;
}

/// A display context that owns regions (an open image, a dataset view).
pub trait SourceContext: Send + Sync {
    fn key(&self) -> &str;

    /// Bring the context to the front. Side effect on the host display.
    fn show(&self) -> Result<(), HostError>;
}

/// The named-region list.
pub trait RegionManager: Send + Sync {
    fn count(&self) -> Result<usize, HostError>;

    fn region_at(&self, index: usize) -> Result<Option<RegionInfo>, HostError>;

    /// Selected region indexes in ascending order.
    fn selected_indexes(&self) -> Result<Vec<usize>, HostError>;

    fn select(&self, context: &dyn SourceContext, index: usize) -> Result<(), HostError>;
}

/// Resolves a label's source key to a live context.
pub trait ContextResolver: Send + Sync {
    fn lookup(&self, source_key: &str) -> Result<Option<Arc<dyn SourceContext>>, HostError>;
}

/// The set of collaborators one synchronization session works against.
#[derive(Clone)]
pub struct SyncHost {
    pub table: Arc<dyn ResultsTable>,
    pub regions: Arc<dyn RegionManager>,
    pub contexts: Arc<dyn ContextResolver>,
}

impl SyncHost {
    pub fn new(
        table: Arc<dyn ResultsTable>,
        regions: Arc<dyn RegionManager>,
        contexts: Arc<dyn ContextResolver>,
    ) -> Self {
        Self {
            table,
            regions,
            contexts,
        }
    }

    /// Currently selected index on `side`: the start of the table range or
    /// the first selected region.
    pub fn current_selection(&self, side: Side) -> Result<Option<usize>, HostError> {
        match side {
            Side::Table => Ok(self.table.selection_range()?.map(|(start, _)| start)),
            Side::Regions => Ok(self.regions.selected_indexes()?.first().copied()),
        }
    }
}
