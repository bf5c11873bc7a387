//! The two one-directional synchronization rules.

use std::sync::Arc;

use crate::error::SyncError;
use crate::event::SyncEventSink;
use crate::host::{Side, SyncHost};
use crate::label::DecodedLabel;
use crate::resolve::MatchResolver;

/// Result of applying a selection to the counterpart collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// The counterpart on `side` now has `index` selected.
    Selected { side: Side, index: usize },
    /// Nothing to synchronize (source index out of range or no longer present).
    Skipped,
}

/// Drives the counterpart's selection from a newly observed source selection.
#[derive(Clone)]
pub struct SelectionBridge {
    host: SyncHost,
    resolver: MatchResolver,
    events: Arc<dyn SyncEventSink>,
}

impl SelectionBridge {
    pub fn new(host: SyncHost, resolver: MatchResolver, events: Arc<dyn SyncEventSink>) -> Self {
        Self {
            host,
            resolver,
            events,
        }
    }

    pub fn host(&self) -> &SyncHost {
        &self.host
    }

    pub fn events(&self) -> &Arc<dyn SyncEventSink> {
        &self.events
    }

    /// Dispatch a selection observed on `side`.
    pub fn apply(&self, side: Side, index: usize) -> Result<BridgeOutcome, SyncError> {
        match side {
            Side::Table => self.apply_from_entry(index),
            Side::Regions => self.apply_from_region(index),
        }
    }

    /// Table row `row` was selected: select the region its label names.
    pub fn apply_from_entry(&self, row: usize) -> Result<BridgeOutcome, SyncError> {
        let raw = self.host.table.label_of(row)?;
        let label = match DecodedLabel::decode(raw.as_deref()) {
            Some(label) if label.is_complete() => label,
            _ => return Err(SyncError::Parse { row, label: raw }),
        };

        let context = self.host.contexts.lookup(&label.source_key)?.ok_or_else(|| {
            SyncError::lookup(format!(
                "Source window not found for key: {}",
                label.source_key
            ))
        })?;
        context.show()?;

        let index = self.resolver.region_for_entry(self.host.regions.as_ref(), &label)?;
        self.host.regions.select(context.as_ref(), index)?;
        tracing::debug!(row, index, label = %label, "table selection synchronized to region");
        Ok(BridgeOutcome::Selected {
            side: Side::Regions,
            index,
        })
    }

    /// Region `index` was selected: select the table row that best matches it.
    pub fn apply_from_region(&self, index: usize) -> Result<BridgeOutcome, SyncError> {
        if index >= self.host.regions.count()? {
            return Ok(BridgeOutcome::Skipped);
        }
        let Some(region) = self.host.regions.region_at(index)? else {
            return Ok(BridgeOutcome::Skipped);
        };

        let found = self.resolver.entry_for_region(
            self.host.table.as_ref(),
            &region,
            self.events.as_ref(),
        )?;
        let row = found.row();
        self.host.table.set_selection(row, row)?;
        tracing::debug!(index, row, ?found, "region selection synchronized to table");
        Ok(BridgeOutcome::Selected {
            side: Side::Table,
            index: row,
        })
    }
}
