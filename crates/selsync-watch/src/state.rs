use selsync_core::host::Side;

/// Polling phase of one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchPhase {
    /// Nothing observed since start or reset.
    #[default]
    Idle,
    /// Last observed selection; `None` records a deselection.
    Armed { last_seen: Option<usize> },
}

impl WatchPhase {
    pub fn last_seen(self) -> Option<usize> {
        match self {
            Self::Idle => None,
            Self::Armed { last_seen } => last_seen,
        }
    }
}

/// Last-seen selection for both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    table: WatchPhase,
    regions: WatchPhase,
}

impl SelectionState {
    pub fn phase(&self, side: Side) -> WatchPhase {
        match side {
            Side::Table => self.table,
            Side::Regions => self.regions,
        }
    }

    pub fn record(&mut self, side: Side, selected: Option<usize>) {
        let phase = WatchPhase::Armed {
            last_seen: selected,
        };
        match side {
            Side::Table => self.table = phase,
            Side::Regions => self.regions = phase,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
