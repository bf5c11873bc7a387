//! Counterpart lookup in both directions.
//!
//! Region → entry tolerates missing depth encoding through a fallback tier;
//! entry → region trusts the label and takes the first exact name match.

use regex::Regex;

use crate::error::{ConfigError, SyncError};
use crate::event::{SyncEvent, SyncEventSink};
use crate::host::{RegionInfo, RegionManager, ResultsTable, Side};
use crate::label::DecodedLabel;

/// Pulls a depth index out of a label's depth suffix.
#[derive(Debug, Clone)]
pub struct DepthExtractor {
    pattern: Regex,
}

impl DepthExtractor {
    /// `pattern` must compile and have at least one capture group; group 1
    /// holds the integer.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let compiled = Regex::new(pattern).map_err(|err| ConfigError::DepthPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })?;
        if compiled.captures_len() < 2 {
            return Err(ConfigError::DepthPattern {
                pattern: pattern.to_string(),
                reason: "pattern needs a capture group for the depth".into(),
            });
        }
        Ok(Self { pattern: compiled })
    }

    /// Depth encoded in `suffix`. The pattern is searched first; when it does
    /// not occur, the whole trimmed suffix is read as an integer.
    pub fn extract(&self, suffix: &str) -> Option<i64> {
        match self.pattern.captures(suffix) {
            Some(caps) => caps.get(1)?.as_str().parse().ok(),
            None => suffix.trim().parse().ok(),
        }
    }
}

/// Table row chosen for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMatch {
    /// Row whose label encodes the region's depth.
    Exact(usize),
    /// Row matched by name only; its label has no depth suffix.
    Fallback(usize),
}

impl EntryMatch {
    pub fn row(self) -> usize {
        match self {
            Self::Exact(row) | Self::Fallback(row) => row,
        }
    }
}

/// Finds counterparts between table rows and regions.
#[derive(Debug, Clone)]
pub struct MatchResolver {
    depth: DepthExtractor,
}

impl MatchResolver {
    pub fn new(depth: DepthExtractor) -> Self {
        Self { depth }
    }

    /// Resolver using the given depth pattern.
    pub fn with_pattern(pattern: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(DepthExtractor::new(pattern)?))
    }

    /// Best table row for `region`.
    ///
    /// The first row whose depth equals the region's depth wins outright;
    /// otherwise the last same-named row without a depth suffix is used.
    /// Unreadable labels are reported to `events` and skipped.
    pub fn entry_for_region(
        &self,
        table: &dyn ResultsTable,
        region: &RegionInfo,
        events: &dyn SyncEventSink,
    ) -> Result<EntryMatch, SyncError> {
        let target = region.name.trim();
        let mut fallback = None;

        for row in 0..table.size()? {
            let raw = table.label_of(row)?;
            let label = match DecodedLabel::decode(raw.as_deref()) {
                Some(label) if label.is_complete() => label,
                _ => {
                    let err = SyncError::Parse { row, label: raw };
                    events.record(SyncEvent::from_error(Side::Regions, &err));
                    continue;
                }
            };
            if label.region_name.trim() != target {
                continue;
            }
            match label.nonempty_suffix() {
                Some(suffix) => {
                    if self.depth.extract(suffix) == Some(region.depth) {
                        return Ok(EntryMatch::Exact(row));
                    }
                }
                None => fallback = Some(row),
            }
        }

        fallback.map(EntryMatch::Fallback).ok_or_else(|| {
            SyncError::miss(format!(
                "No results table entry found for region name: '{target}'"
            ))
        })
    }

    /// First region named exactly `label.region_name`.
    pub fn region_for_entry(
        &self,
        regions: &dyn RegionManager,
        label: &DecodedLabel,
    ) -> Result<usize, SyncError> {
        for index in 0..regions.count()? {
            if let Some(region) = regions.region_at(index)? {
                if region.name == label.region_name {
                    return Ok(index);
                }
            }
        }
        Err(SyncError::miss(format!(
            "Region '{}' not found in source '{}'.",
            label.region_name, label.source_key
        )))
    }
}
