//! YAML session fixtures: an in-memory table, region list and set of source
//! contexts to run the watchers against.
//!
//! ```yaml
//! contexts: [imgA]
//! entries:
//!   - "imgA:cell1:z:3"
//!   - null
//! regions:
//!   - { name: cell1, depth: 3 }
//! ```

use std::path::Path;
use std::sync::Arc;

use selsync_core::host::{RegionInfo, SyncHost};
use selsync_core::memory::{CallLog, InMemoryContexts, InMemoryRegionManager, InMemoryTable};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to read session file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse session file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("session file {path}: {message}")]
    Invalid { path: String, message: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionFile {
    #[serde(default)]
    contexts: Vec<String>,
    #[serde(default)]
    entries: Vec<Option<String>>,
    #[serde(default)]
    regions: Vec<RegionSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegionSpec {
    name: String,
    depth: i64,
}

/// In-memory collaborators built from a session file.
pub struct Session {
    pub table: Arc<InMemoryTable>,
    pub regions: Arc<InMemoryRegionManager>,
    pub contexts: Arc<InMemoryContexts>,
    /// Every host call the engine makes, in order.
    pub log: CallLog,
}

impl Session {
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let origin = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| SessionError::Read {
            path: origin.clone(),
            source,
        })?;
        Self::from_yaml(&raw, &origin)
    }

    pub fn from_yaml(raw: &str, origin: &str) -> Result<Self, SessionError> {
        let file: SessionFile = serde_yaml::from_str(raw).map_err(|source| SessionError::Parse {
            path: origin.to_string(),
            source,
        })?;
        if file.contexts.iter().any(|key| key.is_empty()) {
            return Err(SessionError::Invalid {
                path: origin.to_string(),
                message: "context keys must not be empty".into(),
            });
        }

        let log = CallLog::new();
        let regions = file
            .regions
            .into_iter()
            .map(|spec| RegionInfo::new(spec.name, spec.depth))
            .collect();
        Ok(Self {
            table: Arc::new(InMemoryTable::new(file.entries).with_call_log(log.clone())),
            regions: Arc::new(InMemoryRegionManager::new(regions).with_call_log(log.clone())),
            contexts: Arc::new(InMemoryContexts::with_call_log(
                file.contexts.iter().map(String::as_str),
                log.clone(),
            )),
            log,
        })
    }

    pub fn host(&self) -> SyncHost {
        SyncHost::new(
            self.table.clone(),
            self.regions.clone(),
            self.contexts.clone(),
        )
    }
}
