//! Error taxonomy for selection synchronization.
//!
//! Every variant except [`SyncError::TaskFault`] aborts only the current
//! dispatch; a task fault ends the polling task that hit it.

/// Failure reported by a host collaborator (table, region manager, context resolver).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The collaborator is not available right now (window closed, manager not open).
    #[error("{component} not available")]
    Unavailable { component: String },

    /// The collaborator failed unexpectedly.
    #[error("{message}")]
    Failed { message: String },
}

impl HostError {
    pub fn unavailable(component: impl Into<String>) -> Self {
        Self::Unavailable {
            component: component.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Error raised while synchronizing one selection change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Label missing or malformed.
    #[error("invalid or missing label at row {row}: {label:?}")]
    Parse { row: usize, label: Option<String> },

    /// A context, collaborator or source record could not be found.
    #[error("{message}")]
    Lookup { message: String },

    /// Scan completed without a counterpart.
    #[error("{message}")]
    ResolutionMiss { message: String },

    /// Unexpected failure inside a tick.
    #[error("task fault: {message}")]
    TaskFault { message: String },
}

impl SyncError {
    pub fn lookup(message: impl Into<String>) -> Self {
        Self::Lookup {
            message: message.into(),
        }
    }

    pub fn miss(message: impl Into<String>) -> Self {
        Self::ResolutionMiss {
            message: message.into(),
        }
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self::TaskFault {
            message: message.into(),
        }
    }

    /// Whether this error must terminate the polling task that raised it.
    pub fn is_task_fault(&self) -> bool {
        matches!(self, Self::TaskFault { .. })
    }
}

impl From<HostError> for SyncError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Unavailable { component } => Self::Lookup {
                message: format!("{component} not found"),
            },
            HostError::Failed { message } => Self::TaskFault { message },
        }
    }
}

/// Configuration loading or validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{0}")]
    Invalid(String),

    #[error("render config: {0}")]
    Render(#[source] serde_yaml::Error),

    #[error("invalid depth pattern {pattern:?}: {reason}")]
    DepthPattern { pattern: String, reason: String },
}
