use std::path::PathBuf;
use thiserror::Error;

/// Error severity levels for a shipping run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Fatal, // Stops every worker, lock released, retried on next invocation
    Setup, // Process never starts processing files
}

/// Run-level failures. Document-level bulk failures are not errors; they are
/// counted in [`crate::publish::PublishReport`].
#[derive(Debug, Error)]
pub enum ShipError {
    #[error("setup failed: {0}")]
    Setup(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index backend unreachable: {0}")]
    Transport(String),

    #[error("bulk request rejected [{status}] {error_type}: {reason}")]
    BatchRejected {
        status: u16,
        error_type: String,
        reason: String,
    },

    #[error("cannot create index {index} [{status}]: {reason}")]
    IndexCreation {
        index: String,
        status: u16,
        reason: String,
    },

    #[error("checkpoint store error: {0}")]
    CheckpointStore(String),

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}

impl ShipError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ShipError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ShipError::Setup(_) => ErrorSeverity::Setup,
            _ => ErrorSeverity::Fatal,
        }
    }

    /// Subsystem name used as the `object` field of log records
    pub fn object(&self) -> &'static str {
        match self {
            ShipError::Setup(_) => "Setup",
            ShipError::Io { .. } => "Data",
            ShipError::Serialization(_) => "Data",
            ShipError::Transport(_)
            | ShipError::BatchRejected { .. }
            | ShipError::IndexCreation { .. } => "Elastic",
            ShipError::CheckpointStore(_) => "Redis",
            ShipError::WorkerPanicked(_) => "Worker",
        }
    }
}

impl From<redis::RedisError> for ShipError {
    fn from(err: redis::RedisError) -> Self {
        ShipError::CheckpointStore(err.to_string())
    }
}

pub type ShipResult<T> = std::result::Result<T, ShipError>;
