use std::{fmt, io, path::PathBuf};

use machine_learning::MlErr;
use shards::ShardErr;

/// The result type used in the entire orchestrator.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// All errors that can occur in the orchestrator.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before any shard is read.
    InvalidConfig(String),
    /// The raw shard pattern matched nothing.
    NoShards { pattern: String },
    /// Reading, caching or batching shards failed.
    Shard(ShardErr),
    /// The model rejected its inputs or parameters.
    Ml(MlErr),
    /// A batch source ended before the epoch got all of its steps.
    SourceExhausted {
        source: &'static str,
        epoch: usize,
        step: usize,
    },
    /// Writing or reading a checkpoint failed.
    Checkpoint { path: PathBuf, reason: String },
    /// The logger could not be installed.
    Logger(String),
    /// A malformed configuration file.
    Json(serde_json::Error),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::NoShards { pattern } => write!(f, "no shards match {pattern}"),
            Self::Shard(e) => write!(f, "shard error: {e}"),
            Self::Ml(e) => write!(f, "model error: {e}"),
            Self::SourceExhausted {
                source,
                epoch,
                step,
            } => write!(
                f,
                "the {source} batch source ended at epoch {epoch}, step {step}"
            ),
            Self::Checkpoint { path, reason } => {
                write!(f, "checkpoint {}: {reason}", path.display())
            }
            Self::Logger(msg) => write!(f, "logger error: {msg}"),
            Self::Json(e) => write!(f, "json error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Shard(e) => Some(e),
            Self::Ml(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for OrchestratorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ShardErr> for OrchestratorError {
    fn from(e: ShardErr) -> Self {
        Self::Shard(e)
    }
}

impl From<MlErr> for OrchestratorError {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}
