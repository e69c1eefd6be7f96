use thiserror::Error;

use crate::core::task::{TaskId, TaskKind};
use crate::orchestration::LaneId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Lane not found: {0}")]
    UnknownLane(LaneId),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Abort on a violated scheduler invariant.
///
/// There is no recovery path for a partially executed device or network
/// operation, so the violation is logged and the process panics with a
/// diagnostic naming the offending task.
#[cold]
#[track_caller]
pub fn fatal(kind: TaskKind, id: TaskId, msg: &str) -> ! {
    crate::elog_error!("invariant violated: {} (task {} kind {})", msg, id, kind);
    panic!("invariant violated: {} (task {} kind {})", msg, id, kind);
}

/// Abort on a violated invariant that is not tied to a single task.
#[cold]
#[track_caller]
pub fn fatal_scheduler(msg: &str) -> ! {
    crate::elog_error!("invariant violated: {}", msg);
    panic!("invariant violated: {}", msg);
}
