use thiserror::Error;

use crate::map::AreaType;

#[derive(Debug, Error)]
/// Error type for map files, change files and configuration.
pub enum NavError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("map line {line}: {reason}")]
    MalformedMap { line: usize, reason: String },

    #[error("map file declares no World area")]
    MissingWorld,

    #[error("map file declares more than one World area")]
    DuplicateWorld,

    #[error("duplicate {kind} id {id}")]
    DuplicateAreaId { kind: AreaType, id: i64 },

    #[error("unknown area type '{0}'")]
    UnknownAreaType(String),

    #[error("changes file line {line}: {reason}")]
    MalformedChanges { line: usize, reason: String },

    #[error("change times must be strictly increasing (saw {time} after {previous})")]
    NonIncreasingChangeTime { time: u64, previous: u64 },

    #[error("failed to parse config: {0}")]
    Config(#[from] serde_yaml::Error),
}

impl NavError {
    /// Process exit code a driver should use when surfacing this error:
    /// every configuration failure maps to 1.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
