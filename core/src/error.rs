use std::path::PathBuf;

use thiserror::Error;

use crate::capability::MissingCapability;

pub type Result<T> = std::result::Result<T, RunpadError>;

#[derive(Debug, Error)]
pub enum RunpadError {
    #[error("blocking input is unavailable on this host: {missing}")]
    CapabilityUnavailable { missing: MissingCapability },
    #[error("input line of {len} bytes exceeds the staging capacity of {capacity} bytes")]
    PayloadOverflow { len: usize, capacity: usize },
    #[error("input must be a single line; found a line break at byte {offset}")]
    MultilineInput { offset: usize },
    #[error("no input request is pending")]
    NoPendingInput,
    #[error("a previous input line is still staged")]
    InputAlreadyStaged,
    #[error("the session owning this control block has ended")]
    SessionEnded,
    #[error("sessions must be started from within a tokio runtime")]
    NoRuntime,
    #[error("failed to spawn worker thread: {source}")]
    WorkerSpawn {
        #[source]
        source: std::io::Error,
    },
    #[error("control block of {size} bytes is smaller than the minimum of {minimum} bytes")]
    InvalidBlockSize { size: usize, minimum: usize },
    #[error("failed to read config {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl RunpadError {
    pub(crate) fn worker_spawn(source: std::io::Error) -> Self {
        Self::WorkerSpawn { source }
    }

    pub(crate) fn config_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigIo {
            path: path.into(),
            source,
        }
    }
}
