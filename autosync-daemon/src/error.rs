use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, control protocol and fs subscription.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(#[from] autosync_core::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },

    #[error("another autosync instance is already watching this directory (socket: {socket})")]
    AlreadyRunning { socket: PathBuf },

    #[error("watched directory is gone: {root}")]
    WatchRootLost { root: PathBuf },

    #[error("lifecycle error: {0}")]
    Lifecycle(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
