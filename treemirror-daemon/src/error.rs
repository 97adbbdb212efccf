use std::path::PathBuf;

use thiserror::Error;

use treemirror_core::ProcessInstance;

/// Error surface for the guard, the watcher and the daemon loop.
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

    #[error("sync error: {0}")]
    Sync(#[from] treemirror_sync::SyncError),

    /// Another live instance holds the lock for this target.
    #[error("another instance is already watching this target ({})", describe_holder(.holder))]
    SingletonLost {
        lock: PathBuf,
        holder: Option<ProcessInstance>,
    },

    /// The watched tree is gone or the subscription died.
    #[error("watch lost on {root}: {reason}")]
    WatchLost { root: PathBuf, reason: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

fn describe_holder(holder: &Option<ProcessInstance>) -> String {
    match holder {
        Some(instance) => format!(
            "pid {} since {}",
            instance.pid,
            instance.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => "holder unknown".to_string(),
    }
}
