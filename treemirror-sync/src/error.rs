//! Error types for treemirror-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from running a mirror or writing the log.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The mirroring program could not be started at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
