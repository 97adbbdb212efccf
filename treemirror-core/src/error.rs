//! Error types for treemirror-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building a [`crate::WatchTarget`] from invocation arguments.
#[derive(Debug, Error)]
pub enum TargetError {
    /// The source path does not exist or is not a directory.
    #[error("'{path}' is not a directory")]
    NotADirectory { path: PathBuf },

    /// The destination specification was empty.
    #[error("destination must not be empty")]
    EmptyDestination,

    /// The log path was empty or names a directory.
    #[error("invalid log file '{path}'")]
    InvalidLogPath { path: PathBuf },

    /// Canonicalising the source failed after it was found to be a directory.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
