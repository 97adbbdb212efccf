//! Domain types for a single watch-and-mirror instance.
//!
//! All path fields use `PathBuf`; the destination stays a `String` because it
//! is an rsync target spec (`host:path`), not necessarily a local path.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TargetError;

/// Program identity used in every [`InvocationSignature`].
pub const PROGRAM_NAME: &str = "treemirror";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A remote (or local) rsync destination, e.g. `glider@shore:/data/sg180`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination(pub String);

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Destination {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Destination {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Mirror options
// ---------------------------------------------------------------------------

/// Per-target knobs passed through to the mirroring tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorOptions {
    /// Program to execute.
    pub rsync: PathBuf,
    /// Remove destination files that no longer exist at the source.
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub delay_updates: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chmod: Option<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            rsync: PathBuf::from("rsync"),
            delete: false,
            delay_updates: false,
            chmod: None,
            excludes: Vec::new(),
            extra_args: Vec::new(),
            dry_run: false,
        }
    }
}

// ---------------------------------------------------------------------------
// WatchTarget
// ---------------------------------------------------------------------------

/// The immutable (source, destination, log) binding of one daemon instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchTarget {
    /// Canonical path of the watched tree.
    pub source: PathBuf,
    pub destination: Destination,
    pub log_path: PathBuf,
    #[serde(default)]
    pub options: MirrorOptions,
}

impl WatchTarget {
    /// Validate invocation arguments and build the target.
    ///
    /// The source must be an existing directory; it is stored canonicalised so
    /// that two invocations naming the same tree through different paths share
    /// one [`InvocationSignature`].
    pub fn new(
        source: impl AsRef<Path>,
        destination: impl Into<Destination>,
        log_path: impl Into<PathBuf>,
        options: MirrorOptions,
    ) -> Result<Self, TargetError> {
        let source = source.as_ref();
        if !source.is_dir() {
            return Err(TargetError::NotADirectory {
                path: source.to_path_buf(),
            });
        }
        let canonical = fs::canonicalize(source).map_err(|e| TargetError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;

        let destination = destination.into();
        if destination.0.trim().is_empty() {
            return Err(TargetError::EmptyDestination);
        }

        let log_path = log_path.into();
        if log_path.as_os_str().is_empty() || log_path.is_dir() {
            return Err(TargetError::InvalidLogPath { path: log_path });
        }

        Ok(Self {
            source: canonical,
            destination,
            log_path,
            options,
        })
    }

    /// Identity used by the singleton guard.
    pub fn signature(&self) -> InvocationSignature {
        InvocationSignature {
            program: PROGRAM_NAME.to_string(),
            source: self.source.clone(),
            destination: self.destination.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Process identity
// ---------------------------------------------------------------------------

/// Command identity plus the target arguments that make two instances
/// duplicates of each other. The log path and mirror options are not part of
/// it: two instances mirroring the same tree to the same place conflict no
/// matter where they log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationSignature {
    pub program: String,
    pub source: PathBuf,
    pub destination: Destination,
}

impl InvocationSignature {
    /// Stable 16-hex-digit key derived from SHA-256 of the signature fields.
    pub fn key(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.program.as_bytes());
        h.update([0u8]);
        h.update(self.source.to_string_lossy().as_bytes());
        h.update([0u8]);
        h.update(self.destination.0.as_bytes());
        let digest = hex::encode(h.finalize());
        digest[..16].to_string()
    }

    /// File name of the advisory lock guarding this signature.
    pub fn lock_file_name(&self) -> String {
        format!("{}-{}.lock", self.program, self.key())
    }
}

/// Record of the instance currently holding a signature's lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub signature: InvocationSignature,
}

impl ProcessInstance {
    /// Describe the running process.
    pub fn current(signature: InvocationSignature) -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
            signature,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The only change kinds that can trigger a mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    CloseAfterWrite,
    Move,
    Delete,
    AttributeChange,
}

impl fmt::Display for SyncEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEventKind::CloseAfterWrite => write!(f, "close_write"),
            SyncEventKind::Move => write!(f, "move"),
            SyncEventKind::Delete => write!(f, "delete"),
            SyncEventKind::AttributeChange => write!(f, "attrib"),
        }
    }
}

/// One qualifying change observed under the watched tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub kind: SyncEventKind,
    pub path: PathBuf,
    pub observed_at: DateTime<Utc>,
}

impl SyncEvent {
    pub fn new(kind: SyncEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            observed_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
