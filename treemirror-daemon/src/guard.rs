//! Singleton guard: one live instance per (program, source, destination).
//!
//! The guard holds an exclusive `flock`-style lock on a per-signature file for
//! the life of the process. The kernel drops the lock when the process dies, so
//! a supervisor restart never finds a stale holder. The holder writes its
//! [`ProcessInstance`] into the file so a losing instance can say who won; that
//! record is informational only and is never consulted to decide ownership.
//!
//! The lock directory is shared by every user on the host, so it is created
//! world-writable with the sticky bit, like `/tmp`. A lock file left behind by
//! another user is locked through a read-only descriptor; the holder record is
//! then not rewritten.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use treemirror_core::{InvocationSignature, ProcessInstance};

use crate::error::{io_err, DaemonError};
use crate::paths::lock_path;

/// Held for as long as this instance may mirror its target.
#[derive(Debug)]
pub struct SingletonGuard {
    file: File,
    path: PathBuf,
}

/// `drwxrwxrwt`
#[cfg(unix)]
const SHARED_DIR_MODE: u32 = 0o1777;

impl SingletonGuard {
    /// Try once to become the only instance for `signature`.
    ///
    /// Returns [`DaemonError::SingletonLost`] if another live instance holds
    /// the lock. Never blocks.
    pub fn acquire(lock_dir: &Path, signature: &InvocationSignature) -> Result<Self, DaemonError> {
        ensure_lock_dir(lock_dir)?;
        let path = lock_path(lock_dir, signature);

        let (mut file, writable) = open_lock_file(&path).map_err(|e| io_err(&path, e))?;

        if let Err(err) = file.try_lock_exclusive() {
            if is_contended(&err) {
                let holder = read_holder(&mut file);
                return Err(DaemonError::SingletonLost { lock: path, holder });
            }
            return Err(io_err(&path, err));
        }

        let instance = ProcessInstance::current(signature.clone());
        if writable {
            write_holder(&mut file, &instance).map_err(|e| io_err(&path, e))?;
        }
        tracing::debug!(
            lock = %path.display(),
            pid = instance.pid,
            writable,
            "singleton lock acquired",
        );

        Ok(Self { file, path })
    }

    pub fn lock_path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SingletonGuard {
    fn drop(&mut self) {
        // The file stays behind on purpose: unlinking a lock file lets a third
        // instance lock a fresh inode while a second still holds the old one.
        let _ = FileExt::unlock(&self.file);
    }
}

fn ensure_lock_dir(lock_dir: &Path) -> Result<(), DaemonError> {
    if lock_dir.is_dir() {
        return Ok(());
    }
    if let Some(parent) = lock_dir.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
    }
    match create_shared_dir(lock_dir) {
        Ok(()) => Ok(()),
        // Another instance won the race to create it.
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(io_err(lock_dir, e)),
    }
}

#[cfg(unix)]
fn create_shared_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    fs::DirBuilder::new().mode(SHARED_DIR_MODE).create(dir)?;
    // The umask strips the group/other write bits at creation time.
    fs::set_permissions(dir, fs::Permissions::from_mode(SHARED_DIR_MODE))
}

#[cfg(not(unix))]
fn create_shared_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir(dir)
}

/// Open the lock file, read-write when possible. Returns whether the holder
/// record may be written.
fn open_lock_file(path: &Path) -> std::io::Result<(File, bool)> {
    let opened = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path);
    match opened {
        Ok(file) => Ok((file, true)),
        // Owned by another user; `flock` works on a read-only descriptor.
        Err(e) if e.kind() == ErrorKind::PermissionDenied && path.is_file() => {
            File::open(path).map(|file| (file, false))
        }
        Err(e) => Err(e),
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn read_holder(file: &mut File) -> Option<ProcessInstance> {
    let mut raw = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut raw).ok()?;
    serde_json::from_str(raw.trim()).ok()
}

fn write_holder(file: &mut File, instance: &ProcessInstance) -> std::io::Result<()> {
    let payload = serde_json::to_string(instance).map_err(std::io::Error::other)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(payload.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()
}
