use std::path::{Path, PathBuf};

use treemirror_core::{InvocationSignature, PROGRAM_NAME};

/// Where lock files live unless `--lock-dir` says otherwise.
///
/// Host-wide and independent of the caller's environment: instances started
/// from a login shell and from a service manager must find the same lock.
#[cfg(unix)]
pub fn default_lock_dir() -> PathBuf {
    Path::new("/tmp").join(PROGRAM_NAME)
}

#[cfg(not(unix))]
pub fn default_lock_dir() -> PathBuf {
    std::env::temp_dir().join(PROGRAM_NAME)
}

pub fn lock_path(lock_dir: &Path, signature: &InvocationSignature) -> PathBuf {
    lock_dir.join(signature.lock_file_name())
}
