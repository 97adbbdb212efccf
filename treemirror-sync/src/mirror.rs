//! Mirror executor: one synchronous rsync run per call.
//!
//! The executor never inspects the destination. It builds a fixed,
//! archive-preserving command line from the [`WatchTarget`], waits for the
//! child to exit and hands back its exit status and combined output.

use std::ffi::OsString;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use tokio::process::Command;

use treemirror_core::WatchTarget;

use crate::error::SyncError;

/// Outcome of one mirror invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorResult {
    /// `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    /// stdout followed by stderr, lossily decoded.
    pub output: String,
    pub elapsed: Duration,
}

impl MirrorResult {
    fn from_output(output: Output, elapsed: Duration) -> Self {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        Self {
            exit_code: output.status.code(),
            success: output.status.success(),
            output: text,
            elapsed,
        }
    }
}

/// Anything that can bring the destination in line with the source.
#[allow(async_fn_in_trait)]
pub trait Mirror {
    /// Run one mirror to completion. `Err` means the operation could not be
    /// started; a started run that fails is an `Ok` with `success == false`.
    async fn mirror(&mut self, target: &WatchTarget) -> Result<MirrorResult, SyncError>;
}

/// Mirrors by running the configured rsync program as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsyncMirror;

impl Mirror for RsyncMirror {
    async fn mirror(&mut self, target: &WatchTarget) -> Result<MirrorResult, SyncError> {
        let program = &target.options.rsync;
        let args = rsync_args(target);
        tracing::debug!("cmd {} {:?}", program.display(), args);

        let started = Instant::now();
        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SyncError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        Ok(MirrorResult::from_output(output, started.elapsed()))
    }
}

/// Argument vector (without the program) for mirroring `target`.
pub fn rsync_args(target: &WatchTarget) -> Vec<OsString> {
    let opts = &target.options;
    let mut args: Vec<OsString> = vec!["--archive".into(), "--verbose".into()];

    if opts.delete {
        args.push("--delete".into());
    }
    if opts.delay_updates {
        args.push("--delay-updates".into());
    }
    if let Some(chmod) = &opts.chmod {
        args.push(format!("--chmod={chmod}").into());
    }
    for pattern in &opts.excludes {
        args.push(format!("--exclude={pattern}").into());
    }
    args.extend(opts.extra_args.iter().map(OsString::from));
    if opts.dry_run {
        args.push("--dry-run".into());
    }

    args.push(target.source.clone().into_os_string());
    args.push(target.destination.0.clone().into());
    args
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;
    use treemirror_core::MirrorOptions;

    use super::*;

    fn target(dir: &TempDir, options: MirrorOptions) -> WatchTarget {
        WatchTarget::new(dir.path(), "shore:/gliders/sg180", dir.path().join("t.log"), options)
            .expect("target")
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn default_args_are_archive_verbose_without_delete() {
        let dir = TempDir::new().expect("dir");
        let t = target(&dir, MirrorOptions::default());
        let args = strings(&rsync_args(&t));

        assert_eq!(args[0], "--archive");
        assert_eq!(args[1], "--verbose");
        assert!(!args.iter().any(|a| a == "--delete"), "delete must be opt-in");
        assert_eq!(args[args.len() - 2], t.source.display().to_string());
        assert_eq!(args[args.len() - 1], "shore:/gliders/sg180");
    }

    #[test]
    fn options_map_to_flags_before_paths() {
        let dir = TempDir::new().expect("dir");
        let t = target(
            &dir,
            MirrorOptions {
                delete: true,
                delay_updates: true,
                chmod: Some("Do+rx,Fo+r".to_string()),
                excludes: vec!["*.tmp".to_string(), ".archived-deployments/".to_string()],
                extra_args: vec!["--compress".to_string()],
                dry_run: true,
                ..MirrorOptions::default()
            },
        );
        let args = strings(&rsync_args(&t));

        assert_eq!(
            &args[..args.len() - 2],
            &[
                "--archive",
                "--verbose",
                "--delete",
                "--delay-updates",
                "--chmod=Do+rx,Fo+r",
                "--exclude=*.tmp",
                "--exclude=.archived-deployments/",
                "--compress",
                "--dry-run",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_run_captures_output() {
        let dir = TempDir::new().expect("dir");
        let t = target(
            &dir,
            MirrorOptions {
                rsync: PathBuf::from("echo"),
                ..MirrorOptions::default()
            },
        );

        let result = RsyncMirror.mirror(&t).await.expect("spawn echo");
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.output.contains("--archive"), "got: {}", result.output);
        assert!(result.output.contains("shore:/gliders/sg180"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_run_is_reported_not_raised() {
        let dir = TempDir::new().expect("dir");
        let t = target(
            &dir,
            MirrorOptions {
                rsync: PathBuf::from("false"),
                ..MirrorOptions::default()
            },
        );

        let result = RsyncMirror.mirror(&t).await.expect("spawn false");
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(1));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let dir = TempDir::new().expect("dir");
        let t = target(
            &dir,
            MirrorOptions {
                rsync: dir.path().join("no-such-rsync"),
                ..MirrorOptions::default()
            },
        );

        let err = RsyncMirror.mirror(&t).await.unwrap_err();
        assert!(matches!(err, SyncError::Spawn { .. }), "got: {err}");
    }

    #[cfg(unix)]
    #[test]
    fn stderr_follows_stdout_on_its_own_line() {
        use std::os::unix::process::ExitStatusExt;

        let output = Output {
            status: std::process::ExitStatus::from_raw(23 << 8),
            stdout: b"sending incremental file list".to_vec(),
            stderr: b"rsync error: some files could not be transferred\n".to_vec(),
        };
        let result = MirrorResult::from_output(output, Duration::from_millis(5));
        assert_eq!(result.exit_code, Some(23));
        assert!(!result.success);
        assert_eq!(
            result.output,
            "sending incremental file list\nrsync error: some files could not be transferred\n"
        );
    }
}
