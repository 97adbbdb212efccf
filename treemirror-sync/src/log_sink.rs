//! Append-only log file shared by the daemon's tracing output and the mirror
//! transcript.
//!
//! The file is opened with `O_APPEND | O_CREAT` and never truncated or rotated
//! here; rotation, if any, belongs to whatever supervises the process. Every
//! mirror attempt is bracketed by a start marker and a result line so the file
//! reads as a chronological record of attempts.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

use treemirror_core::{WatchTarget, PROGRAM_NAME};

use crate::error::{io_err, SyncError};
use crate::mirror::MirrorResult;

/// Handle to the append-only log. Cheap to clone; clones share the file.
#[derive(Debug, Clone)]
pub struct LogSink {
    file: Arc<File>,
    path: PathBuf,
}

impl LogSink {
    /// Open (creating if needed) `path` for appending. Missing parent
    /// directories are created.
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| io_err(path, e))?;
        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Shared file handle, suitable as a `tracing-subscriber` writer.
    pub fn handle(&self) -> Arc<File> {
        Arc::clone(&self.file)
    }

    /// Write the "attempt N started" marker.
    pub fn marker(&self, attempt: u64, target: &WatchTarget) -> Result<(), SyncError> {
        self.append(&format_marker(Utc::now(), attempt, target))
    }

    /// Write the result line followed by the captured output.
    pub fn record(&self, attempt: u64, result: &MirrorResult) -> Result<(), SyncError> {
        self.append(&format_result(Utc::now(), attempt, result))
    }

    /// Write a line for an attempt that never produced a [`MirrorResult`].
    pub fn record_failure(&self, attempt: u64, error: &SyncError) -> Result<(), SyncError> {
        let line = format!(
            "{} [{PROGRAM_NAME}] mirror #{attempt} not run: {error}\n",
            timestamp(Utc::now())
        );
        self.append(&line)
    }

    fn append(&self, text: &str) -> Result<(), SyncError> {
        // One write per entry; O_APPEND keeps entries whole with respect to
        // the tracing layer writing through the same handle.
        (&*self.file)
            .write_all(text.as_bytes())
            .map_err(|e| io_err(&self.path, e))
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn format_marker(at: DateTime<Utc>, attempt: u64, target: &WatchTarget) -> String {
    format!(
        "{} [{PROGRAM_NAME}] mirror #{attempt} start: {} -> {}\n",
        timestamp(at),
        target.source.display(),
        target.destination
    )
}

pub(crate) fn format_result(at: DateTime<Utc>, attempt: u64, result: &MirrorResult) -> String {
    let status = match result.exit_code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    };
    let verdict = if result.success { "ok" } else { "FAILED" };
    let mut text = format!(
        "{} [{PROGRAM_NAME}] mirror #{attempt} {verdict}: {status} in {}ms\n",
        timestamp(at),
        result.elapsed.as_millis()
    );
    if !result.output.is_empty() {
        text.push_str(&result.output);
        if !result.output.ends_with('\n') {
            text.push('\n');
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use chrono::TimeZone;
    use tempfile::TempDir;
    use treemirror_core::MirrorOptions;

    use super::*;

    fn target(dir: &TempDir) -> WatchTarget {
        WatchTarget::new(
            dir.path(),
            "shore:/gliders/sg180",
            dir.path().join("sync.log"),
            MirrorOptions::default(),
        )
        .expect("target")
    }

    fn result(success: bool, output: &str) -> MirrorResult {
        MirrorResult {
            exit_code: Some(if success { 0 } else { 12 }),
            success,
            output: output.to_string(),
            elapsed: Duration::from_millis(42),
        }
    }

    #[test]
    fn marker_names_attempt_source_and_destination() {
        let dir = TempDir::new().expect("dir");
        let t = target(&dir);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let line = format_marker(at, 3, &t);
        assert_eq!(
            line,
            format!(
                "2024-05-01T12:00:00Z [treemirror] mirror #3 start: {} -> shore:/gliders/sg180\n",
                t.source.display()
            )
        );
    }

    #[test]
    fn failed_result_is_flagged_and_output_newline_terminated() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap();
        let text = format_result(at, 3, &result(false, "ssh: connect to host shore: timed out"));
        assert_eq!(
            text,
            "2024-05-01T12:00:01Z [treemirror] mirror #3 FAILED: exit status 12 in 42ms\n\
             ssh: connect to host shore: timed out\n"
        );
    }

    #[test]
    fn signal_termination_has_no_exit_code() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap();
        let mut r = result(false, "");
        r.exit_code = None;
        let text = format_result(at, 1, &r);
        assert!(text.contains("terminated by signal"), "got: {text}");
        assert!(text.ends_with("ms\n"));
    }

    #[test]
    fn reopening_appends_and_never_truncates() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().expect("dir");
        let t = target(&dir);
        let log = dir.path().join("logs").join("sync.log");

        let sink = LogSink::open(&log).expect("open");
        sink.marker(1, &t).expect("marker");
        sink.record(1, &result(true, "sent 10 bytes\n")).expect("record");
        let first = fs::read_to_string(&log).expect("read");
        drop(sink);

        // Simulates a supervisor restart.
        let sink = LogSink::open(&log).expect("reopen");
        sink.marker(1, &t).expect("marker");
        let second = fs::read_to_string(&log).expect("read");

        assert!(second.len() > first.len());
        assert!(second.starts_with(&first), "earlier content must be preserved");
        assert_eq!(second.matches("mirror #1 start").count(), 2);
    }

    #[test]
    fn clones_share_one_file() {
        let dir = TempDir::new().expect("dir");
        let log = dir.path().join("sync.log");
        let sink = LogSink::open(&log).expect("open");
        let clone = sink.clone();

        sink.record_failure(
            1,
            &SyncError::Spawn {
                program: PathBuf::from("rsync"),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            },
        )
        .expect("write");
        (&*clone.handle()).write_all(b"from tracing\n").expect("write");

        let text = fs::read_to_string(&log).expect("read");
        assert!(text.contains("mirror #1 not run: failed to spawn rsync"));
        assert!(text.ends_with("from tracing\n"));
    }
}
