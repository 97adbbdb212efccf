//! treemirror: keep one local directory tree mirrored to one rsync target.
//!
//! # Usage
//!
//! ```text
//! treemirror [OPTIONS] SOURCE_DIRECTORY DESTINATION_SPEC LOG_FILE
//! ```
//!
//! Exits 1 on bad arguments, a non-directory source, or when another instance
//! is already mirroring the same source to the same destination. Otherwise runs
//! until killed or until the watched directory disappears.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;

use treemirror_core::{MirrorOptions, WatchTarget};
use treemirror_daemon::{paths::default_lock_dir, start_blocking, DaemonError, DaemonOptions};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "treemirror",
    version,
    about = "Mirror a directory tree to an rsync destination on every change",
    long_about = None,
)]
struct Cli {
    /// Directory tree to watch and mirror.
    source: PathBuf,

    /// rsync destination, e.g. `user@host:/path`.
    destination: String,

    /// File all output is appended to.
    log_file: PathBuf,

    /// rsync program to run.
    #[arg(long, value_name = "PROG", default_value = "rsync")]
    rsync: PathBuf,

    /// Delete destination files that no longer exist in the source.
    #[arg(long)]
    delete: bool,

    /// Put all updated files into place at the end of each transfer.
    #[arg(long)]
    delay_updates: bool,

    /// Permission adjustment passed to `rsync --chmod`, e.g. `Do+rx,Fo+r`.
    #[arg(long, value_name = "SPEC")]
    chmod: Option<String>,

    /// Pattern passed to `rsync --exclude` (repeatable).
    #[arg(long, value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Extra raw argument for rsync (repeatable).
    #[arg(long = "rsync-arg", value_name = "ARG", allow_hyphen_values = true)]
    rsync_args: Vec<String>,

    /// Ask rsync to report what it would transfer without copying.
    #[arg(long)]
    dry_run: bool,

    /// Skip the mirror normally run at startup.
    #[arg(long)]
    no_initial_sync: bool,

    /// Seconds to wait after a change before mirroring; changes in the
    /// window share that mirror.
    #[arg(long, value_name = "SECS", default_value_t = 0.0)]
    settle: f64,

    /// Directory holding the per-target lock files.
    #[arg(long, value_name = "DIR")]
    lock_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn mirror_options(&self) -> MirrorOptions {
        MirrorOptions {
            rsync: self.rsync.clone(),
            delete: self.delete,
            delay_updates: self.delay_updates,
            chmod: self.chmod.clone(),
            excludes: self.exclude.clone(),
            extra_args: self.rsync_args.clone(),
            dry_run: self.dry_run,
        }
    }

    fn daemon_options(&self) -> Result<DaemonOptions> {
        let settle = Duration::try_from_secs_f64(self.settle)
            .with_context(|| format!("invalid --settle value {}", self.settle))?;
        Ok(DaemonOptions {
            lock_dir: self.lock_dir.clone().unwrap_or_else(default_lock_dir),
            initial_sync: !self.no_initial_sync,
            settle,
            verbose: self.verbose,
        })
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(DaemonError::SingletonLost { .. }) = err.downcast_ref::<DaemonError>() {
                eprintln!("treemirror: {err}");
            } else {
                eprintln!("treemirror: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let options = cli.daemon_options()?;
    let target = WatchTarget::new(
        &cli.source,
        cli.destination.as_str(),
        &cli.log_file,
        cli.mirror_options(),
    )?;
    start_blocking(target, options).map_err(anyhow::Error::from)
}
