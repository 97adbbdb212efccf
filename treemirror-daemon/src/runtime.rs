use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;

use treemirror_core::WatchTarget;
use treemirror_sync::{LogSink, Mirror, RsyncMirror};

use crate::error::{io_err, DaemonError};
use crate::guard::SingletonGuard;
use crate::watcher::{EventSource, NotifyWatcher};

/// Process-level knobs that are not part of the [`WatchTarget`].
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub lock_dir: PathBuf,
    /// Mirror once before the first wait.
    pub initial_sync: bool,
    /// Pause between an event and the mirror it triggers.
    pub settle: Duration,
    /// Default tracing level when `RUST_LOG` is unset.
    pub verbose: bool,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            lock_dir: crate::paths::default_lock_dir(),
            initial_sync: true,
            settle: Duration::ZERO,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Starting,
    Syncing,
    Watching,
}

/// The watch-and-mirror state machine for one target.
///
/// `Starting -> Syncing -> Watching`, then `Watching -> Syncing -> Watching`
/// forever. There is no terminal state: [`DaemonLoop::run`] only returns on a
/// lost watch.
pub struct DaemonLoop<W, M> {
    target: WatchTarget,
    events: W,
    mirror: M,
    sink: LogSink,
    settle: Duration,
    state: DaemonState,
    attempts: u64,
}

impl<W: EventSource, M: Mirror> DaemonLoop<W, M> {
    pub fn new(target: WatchTarget, events: W, mirror: M, sink: LogSink) -> Self {
        Self {
            target,
            events,
            mirror,
            sink,
            settle: Duration::ZERO,
            state: DaemonState::Starting,
            attempts: 0,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Mirror invocations started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub async fn run(&mut self, initial_sync: bool) -> Result<Infallible, DaemonError> {
        self.state = if initial_sync {
            DaemonState::Syncing
        } else {
            DaemonState::Watching
        };
        loop {
            self.step().await?;
        }
    }

    /// Perform one transition.
    pub async fn step(&mut self) -> Result<(), DaemonError> {
        match self.state {
            DaemonState::Starting => {
                self.state = DaemonState::Syncing;
            }
            DaemonState::Syncing => {
                self.sync_once().await;
                // Whatever changed while the mirror ran is folded into one
                // follow-up pass.
                let pending = self.events.drain_pending()?;
                if pending > 0 {
                    tracing::debug!(pending, "events arrived during mirror; syncing again");
                    self.state = DaemonState::Syncing;
                } else {
                    self.state = DaemonState::Watching;
                }
            }
            DaemonState::Watching => {
                let event = self.events.next_event().await?;
                tracing::info!(kind = %event.kind, path = %event.path.display(), "change detected");
                if !self.settle.is_zero() {
                    tokio::time::sleep(self.settle).await;
                    let folded = self.events.drain_pending()?;
                    if folded > 0 {
                        tracing::debug!(folded, "events folded into pending mirror");
                    }
                }
                self.state = DaemonState::Syncing;
            }
        }
        Ok(())
    }

    async fn sync_once(&mut self) {
        self.attempts += 1;
        let attempt = self.attempts;

        if let Err(err) = self.sink.marker(attempt, &self.target) {
            tracing::warn!(error = %err, "failed to write log marker");
        }

        match self.mirror.mirror(&self.target).await {
            Ok(result) => {
                if result.success {
                    tracing::info!(
                        attempt,
                        destination = %self.target.destination,
                        duration_ms = result.elapsed.as_millis() as u64,
                        "mirror completed",
                    );
                } else {
                    // Retry unit is the next qualifying event.
                    tracing::error!(
                        attempt,
                        destination = %self.target.destination,
                        exit_code = ?result.exit_code,
                        "mirror failed",
                    );
                }
                if let Err(err) = self.sink.record(attempt, &result) {
                    tracing::warn!(error = %err, "failed to write mirror output");
                }
            }
            Err(err) => {
                tracing::error!(attempt, error = %err, "mirror could not be started");
                if let Err(log_err) = self.sink.record_failure(attempt, &err) {
                    tracing::warn!(error = %log_err, "failed to write mirror failure");
                }
            }
        }
    }
}

/// Guard, open the log, subscribe and run the loop on a current-thread
/// runtime. Blocks until the watch is lost or a termination signal arrives.
pub fn start_blocking(target: WatchTarget, options: DaemonOptions) -> Result<(), DaemonError> {
    // Losing the race must leave no trace in the log.
    let guard = SingletonGuard::acquire(&options.lock_dir, &target.signature())?;

    let sink = LogSink::open(&target.log_path)?;
    init_tracing(&sink, options.verbose);
    tracing::info!(
        source = %target.source.display(),
        destination = %target.destination,
        lock = %guard.lock_path().display(),
        "starting",
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let result = runtime.block_on(run(target, options, sink));

    if let Err(err) = &result {
        tracing::error!(error = %err, "daemon exiting");
    }
    drop(guard);
    result
}

/// Run the daemon until the watch is lost or SIGINT/SIGTERM arrives.
pub async fn run(
    target: WatchTarget,
    options: DaemonOptions,
    sink: LogSink,
) -> Result<(), DaemonError> {
    // Subscribe before the initial mirror so changes made during it are seen.
    let events = NotifyWatcher::subscribe(&target.source)?;
    let mut daemon =
        DaemonLoop::new(target, events, RsyncMirror, sink).with_settle(options.settle);

    tokio::select! {
        result = daemon.run(options.initial_sync) => match result {
            Ok(never) => match never {},
            Err(err) => Err(err),
        },
        signal = shutdown_signal() => {
            let name = signal?;
            tracing::info!(signal = name, "received signal, shutting down");
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str, DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
    tokio::select! {
        ctrl_c = tokio::signal::ctrl_c() => {
            ctrl_c.map_err(|e| io_err("SIGINT handler", e))?;
            Ok("SIGINT")
        }
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str, DaemonError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| io_err("ctrl-c handler", e))?;
    Ok("ctrl-c")
}

fn init_tracing(sink: &LogSink, verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(sink.handle())
        .try_init();
}
