//! Watch-and-mirror daemon: singleton guard + event watcher + mirror loop.

mod error;
pub mod guard;
pub mod paths;
mod runtime;
pub mod watcher;

pub use error::DaemonError;
pub use guard::SingletonGuard;
pub use runtime::{run, start_blocking, DaemonLoop, DaemonOptions, DaemonState};
pub use watcher::{classify, EventSource, NotifyWatcher};
