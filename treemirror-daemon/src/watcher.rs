//! Event watcher: one qualifying filesystem event per call.
//!
//! A recursive `notify` subscription is opened once and kept for the life of
//! the daemon, so nothing is missed between two `next_event` calls. Only
//! close-after-write, move, delete and attribute changes ever leave this
//! module; every other kind is dropped before the caller sees it.
//!
//! Only inotify reports the close of a written file. FSEvents, kqueue and
//! ReadDirectoryChanges report file creation and data writes instead, so on
//! those backends both count as close-after-write.

use std::fs;
use std::path::{Path, PathBuf};

#[cfg(not(target_os = "linux"))]
use notify::event::CreateKind;
use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use treemirror_core::{SyncEvent, SyncEventKind};

use crate::error::{io_err, DaemonError};

/// Source of qualifying events for the daemon loop.
#[allow(async_fn_in_trait)]
pub trait EventSource {
    /// Wait, without bound, for the next qualifying event.
    ///
    /// Fails with [`DaemonError::WatchLost`] once the watched tree is gone.
    async fn next_event(&mut self) -> Result<SyncEvent, DaemonError>;

    /// Consume every qualifying event already queued, without waiting.
    /// Returns how many there were.
    fn drain_pending(&mut self) -> Result<usize, DaemonError>;
}

/// [`EventSource`] backed by the platform's recommended `notify` watcher.
pub struct NotifyWatcher {
    root: PathBuf,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    // Dropping the watcher ends the subscription.
    _watcher: RecommendedWatcher,
}

impl NotifyWatcher {
    /// Subscribe recursively to `root`.
    pub fn subscribe(root: &Path) -> Result<Self, DaemonError> {
        // Canonicalize so that backend paths (which arrive as real paths)
        // compare equal to `root`.
        let root = fs::canonicalize(root).map_err(|e| io_err(root, e))?;

        let (event_tx, events) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::debug!(path = %root.display(), "watching source tree");

        Ok(Self {
            root,
            events,
            _watcher: watcher,
        })
    }

    /// Turn one raw backend message into a qualifying event, nothing, or a
    /// lost watch.
    fn interpret(&self, raw: notify::Result<Event>) -> Result<Option<SyncEvent>, DaemonError> {
        let event = match raw {
            Ok(event) => event,
            Err(err) => {
                self.ensure_root()?;
                tracing::warn!(error = %err, "watcher event error");
                return Ok(None);
            }
        };

        if event.need_rescan() {
            tracing::warn!("watcher queue overflowed; some events were dropped");
        }

        let touches_root = event.paths.iter().any(|p| p == &self.root);
        if touches_root || matches!(event.kind, EventKind::Other) {
            self.ensure_root()?;
        }

        let Some(kind) = classify(&event.kind) else {
            return Ok(None);
        };
        let path = event
            .paths
            .into_iter()
            .next()
            .unwrap_or_else(|| self.root.clone());
        Ok(Some(SyncEvent::new(kind, path)))
    }

    fn ensure_root(&self) -> Result<(), DaemonError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(self.lost("watched directory is no longer accessible"))
        }
    }

    fn lost(&self, reason: &str) -> DaemonError {
        DaemonError::WatchLost {
            root: self.root.clone(),
            reason: reason.to_string(),
        }
    }
}

impl EventSource for NotifyWatcher {
    async fn next_event(&mut self) -> Result<SyncEvent, DaemonError> {
        loop {
            let Some(raw) = self.events.recv().await else {
                return Err(self.lost("event subscription closed"));
            };
            if let Some(event) = self.interpret(raw)? {
                return Ok(event);
            }
        }
    }

    fn drain_pending(&mut self) -> Result<usize, DaemonError> {
        let mut drained = 0;
        loop {
            match self.events.try_recv() {
                Ok(raw) => {
                    if self.interpret(raw)?.is_some() {
                        drained += 1;
                    }
                }
                Err(mpsc::error::TryRecvError::Empty) => return Ok(drained),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    return Err(self.lost("event subscription closed"));
                }
            }
        }
    }
}

/// Map a backend event kind onto the reported set; `None` means invisible.
pub fn classify(kind: &EventKind) -> Option<SyncEventKind> {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            Some(SyncEventKind::CloseAfterWrite)
        }
        #[cfg(not(target_os = "linux"))]
        EventKind::Create(CreateKind::File) | EventKind::Modify(ModifyKind::Data(_)) => {
            Some(SyncEventKind::CloseAfterWrite)
        }
        EventKind::Modify(ModifyKind::Name(_)) => Some(SyncEventKind::Move),
        EventKind::Remove(_) => Some(SyncEventKind::Delete),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(SyncEventKind::AttributeChange),
        _ => None,
    }
}
