//! # treemirror-sync
//!
//! Mirror executor and append-only log sink.
//!
//! Call [`RsyncMirror::mirror`] (through the [`Mirror`] trait) to run one
//! blocking rsync pass for a [`treemirror_core::WatchTarget`], and record it
//! with a [`LogSink`].

pub mod error;
pub mod log_sink;
pub mod mirror;

pub use error::SyncError;
pub use log_sink::LogSink;
pub use mirror::{rsync_args, Mirror, MirrorResult, RsyncMirror};
