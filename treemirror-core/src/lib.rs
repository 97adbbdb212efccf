//! treemirror core library: domain types and validation errors.
//!
//! - [`types`]: watch target, mirror options, events, process identity
//! - [`error`]: [`TargetError`]

pub mod error;
pub mod types;

pub use error::TargetError;
pub use types::{
    Destination, InvocationSignature, MirrorOptions, ProcessInstance, SyncEvent, SyncEventKind,
    WatchTarget, PROGRAM_NAME,
};
