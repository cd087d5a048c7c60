//! REPORTCAST Delta Log
//!
//! Append-only, snapshot-clonable, closeable sequences of opaque deltas,
//! and the per-viewer cursors that replay them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod delta;
pub mod log;

pub use cursor::{CursorFeed, Recv, SubscriberCursor};
pub use delta::Delta;
pub use log::DeltaLog;
