//! REPORTCAST Change Watcher
//!
//! Watches a report's source directory and re-runs the report when a
//! matching file changes. The notification mechanism sits behind
//! [`WatchBackend`] so it can be swapped for [`ManualBackend`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod filter;
pub mod notify_backend;
pub mod rerun;
pub mod watcher;

pub use backend::{
    EventSink, FsEvent, FsEventKind, ManualBackend, ManualHandle, WatchBackend, WatchError,
    WatchMode,
};
pub use filter::PathFilter;
pub use notify_backend::NotifyBackend;
pub use rerun::{CommandRelauncher, RerunTrigger};
pub use watcher::{watch_dir, ChangeWatcher, WatchState, STOP_TIMEOUT};
