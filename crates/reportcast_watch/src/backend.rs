//! Watch backends.
//!
//! A backend knows how to observe one directory and push what it sees into an
//! [`EventSink`]. The change watcher owns the rest: filtering, re-running,
//! and the worker thread.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How much of the tree below the watched directory is observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchMode {
    /// The directory and every subdirectory
    Recursive,
    /// The directory only
    Flat,
}

impl WatchMode {
    /// Mode for a `watchUpdatesRecursively` flag
    #[must_use]
    pub const fn from_recursive(recursive: bool) -> Self {
        if recursive { Self::Recursive } else { Self::Flat }
    }
}

impl std::fmt::Display for WatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recursive => write!(f, "recursive"),
            Self::Flat => write!(f, "flat"),
        }
    }
}

/// Kind of file system change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    /// Path was created
    Created,
    /// Content or metadata changed
    Modified,
    /// Path was removed
    Removed,
    /// Anything else the platform reports
    Other,
}

/// One observed change to one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    /// What happened
    pub kind: FsEventKind,
    /// Where it happened
    pub path: PathBuf,
}

impl FsEvent {
    /// Create an event
    #[must_use]
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Errors from starting or running a watcher
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    /// The backend refused to start in the requested mode
    #[error("Could not watch {path} ({mode}): {reason}")]
    Start {
        /// Directory that was to be observed
        path: String,
        /// Requested mode
        mode: WatchMode,
        /// Backend message
        reason: String,
    },

    /// A filter pattern did not compile
    #[error("Invalid watch pattern {pattern:?}: {reason}")]
    Pattern {
        /// The pattern text
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// The re-run command could not be launched
    #[error("Could not launch {command}: {reason}")]
    Launch {
        /// Program that failed
        command: String,
        /// OS message
        reason: String,
    },
}

pub(crate) enum WorkerMsg {
    Event(FsEvent),
    Stop,
}

/// Where a backend delivers events
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<WorkerMsg>,
}

impl EventSink {
    pub(crate) fn new(tx: Sender<WorkerMsg>) -> Self {
        Self { tx }
    }

    /// Hand an event to the watcher's worker
    ///
    /// Returns `false` once the worker is gone.
    pub fn emit(&self, event: FsEvent) -> bool {
        self.tx.send(WorkerMsg::Event(event)).is_ok()
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// Capability interface over a file notification mechanism
pub trait WatchBackend: Send {
    /// Begin observing `dir` in `mode`, delivering events to `sink`
    ///
    /// May be called again after a failure, with a different mode.
    ///
    /// # Errors
    ///
    /// Returns error if the mechanism cannot observe `dir` in `mode`
    fn start(&mut self, dir: &Path, mode: WatchMode, sink: EventSink) -> Result<(), WatchError>;

    /// Stop observing. Must be safe to call more than once.
    fn stop(&mut self);
}

#[derive(Debug, Default)]
struct ManualState {
    failing: Vec<WatchMode>,
    attempts: Vec<WatchMode>,
    active: Option<(PathBuf, WatchMode)>,
    sink: Option<EventSink>,
    stop_calls: usize,
}

/// Backend driven by hand through a [`ManualHandle`]
///
/// Fires exactly the events it is told to, and can be told to refuse given
/// modes. Useful where no OS notification is available, and in tests.
#[derive(Debug, Default)]
pub struct ManualBackend {
    state: Arc<Mutex<ManualState>>,
}

/// Control side of a [`ManualBackend`]
#[derive(Debug, Clone)]
pub struct ManualHandle {
    state: Arc<Mutex<ManualState>>,
}

fn lock(state: &Mutex<ManualState>) -> MutexGuard<'_, ManualState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ManualBackend {
    /// Create a backend that accepts every mode
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `start` fail for `mode`
    #[must_use]
    pub fn failing(self, mode: WatchMode) -> Self {
        lock(&self.state).failing.push(mode);
        self
    }

    /// Handle for firing events and inspecting state
    #[must_use]
    pub fn handle(&self) -> ManualHandle {
        ManualHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl WatchBackend for ManualBackend {
    fn start(&mut self, dir: &Path, mode: WatchMode, sink: EventSink) -> Result<(), WatchError> {
        let mut state = lock(&self.state);
        state.attempts.push(mode);
        if state.failing.contains(&mode) {
            return Err(WatchError::Start {
                path: dir.display().to_string(),
                mode,
                reason: "refused by manual backend".to_string(),
            });
        }
        state.active = Some((dir.to_path_buf(), mode));
        state.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = lock(&self.state);
        state.stop_calls += 1;
        state.active = None;
        state.sink = None;
    }
}

impl ManualHandle {
    /// Deliver an event as if the platform had reported it
    ///
    /// Returns `false` if the backend is not running.
    pub fn fire(&self, event: FsEvent) -> bool {
        let sink = lock(&self.state).sink.clone();
        sink.is_some_and(|sink| sink.emit(event))
    }

    /// Shorthand for a modification of `path`
    pub fn modify(&self, path: impl Into<PathBuf>) -> bool {
        self.fire(FsEvent::new(FsEventKind::Modified, path))
    }

    /// Directory and mode currently observed
    #[must_use]
    pub fn active(&self) -> Option<(PathBuf, WatchMode)> {
        lock(&self.state).active.clone()
    }

    /// Every mode `start` was called with, in order
    #[must_use]
    pub fn attempts(&self) -> Vec<WatchMode> {
        lock(&self.state).attempts.clone()
    }

    /// How many times `stop` was called
    #[must_use]
    pub fn stop_calls(&self) -> usize {
        lock(&self.state).stop_calls
    }
}
