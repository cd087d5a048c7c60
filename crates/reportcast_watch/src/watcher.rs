//! Change watcher.
//!
//! Observes the directory holding a report's source file and re-runs the
//! report when a matching file changes. Startup never fails outright: a
//! recursive watch that cannot start falls back to a flat one, and if that
//! fails too the caller simply gets no watcher.

use crate::backend::{EventSink, WatchBackend, WatchError, WatchMode, WorkerMsg};
use crate::filter::PathFilter;
use crate::rerun::RerunTrigger;
use reportcast_core::ProxyConfig;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn, Span};

/// How long `stop` waits for the worker before abandoning it
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Operating state of a session's watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Watching is off or could not be started
    Disabled,
    /// Watching in the given mode
    Active(WatchMode),
}

/// Running watcher with its worker thread
pub struct ChangeWatcher {
    dir: PathBuf,
    mode: WatchMode,
    backend: Box<dyn WatchBackend>,
    tx: Sender<WorkerMsg>,
    done_rx: Receiver<()>,
    stopping: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    stop_timeout: Duration,
}

/// Directory to observe for a given source file
#[must_use]
pub fn watch_dir(source_file: &Path) -> PathBuf {
    match source_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl ChangeWatcher {
    /// Start watching the directory of `source_file` as `config` asks
    ///
    /// Returns `None` when watching is turned off or cannot be started in
    /// any mode. Failures are logged, never returned. Only a failing
    /// recursive request is retried in flat mode.
    pub fn start(
        source_file: &Path,
        config: &ProxyConfig,
        mut backend: Box<dyn WatchBackend>,
        trigger: impl RerunTrigger,
    ) -> Option<Self> {
        if !config.watch_file_system {
            debug!("file system watching disabled");
            return None;
        }

        let filter = match PathFilter::new(&config.watch_patterns, &config.ignore_patterns) {
            Ok(filter) => filter,
            Err(e) => {
                error!(error = %e, "could not start file system watcher");
                return None;
            }
        };

        let dir = watch_dir(source_file);
        let (tx, rx) = mpsc::channel();
        let requested = WatchMode::from_recursive(config.watch_updates_recursively);

        let mode = match start_backend(backend.as_mut(), &dir, requested, &tx) {
            Ok(()) => requested,
            Err(e) if requested == WatchMode::Recursive => {
                error!(error = %e, "could not start file system watcher; retrying non-recursively");
                match start_backend(backend.as_mut(), &dir, WatchMode::Flat, &tx) {
                    Ok(()) => WatchMode::Flat,
                    Err(e) => {
                        error!(error = %e, "could not start file system watcher");
                        return None;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "could not start file system watcher");
                return None;
            }
        };
        info!(path = %dir.display(), %mode, "observing file system");

        let stopping = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let worker = {
            let stopping = Arc::clone(&stopping);
            let span = Span::current();
            thread::Builder::new()
                .name("reportcast-watch".to_string())
                .spawn(move || {
                    let _entered = span.enter();
                    run_worker(&rx, &filter, &trigger, &stopping);
                    let _ = done_tx.send(());
                })
        };

        let worker = match worker {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "could not spawn file system watch worker");
                backend.stop();
                return None;
            }
        };

        Some(Self {
            dir,
            mode,
            backend,
            tx,
            done_rx,
            stopping,
            worker: Some(worker),
            stop_timeout: STOP_TIMEOUT,
        })
    }

    /// Override how long `stop` waits for the worker
    pub fn set_stop_timeout(&mut self, timeout: Duration) {
        self.stop_timeout = timeout;
    }

    /// Observed directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current state; `Disabled` once stopped
    #[must_use]
    pub fn state(&self) -> WatchState {
        if self.worker.is_some() {
            WatchState::Active(self.mode)
        } else {
            WatchState::Disabled
        }
    }

    /// Stop observing and wait, bounded, for the worker to finish
    ///
    /// Returns `true` if the worker finished in time. A worker that does not
    /// finish is abandoned. Idempotent.
    pub fn stop(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return true;
        };

        info!(path = %self.dir.display(), "closing file system watcher");
        self.backend.stop();
        self.stopping.store(true, Ordering::Release);
        let _ = self.tx.send(WorkerMsg::Stop);

        match self.done_rx.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.join().is_err() {
                    warn!("file system watch worker panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout = ?self.stop_timeout,
                    "file system watch worker did not stop in time; abandoning it"
                );
                false
            }
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("dir", &self.dir)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn start_backend(
    backend: &mut dyn WatchBackend,
    dir: &Path,
    mode: WatchMode,
    tx: &Sender<WorkerMsg>,
) -> Result<(), WatchError> {
    info!(path = %dir.display(), %mode, "will observe file system");
    backend.start(dir, mode, EventSink::new(tx.clone()))
}

fn run_worker(
    rx: &Receiver<WorkerMsg>,
    filter: &PathFilter,
    trigger: &dyn RerunTrigger,
    stopping: &AtomicBool,
) {
    while let Ok(msg) = rx.recv() {
        let event = match msg {
            WorkerMsg::Event(event) => event,
            WorkerMsg::Stop => break,
        };
        if stopping.load(Ordering::Acquire) {
            break;
        }
        if !filter.matches(&event.path) {
            trace!(path = %event.path.display(), "ignoring file system event");
            continue;
        }
        info!(kind = ?event.kind, path = %event.path.display(), "file system event");
        trigger.rerun(&event);
    }
    debug!("file system watch worker finished");
}
