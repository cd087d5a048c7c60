//! OS-level backend built on the `notify` crate.

use crate::backend::{EventSink, FsEvent, FsEventKind, WatchBackend, WatchError, WatchMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tracing::{debug, warn};

/// Backend using the platform's recommended notification mechanism
#[derive(Default)]
pub struct NotifyBackend {
    watcher: Option<RecommendedWatcher>,
}

impl NotifyBackend {
    /// Create an idle backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend")
            .field("running", &self.watcher.is_some())
            .finish()
    }
}

fn event_kind(kind: &EventKind) -> Option<FsEventKind> {
    match kind {
        EventKind::Create(_) => Some(FsEventKind::Created),
        EventKind::Modify(_) => Some(FsEventKind::Modified),
        EventKind::Remove(_) => Some(FsEventKind::Removed),
        // Reads do not change content; the re-run itself reads the source.
        EventKind::Access(_) => None,
        EventKind::Any | EventKind::Other => Some(FsEventKind::Other),
    }
}

const fn recursive_mode(mode: WatchMode) -> RecursiveMode {
    match mode {
        WatchMode::Recursive => RecursiveMode::Recursive,
        WatchMode::Flat => RecursiveMode::NonRecursive,
    }
}

impl WatchBackend for NotifyBackend {
    fn start(&mut self, dir: &Path, mode: WatchMode, sink: EventSink) -> Result<(), WatchError> {
        let start_error = |e: notify::Error| WatchError::Start {
            path: dir.display().to_string(),
            mode,
            reason: e.to_string(),
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let Some(kind) = event_kind(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        if !sink.emit(FsEvent::new(kind, path)) {
                            debug!("watch worker gone; dropping event");
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "file system watch error"),
            }
        })
        .map_err(start_error)?;

        watcher.watch(dir, recursive_mode(mode)).map_err(start_error)?;
        self.watcher = Some(watcher);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the watcher unregisters every watch.
        self.watcher = None;
    }
}
