//! Re-run triggers invoked by the change watcher.

use crate::backend::{FsEvent, WatchError};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::{info, warn};

/// Action taken for every event that passes the filter
///
/// Runs on the watcher's worker thread; the next event is not looked at
/// until this returns.
pub trait RerunTrigger: Send + Sync + 'static {
    /// React to one matching event
    fn rerun(&self, event: &FsEvent);
}

impl<F> RerunTrigger for F
where
    F: Fn(&FsEvent) + Send + Sync + 'static,
{
    fn rerun(&self, event: &FsEvent) {
        self(event);
    }
}

/// Re-launches a report's original command in its original directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRelauncher {
    command: Vec<String>,
    cwd: PathBuf,
}

impl CommandRelauncher {
    /// Create from an argument list and working directory
    #[must_use]
    pub fn new(command: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command,
            cwd: cwd.into(),
        }
    }

    /// Argument list
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Working directory
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Spawn the command and wait for it to exit
    ///
    /// # Errors
    ///
    /// Returns error if the command is empty or cannot be spawned
    pub fn run(&self) -> Result<ExitStatus, WatchError> {
        let (program, args) = self.command.split_first().ok_or_else(|| WatchError::Launch {
            command: String::new(),
            reason: "empty command line".to_string(),
        })?;

        // The host's stdin may carry the delta stream; the child gets none.
        // Waiting reaps the child; nothing is left defunct.
        Command::new(program)
            .args(args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| WatchError::Launch {
                command: program.clone(),
                reason: e.to_string(),
            })
    }
}

impl RerunTrigger for CommandRelauncher {
    fn rerun(&self, event: &FsEvent) {
        info!(
            kind = ?event.kind,
            path = %event.path.display(),
            cwd = %self.cwd.display(),
            "re-running report"
        );
        match self.run() {
            Ok(status) if status.success() => info!("report re-run finished"),
            Ok(status) => warn!(%status, "report re-run exited unsuccessfully"),
            Err(e) => warn!(error = %e, "report re-run failed"),
        }
    }
}
