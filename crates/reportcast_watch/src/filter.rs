//! Allow/deny path filtering for watch events.

use crate::backend::WatchError;
use glob::Pattern;
use std::path::Path;

/// Decides which paths may trigger a re-run
///
/// A path passes when it matches at least one allow pattern and no deny
/// pattern. `*` also matches `/`, so `*.py` covers every Python file below
/// the watched directory. An empty allow list passes nothing.
#[derive(Debug, Clone)]
pub struct PathFilter {
    allow: Vec<Pattern>,
    deny: Vec<Pattern>,
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, WatchError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| WatchError::Pattern {
                pattern: p.clone(),
                reason: e.msg.to_string(),
            })
        })
        .collect()
}

impl PathFilter {
    /// Compile allow and deny lists
    ///
    /// # Errors
    ///
    /// Returns error for the first pattern that does not compile
    pub fn new(allow: &[String], deny: &[String]) -> Result<Self, WatchError> {
        Ok(Self {
            allow: compile(allow)?,
            deny: compile(deny)?,
        })
    }

    /// Whether `path` should trigger a re-run
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        self.allow.iter().any(|p| p.matches_path(path))
            && !self.deny.iter().any(|p| p.matches_path(path))
    }
}
