//! Append-only delta log.
//!
//! The log is a plain value: appending and closing take `&mut self`, cloning
//! takes `&self`. Whoever shares a log across threads wraps it in a lock, and
//! that lock is what makes `clone` atomic with respect to `append`.

use crate::delta::Delta;

/// Ordered sequence of deltas with a closed flag
///
/// `Clone` is a snapshot: the copy holds every delta present at the time of
/// the call and diverges from the source afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaLog {
    deltas: Vec<Delta>,
    closed: bool,
}

impl DeltaLog {
    /// Create an empty, open log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta
    ///
    /// Returns `false` and drops the delta when the log is closed.
    pub fn append(&mut self, delta: Delta) -> bool {
        if self.closed {
            return false;
        }
        self.deltas.push(delta);
        true
    }

    /// Take every delta in append order, leaving the log empty
    ///
    /// Allowed on a closed log. The closed flag is untouched.
    pub fn drain(&mut self) -> Vec<Delta> {
        std::mem::take(&mut self.deltas)
    }

    /// Refuse further appends. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether the log has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of stored deltas
    #[must_use]
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// Whether no deltas are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Delta at a position
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Delta> {
        self.deltas.get(index)
    }

    /// Deltas from `start` onwards
    #[must_use]
    pub fn since(&self, start: usize) -> &[Delta] {
        self.deltas.get(start..).unwrap_or(&[])
    }

    /// Iterate in append order
    pub fn iter(&self) -> std::slice::Iter<'_, Delta> {
        self.deltas.iter()
    }
}

impl FromIterator<Delta> for DeltaLog {
    fn from_iter<T: IntoIterator<Item = Delta>>(iter: T) -> Self {
        Self {
            deltas: iter.into_iter().collect(),
            closed: false,
        }
    }
}

impl<'a> IntoIterator for &'a DeltaLog {
    type Item = &'a Delta;
    type IntoIter = std::slice::Iter<'a, Delta>;

    fn into_iter(self) -> Self::IntoIter {
        self.deltas.iter()
    }
}
