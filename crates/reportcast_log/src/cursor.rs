//! Per-viewer cursors over a delta log.
//!
//! A cursor is split in two halves sharing one lock. The session keeps the
//! [`CursorFeed`] and pushes live deltas into it; the viewer's connection
//! handler owns the [`SubscriberCursor`] and reads from it.
//!
//! The feed only holds a weak reference. Dropping the reader frees its
//! buffer, and the feed reports itself detached from then on.

use crate::delta::Delta;
use crate::log::DeltaLog;
use reportcast_core::SubscriberId;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct CursorState {
    log: DeltaLog,
    read: usize,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<CursorState>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CursorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of waiting on a cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recv {
    /// The next unread delta
    Delta(Delta),
    /// Nothing arrived before the timeout
    Idle,
    /// The producer is gone and every delta has been read
    EndOfStream,
}

/// Writing half of a cursor, held by the session
#[derive(Debug, Clone)]
pub struct CursorFeed {
    id: SubscriberId,
    shared: Weak<Shared>,
}

impl CursorFeed {
    /// Id of the subscriber this feed belongs to
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether the reading half is still alive
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.shared.strong_count() > 0
    }

    /// Append a live delta and wake the reader
    ///
    /// Returns `false` if the cursor's log is already closed or the reader
    /// has been dropped.
    pub fn push(&self, delta: Delta) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let accepted = shared.lock().log.append(delta);
        if accepted {
            shared.ready.notify_all();
        }
        accepted
    }

    /// Signal end-of-stream to the reader. Idempotent.
    pub fn close(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.lock().log.close();
            shared.ready.notify_all();
        }
    }

    /// Number of deltas the cursor holds, read or not; zero once dropped
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.upgrade().map_or(0, |shared| shared.lock().log.len())
    }

    /// Whether the cursor holds no deltas
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reading half of a cursor, owned by one viewer connection
#[derive(Debug)]
pub struct SubscriberCursor {
    id: SubscriberId,
    shared: Arc<Shared>,
}

impl SubscriberCursor {
    /// Build a cursor seeded with `seed`, returning both halves
    ///
    /// The seed is usually a clone of a session's master log, so the reader
    /// starts with a full replay of history.
    #[must_use]
    pub fn seeded(id: SubscriberId, seed: DeltaLog) -> (CursorFeed, Self) {
        let shared = Arc::new(Shared {
            state: Mutex::new(CursorState { log: seed, read: 0 }),
            ready: Condvar::new(),
        });
        let feed = CursorFeed {
            id,
            shared: Arc::downgrade(&shared),
        };
        (feed, Self { id, shared })
    }

    /// Subscriber id
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next unread delta, without waiting
    pub fn try_next(&mut self) -> Option<Delta> {
        let mut state = self.shared.lock();
        let delta = state.log.get(state.read).cloned()?;
        state.read += 1;
        Some(delta)
    }

    /// Every unread delta, in order
    pub fn pending(&mut self) -> Vec<Delta> {
        let mut state = self.shared.lock();
        let unread = state.log.since(state.read).to_vec();
        state.read += unread.len();
        unread
    }

    /// Wait up to `timeout` for the next delta
    pub fn next_timeout(&mut self, timeout: Duration) -> Recv {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if let Some(delta) = state.log.get(state.read).cloned() {
                state.read += 1;
                return Recv::Delta(delta);
            }
            if state.log.is_closed() {
                return Recv::EndOfStream;
            }
            let now = Instant::now();
            if now >= deadline {
                return Recv::Idle;
            }
            state = self
                .shared
                .ready
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Whether the stream is closed and fully read
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        let state = self.shared.lock();
        state.log.is_closed() && state.read >= state.log.len()
    }

    /// Number of deltas handed out so far
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.shared.lock().read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn delta(n: u8) -> Delta {
        Delta::from(vec![n])
    }

    fn seeded_with(n: u8) -> (CursorFeed, SubscriberCursor) {
        SubscriberCursor::seeded(SubscriberId::new(), (0..n).map(delta).collect())
    }

    #[test]
    fn test_replay_then_live() {
        let (feed, mut cursor) = seeded_with(2);
        feed.push(delta(2));

        assert_eq!(cursor.try_next(), Some(delta(0)));
        assert_eq!(cursor.pending(), vec![delta(1), delta(2)]);
        assert_eq!(cursor.try_next(), None);
        assert_eq!(cursor.delivered(), 3);
    }

    #[test]
    fn test_ids_match() {
        let (feed, cursor) = seeded_with(0);
        assert_eq!(feed.id(), cursor.id());
    }

    #[test]
    fn test_end_of_stream_after_close() {
        let (feed, mut cursor) = seeded_with(1);
        feed.close();
        assert!(!feed.push(delta(9)));

        assert!(!cursor.is_end_of_stream());
        assert_eq!(cursor.next_timeout(Duration::from_millis(10)), Recv::Delta(delta(0)));
        assert_eq!(cursor.next_timeout(Duration::from_millis(10)), Recv::EndOfStream);
        assert!(cursor.is_end_of_stream());
    }

    #[test]
    fn test_idle_on_timeout() {
        let (_feed, mut cursor) = seeded_with(0);
        assert_eq!(cursor.next_timeout(Duration::from_millis(5)), Recv::Idle);
    }

    #[test]
    fn test_wakes_on_push() {
        let (feed, mut cursor) = seeded_with(0);
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            feed.push(delta(7));
        });
        assert_eq!(cursor.next_timeout(Duration::from_secs(5)), Recv::Delta(delta(7)));
        writer.join().unwrap();
    }

    #[test]
    fn test_dropped_reader_detaches_feed() {
        let (feed, cursor) = seeded_with(3);
        assert!(feed.is_attached());
        drop(cursor);

        assert!(!feed.is_attached());
        assert!(!feed.push(delta(9)));
        assert_eq!(feed.len(), 0);
        feed.close();
    }

    #[test]
    fn test_seed_is_independent_of_source() {
        let mut master: DeltaLog = (0..2).map(delta).collect();
        let (feed, mut cursor) = SubscriberCursor::seeded(SubscriberId::new(), master.clone());
        master.append(delta(5));
        assert_eq!(feed.len(), 2);
        assert_eq!(cursor.pending().len(), 2);
    }
}
