//! The set of cursors attached to a session.
//!
//! A viewer that drops its cursor without detaching counts as detached.
//! Its feed is pruned on the next broadcast or [`SubscriberSet::prune`].

use reportcast_core::SubscriberId;
use reportcast_log::{CursorFeed, Delta, DeltaLog, SubscriberCursor};

/// Feeding halves of every attached cursor
#[derive(Debug, Default)]
pub struct SubscriberSet {
    feeds: Vec<CursorFeed>,
}

impl SubscriberSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new cursor seeded with `seed`, returning the reading half
    pub fn attach(&mut self, seed: DeltaLog) -> SubscriberCursor {
        let (feed, cursor) = SubscriberCursor::seeded(SubscriberId::new(), seed);
        self.feeds.push(feed);
        cursor
    }

    /// Detach a cursor by id; `false` if it was never attached
    pub fn detach(&mut self, id: SubscriberId) -> bool {
        let before = self.feeds.len();
        self.feeds.retain(|feed| feed.id() != id);
        self.feeds.len() != before
    }

    /// Forget feeds whose reader has been dropped; returns how many
    pub fn prune(&mut self) -> usize {
        let before = self.feeds.len();
        self.feeds.retain(CursorFeed::is_attached);
        before - self.feeds.len()
    }

    /// Push a delta to every attached cursor
    pub fn broadcast(&mut self, delta: &Delta) {
        self.prune();
        for feed in &self.feeds {
            feed.push(delta.clone());
        }
    }

    /// Signal end-of-stream to every attached cursor
    pub fn close_all(&self) {
        for feed in &self.feeds {
            feed.close();
        }
    }

    /// Whether `id` is attached
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.feeds.iter().any(|feed| feed.id() == id && feed.is_attached())
    }

    /// Ids of attached cursors, in attach order
    #[must_use]
    pub fn ids(&self) -> Vec<SubscriberId> {
        self.feeds
            .iter()
            .filter(|feed| feed.is_attached())
            .map(CursorFeed::id)
            .collect()
    }

    /// Number of attached cursors whose reader is still alive
    #[must_use]
    pub fn len(&self) -> usize {
        self.feeds.iter().filter(|feed| feed.is_attached()).count()
    }

    /// Whether no live cursor is attached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
