//! Session lifecycle flags.
//!
//! A session may be discarded only once its grace period is over, its
//! producer has gone, and nobody is watching. The grace period only ever
//! goes from active to ended.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Teardown rule over plain values
#[must_use]
pub const fn teardown_eligible(in_grace_period: bool, has_producer: bool, subscribers: usize) -> bool {
    !in_grace_period && !has_producer && subscribers == 0
}

/// Producer and grace-period state of one session
#[derive(Debug)]
pub struct Lifecycle {
    has_producer: AtomicBool,
    in_grace_period: AtomicBool,
    created_at: Instant,
    grace_period: Duration,
}

impl Lifecycle {
    /// Fresh lifecycle: producer attached, grace period running
    #[must_use]
    pub fn new(grace_period: Duration) -> Self {
        Self::started_at(Instant::now(), grace_period)
    }

    /// Fresh lifecycle with an explicit creation instant
    #[must_use]
    pub fn started_at(created_at: Instant, grace_period: Duration) -> Self {
        Self {
            has_producer: AtomicBool::new(true),
            in_grace_period: AtomicBool::new(true),
            created_at,
            grace_period,
        }
    }

    /// Whether a producer is still attached
    #[must_use]
    pub fn has_producer(&self) -> bool {
        self.has_producer.load(Ordering::Acquire)
    }

    /// Record that the producer went away; returns whether it was present
    pub fn producer_gone(&self) -> bool {
        self.has_producer.swap(false, Ordering::AcqRel)
    }

    /// Whether the grace period is still running
    #[must_use]
    pub fn in_grace_period(&self) -> bool {
        self.in_grace_period.load(Ordering::Acquire)
    }

    /// End the grace period; returns whether it was running
    pub fn end_grace_period(&self) -> bool {
        self.in_grace_period.swap(false, Ordering::AcqRel)
    }

    /// Instant the session was created
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Instant after which the grace period may be ended by a reaper
    ///
    /// `None` when the period reaches past what `Instant` can represent;
    /// such a grace period never expires.
    #[must_use]
    pub fn grace_deadline(&self) -> Option<Instant> {
        self.created_at.checked_add(self.grace_period)
    }

    /// Whether `now` is past the grace deadline
    #[must_use]
    pub fn grace_expired(&self, now: Instant) -> bool {
        self.grace_deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Teardown rule given the current subscriber count
    #[must_use]
    pub fn eligible(&self, subscribers: usize) -> bool {
        teardown_eligible(self.in_grace_period(), self.has_producer(), subscribers)
    }
}
