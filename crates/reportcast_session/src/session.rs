//! Report session coordinator.
//!
//! Owns the master delta log, the attached cursors, the lifecycle flags, and
//! the change watcher of one report. The master log and the cursor set share
//! one lock, so an append with its fan-out and a subscriber's seed snapshot
//! never interleave: a late viewer sees every delta exactly once.

use crate::archive::{self, ArchiveEntry};
use crate::lifecycle::Lifecycle;
use crate::subscribers::SubscriberSet;
use reportcast_core::{CoreResult, LocalId, ProxyConfig, SessionId, SubscriberId};
use reportcast_log::{Delta, DeltaLog, SubscriberCursor};
use reportcast_watch::{ChangeWatcher, CommandRelauncher, WatchBackend, WatchState};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, info_span, Span};

/// What the producer tells us about a new report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    /// Unique report id
    pub id: SessionId,
    /// Script that produced the report
    pub source_file_path: PathBuf,
    /// Directory the script was launched from
    pub cwd: PathBuf,
    /// Program and arguments used to launch the script
    pub command: Vec<String>,
}

impl SessionDescriptor {
    /// Create a descriptor
    #[must_use]
    pub fn new(
        id: impl Into<SessionId>,
        source_file_path: impl Into<PathBuf>,
        cwd: impl Into<PathBuf>,
        command: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_file_path: source_file_path.into(),
            cwd: cwd.into(),
            command,
        }
    }
}

#[derive(Debug, Default)]
struct FanOut {
    master: DeltaLog,
    subscribers: SubscriberSet,
}

/// One live report session
pub struct ReportSession {
    descriptor: SessionDescriptor,
    name: String,
    local_id: LocalId,
    fanout: Mutex<FanOut>,
    lifecycle: Lifecycle,
    watcher: Mutex<Option<ChangeWatcher>>,
    span: Span,
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ReportSession {
    /// Create a session and start watching its source as `config` asks
    ///
    /// Watching problems are logged and leave the session without a
    /// watcher; creation itself always succeeds.
    pub fn new(
        descriptor: SessionDescriptor,
        name: impl Into<String>,
        config: &ProxyConfig,
        backend: Box<dyn WatchBackend>,
    ) -> Self {
        let span = info_span!("report_session", id = %descriptor.id);
        let watcher = span.in_scope(|| {
            let relauncher =
                CommandRelauncher::new(descriptor.command.clone(), descriptor.cwd.clone());
            ChangeWatcher::start(&descriptor.source_file_path, config, backend, relauncher)
        });
        Self::assemble(descriptor, name.into(), Lifecycle::new(config.grace_period()), watcher, span)
    }

    /// Create a session that never watches its source
    #[must_use]
    pub fn detached(descriptor: SessionDescriptor, name: impl Into<String>) -> Self {
        let span = info_span!("report_session", id = %descriptor.id);
        let grace = ProxyConfig::default().grace_period();
        Self::assemble(descriptor, name.into(), Lifecycle::new(grace), None, span)
    }

    fn assemble(
        descriptor: SessionDescriptor,
        name: String,
        lifecycle: Lifecycle,
        watcher: Option<ChangeWatcher>,
        span: Span,
    ) -> Self {
        span.in_scope(|| {
            info!(
                name = %name,
                source = %descriptor.source_file_path.display(),
                watching = watcher.is_some(),
                "report session created"
            );
        });
        Self {
            descriptor,
            name,
            local_id: LocalId::process(),
            fanout: Mutex::new(FanOut::default()),
            lifecycle,
            watcher: Mutex::new(watcher),
            span,
        }
    }

    /// Session id
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.descriptor.id
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Launch details
    #[must_use]
    pub fn descriptor(&self) -> &SessionDescriptor {
        &self.descriptor
    }

    /// Append a delta and fan it out to every attached cursor
    ///
    /// Returns `false` when the producer has already gone; the delta is
    /// dropped.
    pub fn enqueue(&self, delta: Delta) -> bool {
        let mut fanout = relock(&self.fanout);
        if !fanout.master.append(delta.clone()) {
            let _entered = self.span.enter();
            debug!("dropping delta enqueued after close");
            return false;
        }
        fanout.subscribers.broadcast(&delta);
        true
    }

    /// Attach a viewer; its cursor replays the full history then goes live
    ///
    /// Ends the grace period.
    pub fn attach_subscriber(&self) -> SubscriberCursor {
        self.lifecycle.end_grace_period();
        let mut fanout = relock(&self.fanout);
        let seed = fanout.master.clone();
        let replay = seed.len();
        let cursor = fanout.subscribers.attach(seed);
        let attached = fanout.subscribers.len();
        drop(fanout);

        let _entered = self.span.enter();
        info!(subscriber = %cursor.id(), replay, attached, "subscriber attached");
        cursor
    }

    /// Detach a viewer; `false` if `id` is not attached
    pub fn detach_subscriber(&self, id: SubscriberId) -> bool {
        let removed = relock(&self.fanout).subscribers.detach(id);
        let _entered = self.span.enter();
        if removed {
            info!(subscriber = %id, "subscriber detached");
        } else {
            debug!(subscriber = %id, "detach of unknown subscriber");
        }
        removed
    }

    /// The producer is done: close the master log and end every stream
    pub fn mark_producer_gone(&self) {
        let was_present = self.lifecycle.producer_gone();
        {
            let mut fanout = relock(&self.fanout);
            fanout.master.close();
            fanout.subscribers.close_all();
        }
        let _entered = self.span.enter();
        if was_present {
            info!(deltas = self.delta_count(), "producer finished");
        }
    }

    /// End the grace period early
    pub fn end_grace_period(&self) {
        if self.lifecycle.end_grace_period() {
            let _entered = self.span.enter();
            debug!("grace period ended");
        }
    }

    /// Whether the session may be discarded
    ///
    /// Cursors dropped without detaching are forgotten first.
    #[must_use]
    pub fn eligible_for_teardown(&self) -> bool {
        let (pruned, subscribers) = {
            let mut fanout = relock(&self.fanout);
            let pruned = fanout.subscribers.prune();
            (pruned, fanout.subscribers.len())
        };
        if pruned > 0 {
            let _entered = self.span.enter();
            debug!(pruned, "forgot dropped subscribers");
        }
        self.lifecycle.eligible(subscribers)
    }

    /// Archive entries for the report so far; the live log is untouched
    ///
    /// # Errors
    ///
    /// Returns error if the manifest cannot be encoded
    pub fn export_archive(&self) -> CoreResult<Vec<ArchiveEntry>> {
        let mut snapshot = relock(&self.fanout).master.clone();
        archive::build_entries(self.id(), &self.name, self.local_id, snapshot.drain())
    }

    /// Stop the change watcher, waiting a bounded time. Idempotent.
    ///
    /// Returns `false` if the watcher worker had to be abandoned.
    pub fn shutdown(&self) -> bool {
        let watcher = relock(&self.watcher).take();
        match watcher {
            Some(mut watcher) => {
                let _entered = self.span.enter();
                watcher.stop()
            }
            None => true,
        }
    }

    /// Number of deltas in the master log
    #[must_use]
    pub fn delta_count(&self) -> usize {
        relock(&self.fanout).master.len()
    }

    /// Number of attached cursors
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        relock(&self.fanout).subscribers.len()
    }

    /// Whether the producer is still attached
    #[must_use]
    pub fn has_producer(&self) -> bool {
        self.lifecycle.has_producer()
    }

    /// Whether the grace period is running
    #[must_use]
    pub fn in_grace_period(&self) -> bool {
        self.lifecycle.in_grace_period()
    }

    /// When a reaper may end the grace period; `None` if never
    #[must_use]
    pub fn grace_deadline(&self) -> Option<Instant> {
        self.lifecycle.grace_deadline()
    }

    /// Whether the grace period is running and `now` is past its deadline
    #[must_use]
    pub fn grace_expired(&self, now: Instant) -> bool {
        self.lifecycle.in_grace_period() && self.lifecycle.grace_expired(now)
    }

    /// State of the change watcher
    #[must_use]
    pub fn watch_state(&self) -> WatchState {
        relock(&self.watcher)
            .as_ref()
            .map_or(WatchState::Disabled, ChangeWatcher::state)
    }

    /// Span that session-scoped log lines are recorded in
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl std::fmt::Debug for ReportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportSession")
            .field("id", self.id())
            .field("name", &self.name)
            .field("deltas", &self.delta_count())
            .field("subscribers", &self.subscriber_count())
            .field("has_producer", &self.has_producer())
            .field("in_grace_period", &self.in_grace_period())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Manifest;
    use reportcast_log::Recv;
    use reportcast_watch::{ManualBackend, WatchMode};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn descriptor(id: &str) -> SessionDescriptor {
        SessionDescriptor::new(
            id,
            "/reports/app.py",
            "/reports",
            vec!["python".to_string(), "app.py".to_string()],
        )
    }

    fn delta(bytes: &[u8]) -> Delta {
        Delta::from(bytes.to_vec())
    }

    fn drain_all(cursor: &mut SubscriberCursor) -> Vec<Delta> {
        let mut seen = Vec::new();
        loop {
            match cursor.next_timeout(Duration::from_millis(5)) {
                Recv::Delta(d) => seen.push(d),
                Recv::Idle | Recv::EndOfStream => return seen,
            }
        }
    }

    #[test]
    fn test_new_session_state() {
        let session = ReportSession::detached(descriptor("abc"), "demo");
        assert_eq!(session.id().as_str(), "abc");
        assert_eq!(session.name(), "demo");
        assert!(session.has_producer());
        assert!(session.in_grace_period());
        assert_eq!(session.delta_count(), 0);
        assert_eq!(session.subscriber_count(), 0);
        assert_eq!(session.watch_state(), WatchState::Disabled);
        assert!(!session.eligible_for_teardown());
    }

    #[test]
    fn test_late_subscriber_gets_full_replay_then_live() {
        let session = ReportSession::detached(descriptor("abc"), "demo");
        session.enqueue(delta(b"d0"));
        session.enqueue(delta(b"d1"));

        let mut cursor = session.attach_subscriber();
        session.enqueue(delta(b"d2"));
        session.mark_producer_gone();

        assert_eq!(
            drain_all(&mut cursor),
            vec![delta(b"d0"), delta(b"d1"), delta(b"d2")]
        );
        assert!(cursor.is_end_of_stream());
    }

    #[test]
    fn test_attach_ends_grace_period_with_producer_present() {
        let session = ReportSession::detached(descriptor("abc"), "demo");
        let _cursor = session.attach_subscriber();
        assert!(!session.in_grace_period());
        assert!(session.has_producer());
    }

    #[test]
    fn test_enqueue_after_producer_gone_is_dropped() {
        let session = ReportSession::detached(descriptor("abc"), "demo");
        session.enqueue(delta(b"d0"));
        session.mark_producer_gone();
        let before = session.export_archive().unwrap();

        assert!(!session.enqueue(delta(b"late")));
        assert_eq!(session.export_archive().unwrap(), before);
        assert_eq!(session.delta_count(), 1);
    }

    #[test]
    fn test_subscriber_after_producer_gone_replays_and_ends() {
        let session = ReportSession::detached(descriptor("abc"), "demo");
        session.enqueue(delta(b"d0"));
        session.mark_producer_gone();

        let mut cursor = session.attach_subscriber();
        assert_eq!(drain_all(&mut cursor), vec![delta(b"d0")]);
        assert!(cursor.is_end_of_stream());
    }

    #[test]
    fn test_producer_gone_closes_attached_cursors() {
        let session = ReportSession::detached(descriptor("abc"), "demo");
        let mut cursor = session.attach_subscriber();
        session.mark_producer_gone();
        assert_eq!(cursor.next_timeout(Duration::from_millis(5)), Recv::EndOfStream);
    }

    #[test]
    fn test_teardown_eligibility() {
        let session = ReportSession::detached(descriptor("abc"), "demo");
        assert!(!session.eligible_for_teardown());

        session.end_grace_period();
        assert!(!session.eligible_for_teardown(), "producer still present");

        let cursor = session.attach_subscriber();
        session.mark_producer_gone();
        assert!(!session.eligible_for_teardown(), "subscriber still attached");

        assert!(session.detach_subscriber(cursor.id()));
        assert!(session.eligible_for_teardown());
    }

    #[test]
    fn test_grace_period_blocks_teardown() {
        let session = ReportSession::detached(descriptor("abc"), "demo");
        session.mark_producer_gone();
        assert!(!session.eligible_for_teardown());
        session.end_grace_period();
        assert!(session.eligible_for_teardown());
    }

    #[test]
    fn test_dropped_cursor_counts_as_detached() {
        let session = ReportSession::detached(descriptor("abc"), "demo");
        let cursor = session.attach_subscriber();
        assert_eq!(session.subscriber_count(), 1);
        drop(cursor);

        assert_eq!(session.subscriber_count(), 0);
        session.mark_producer_gone();
        assert!(session.eligible_for_teardown());
        assert!(!session.enqueue(delta(b"late")));
    }

    #[test]
    fn test_detach_unknown_subscriber() {
        let session = ReportSession::detached(descriptor("abc"), "demo");
        assert!(!session.detach_subscriber(SubscriberId::new()));
    }

    #[test]
    fn test_archive_shape() {
        let session = ReportSession::detached(descriptor("abc"), "demo");
        session.enqueue(delta(b"b0"));
        session.enqueue(delta(b"b1"));
        session.enqueue(delta(b"b2"));

        let entries = session.export_archive().unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].path, "reports/abc/manifest.json");
        let manifest: Manifest = serde_json::from_slice(&entries[0].content).unwrap();
        assert_eq!(
            manifest,
            Manifest {
                name: "demo".to_string(),
                local_id: LocalId::process().to_string(),
                n_deltas: 3,
            }
        );
        for (i, expected) in [b"b0", b"b1", b"b2"].iter().enumerate() {
            assert_eq!(entries[i + 1].path, format!("reports/abc/{}.delta", i));
            assert_eq!(entries[i + 1].content.as_ref(), expected.as_slice());
        }

        // Export leaves the live log intact.
        assert_eq!(session.delta_count(), 3);
        assert_eq!(session.export_archive().unwrap().len(), 4);
    }

    #[test]
    fn test_watcher_falls_back_to_flat() {
        let backend = ManualBackend::new().failing(WatchMode::Recursive);
        let session = ReportSession::new(
            descriptor("abc"),
            "demo",
            &ProxyConfig::default(),
            Box::new(backend),
        );
        assert_eq!(session.watch_state(), WatchState::Active(WatchMode::Flat));
        assert!(session.shutdown());
        assert_eq!(session.watch_state(), WatchState::Disabled);
    }

    #[test]
    fn test_watcher_failure_still_creates_session() {
        let backend = ManualBackend::new()
            .failing(WatchMode::Recursive)
            .failing(WatchMode::Flat);
        let session = ReportSession::new(
            descriptor("abc"),
            "demo",
            &ProxyConfig::default(),
            Box::new(backend),
        );
        assert_eq!(session.watch_state(), WatchState::Disabled);
        session.enqueue(delta(b"d0"));
        assert_eq!(session.export_archive().unwrap().len(), 2);
    }

    #[test]
    fn test_watching_turned_off() {
        let backend = ManualBackend::new();
        let handle = backend.handle();
        let session = ReportSession::new(
            descriptor("abc"),
            "demo",
            &ProxyConfig::default().without_watching(),
            Box::new(backend),
        );
        assert_eq!(session.watch_state(), WatchState::Disabled);
        assert!(handle.attempts().is_empty());
    }

    #[test]
    fn test_shutdown_idempotent() {
        let backend = ManualBackend::new();
        let handle = backend.handle();
        let session = ReportSession::new(
            descriptor("abc"),
            "demo",
            &ProxyConfig::default(),
            Box::new(backend),
        );
        assert_eq!(session.watch_state(), WatchState::Active(WatchMode::Recursive));
        assert!(session.shutdown());
        assert!(session.shutdown());
        assert_eq!(handle.stop_calls(), 1);
    }

    #[test]
    fn test_concurrent_enqueue_and_attach() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;

        let session = Arc::new(ReportSession::detached(descriptor("abc"), "demo"));
        let mut producers = Vec::new();
        for p in 0..PRODUCERS {
            let session = Arc::clone(&session);
            producers.push(thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    session.enqueue(Delta::from(format!("{}:{}", p, i).into_bytes()));
                }
            }));
        }
        let attacher = {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(1));
                session.attach_subscriber()
            })
        };

        for producer in producers {
            producer.join().unwrap();
        }
        let mut cursor = attacher.join().unwrap();
        session.mark_producer_gone();

        let received = drain_all(&mut cursor);
        let master: Vec<Delta> = session
            .export_archive()
            .unwrap()
            .into_iter()
            .skip(1)
            .map(|entry| Delta::from(entry.content))
            .collect();

        assert_eq!(received.len(), PRODUCERS * PER_PRODUCER);
        assert_eq!(received, master);
        let unique: HashSet<&Delta> = received.iter().collect();
        assert_eq!(unique.len(), received.len());
    }
}
