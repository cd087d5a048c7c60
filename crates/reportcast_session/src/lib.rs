//! REPORTCAST Sessions
//!
//! Report session coordinator: master delta log, viewer fan-out with full
//! replay for late joiners, lifecycle and teardown rules, re-run on source
//! change, and archive export.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod archive;
pub mod lifecycle;
pub mod registry;
pub mod session;
pub mod subscribers;

pub use archive::{ArchiveEntry, Manifest};
pub use lifecycle::{teardown_eligible, Lifecycle};
pub use registry::{RegistryError, SessionRegistry};
pub use session::{ReportSession, SessionDescriptor};
pub use subscribers::SubscriberSet;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use reportcast_log::{Delta, Recv};
    use std::time::Duration;

    fn descriptor() -> SessionDescriptor {
        SessionDescriptor::new("prop", "/reports/app.py", "/reports", Vec::new())
    }

    proptest::proptest! {
        #[test]
        fn prop_replay_completeness(
            before in proptest::collection::vec(any::<Vec<u8>>(), 0..20),
            after in proptest::collection::vec(any::<Vec<u8>>(), 0..20),
        ) {
            let session = ReportSession::detached(descriptor(), "prop");
            for bytes in &before {
                session.enqueue(Delta::from(bytes.clone()));
            }
            let mut cursor = session.attach_subscriber();
            for bytes in &after {
                session.enqueue(Delta::from(bytes.clone()));
            }
            session.mark_producer_gone();

            let mut received = Vec::new();
            while let Recv::Delta(delta) = cursor.next_timeout(Duration::from_millis(1)) {
                received.push(delta.as_bytes().to_vec());
            }
            let expected: Vec<Vec<u8>> = before.iter().chain(after.iter()).cloned().collect();
            prop_assert_eq!(received, expected);
            prop_assert!(cursor.is_end_of_stream());
        }
    }
}
