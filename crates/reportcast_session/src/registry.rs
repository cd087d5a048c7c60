//! Session registry.
//!
//! Process-wide table of live sessions. The host creates one at startup,
//! passes it wherever sessions are looked up, and calls
//! [`SessionRegistry::shutdown_all`] before exiting.

use crate::session::ReportSession;
use indexmap::IndexMap;
use reportcast_core::{CoreError, SessionId};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::info;

/// Error from registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A session with this id is already registered
    #[error("Session already registered: {0}")]
    AlreadyRegistered(SessionId),

    /// No session with this id
    #[error("Session not found: {0}")]
    NotFound(SessionId),
}

impl From<RegistryError> for CoreError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyRegistered(id) => CoreError::AlreadyExists {
                kind: "Session".to_string(),
                id: id.to_string(),
            },
            RegistryError::NotFound(id) => CoreError::NotFound {
                kind: "Session".to_string(),
                id: id.to_string(),
            },
        }
    }
}

/// Thread-safe table of live sessions, in registration order
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<IndexMap<SessionId, Arc<ReportSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<SessionId, Arc<ReportSession>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<SessionId, Arc<ReportSession>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a session
    ///
    /// # Errors
    ///
    /// Returns error if a session with the same id is registered
    pub fn register(&self, session: ReportSession) -> Result<Arc<ReportSession>, RegistryError> {
        let id = session.id().clone();
        let mut sessions = self.write();
        if sessions.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        let session = Arc::new(session);
        sessions.insert(id, Arc::clone(&session));
        Ok(session)
    }

    /// Look up a session
    ///
    /// # Errors
    ///
    /// Returns error if no session has this id
    pub fn get(&self, id: &SessionId) -> Result<Arc<ReportSession>, RegistryError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Remove a session without shutting it down
    ///
    /// # Errors
    ///
    /// Returns error if no session has this id
    pub fn remove(&self, id: &SessionId) -> Result<Arc<ReportSession>, RegistryError> {
        self.write()
            .shift_remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Registered ids, in registration order
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.read().keys().cloned().collect()
    }

    /// Number of registered sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no session is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// End expired grace periods, then discard every eligible session
    ///
    /// Discarded sessions are shut down after the table lock is released.
    /// Returns their ids.
    pub fn reap(&self, now: Instant) -> Vec<SessionId> {
        for session in self.read().values() {
            if session.grace_expired(now) {
                session.end_grace_period();
            }
        }

        let mut removed = Vec::new();
        self.write().retain(|_, session| {
            if session.eligible_for_teardown() {
                removed.push(Arc::clone(session));
                false
            } else {
                true
            }
        });

        removed
            .into_iter()
            .map(|session| {
                info!(session = %session.id(), "deregistering report session");
                session.shutdown();
                session.id().clone()
            })
            .collect()
    }

    /// Shut down and forget every session
    pub fn shutdown_all(&self) {
        let sessions: Vec<Arc<ReportSession>> =
            self.write().drain(..).map(|(_, session)| session).collect();
        for session in sessions {
            session.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionDescriptor;
    use reportcast_core::ProxyConfig;
    use reportcast_watch::ManualBackend;
    use std::time::Duration;

    fn session(id: &str) -> ReportSession {
        ReportSession::detached(
            SessionDescriptor::new(id, "/reports/app.py", "/reports", vec!["true".to_string()]),
            id,
        )
    }

    #[test]
    fn test_register_and_get() {
        let registry = SessionRegistry::new();
        registry.register(session("a")).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&SessionId::from("a")).unwrap().name(), "a");
    }

    #[test]
    fn test_register_duplicate() {
        let registry = SessionRegistry::new();
        registry.register(session("a")).unwrap();
        let err = registry.register(session("a")).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered(SessionId::from("a")));
    }

    #[test]
    fn test_get_not_found() {
        let registry = SessionRegistry::new();
        let err = registry.get(&SessionId::from("missing")).unwrap_err();
        let core: CoreError = err.into();
        assert!(matches!(core, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_remove_keeps_order() {
        let registry = SessionRegistry::new();
        for id in ["a", "b", "c"] {
            registry.register(session(id)).unwrap();
        }
        registry.remove(&SessionId::from("b")).unwrap();
        assert_eq!(registry.ids(), vec![SessionId::from("a"), SessionId::from("c")]);
        assert!(registry.remove(&SessionId::from("b")).is_err());
    }

    #[test]
    fn test_reap_respects_grace_period() {
        let registry = SessionRegistry::new();
        let s = registry.register(session("a")).unwrap();
        s.mark_producer_gone();

        assert!(registry.reap(Instant::now()).is_empty());
        assert_eq!(registry.len(), 1);

        let deadline = s.grace_deadline().unwrap();
        let removed = registry.reap(deadline + Duration::from_secs(1));
        assert_eq!(removed, vec![SessionId::from("a")]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reap_keeps_watched_sessions() {
        let registry = SessionRegistry::new();
        let s = registry.register(session("a")).unwrap();
        let cursor = s.attach_subscriber();
        s.mark_producer_gone();

        assert!(registry.reap(Instant::now()).is_empty());
        s.detach_subscriber(cursor.id());
        assert_eq!(registry.reap(Instant::now()), vec![SessionId::from("a")]);
    }

    #[test]
    fn test_reap_keeps_live_producer() {
        let registry = SessionRegistry::new();
        let s = registry.register(session("a")).unwrap();
        assert!(registry.reap(s.grace_deadline().unwrap()).is_empty());
        assert!(!s.in_grace_period());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reap_with_unbounded_grace_period() {
        let config =
            ProxyConfig::from_json_str(r#"{"gracePeriodSecs": 18446744073709551615}"#).unwrap();
        assert!(config.validate().is_ok());

        let registry = SessionRegistry::new();
        let s = registry
            .register(ReportSession::new(
                SessionDescriptor::new("a", "/reports/app.py", "/reports", Vec::new()),
                "a",
                &config.without_watching(),
                Box::new(ManualBackend::new()),
            ))
            .unwrap();
        s.mark_producer_gone();

        assert!(registry.reap(Instant::now()).is_empty());
        assert!(s.in_grace_period());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reap_forgets_dropped_viewers() {
        let registry = SessionRegistry::new();
        let s = registry.register(session("a")).unwrap();
        drop(s.attach_subscriber());
        s.end_grace_period();
        s.mark_producer_gone();

        assert_eq!(registry.reap(Instant::now()), vec![SessionId::from("a")]);
    }

    #[test]
    fn test_shutdown_all() {
        let registry = SessionRegistry::new();
        registry.register(session("a")).unwrap();
        registry.register(session("b")).unwrap();
        registry.shutdown_all();
        assert!(registry.is_empty());
    }
}
