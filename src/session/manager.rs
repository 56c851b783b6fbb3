//! Session registry with capacity eviction and bounded history

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;

use super::{
    Session, SessionAnalytics, SessionConfig, SessionExport, SessionStatus, SessionsSummary,
};
use crate::{Error, Result};

/// Outcome of admitting a new session
#[derive(Debug)]
pub struct Admission {
    /// The newly created session
    pub session: Session,
    /// Sessions ended to make room (replaced, idle, or evicted)
    pub ended: Vec<Session>,
}

#[derive(Debug, Default)]
struct Registry {
    /// Active sessions keyed by client ID
    active: HashMap<String, Session>,
    /// Session ID to client ID for active sessions
    by_id: HashMap<String, String>,
    /// Ended sessions, oldest first
    history: VecDeque<Session>,
    /// Per-session turn gates keyed by session ID
    gates: HashMap<String, Arc<AsyncMutex<()>>>,
}

impl Registry {
    fn active_by_id_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        let client_id = self.by_id.get(session_id)?;
        self.active.get_mut(client_id)
    }

    /// Close an active session and move it into history
    fn retire(
        &mut self,
        client_id: &str,
        status: SessionStatus,
        at: DateTime<Utc>,
        max_history: usize,
    ) -> Option<Session> {
        let mut session = self.active.remove(client_id)?;
        self.by_id.remove(&session.id);
        self.gates.remove(&session.id);
        session.close(status, at);

        self.history.push_back(session.clone());
        while self.history.len() > max_history {
            self.history.pop_front();
        }
        Some(session)
    }

    fn idle_clients(&self, now: DateTime<Utc>, idle_timeout: Duration) -> Vec<String> {
        let limit = chrono::Duration::from_std(idle_timeout).unwrap_or(chrono::Duration::MAX);
        self.active
            .values()
            .filter(|s| now - s.started_at > limit)
            .map(|s| s.client_id.clone())
            .collect()
    }

    fn oldest_client(&self) -> Option<String> {
        self.active
            .values()
            .min_by_key(|s| s.started_at)
            .map(|s| s.client_id.clone())
    }
}

/// Owns all live sessions and a bounded history of ended ones
///
/// One coarse lock guards the registry. Every critical section is short and
/// synchronous; nothing awaits while holding it. Per-session turn gates are
/// handed out separately so the pipeline can serialize fragments of one
/// session without blocking other sessions.
#[derive(Debug)]
pub struct SessionManager {
    config: SessionConfig,
    registry: RwLock<Registry>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionManager {
    /// Create an empty manager
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(Registry::default()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a session for `client_id`
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if no slot can be freed
    pub fn create(&self, client_id: &str, user_id: Option<&str>) -> Result<Session> {
        self.admit(client_id, user_id).map(|a| a.session)
    }

    /// Create a session and report every session ended to make room
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if no slot can be freed
    pub fn admit(&self, client_id: &str, user_id: Option<&str>) -> Result<Admission> {
        self.admit_at(client_id, user_id, Utc::now())
    }

    /// Create a session as of `now`
    ///
    /// An existing active session for the same client is ended first. At the
    /// ceiling, idle sessions are swept, then the oldest-started sessions are
    /// evicted until a slot is free.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if no slot can be freed
    pub fn admit_at(
        &self,
        client_id: &str,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        let mut registry = self.write();
        self.admit_locked(&mut registry, client_id, user_id, now)
    }

    /// Active session for a client, created if there is none
    ///
    /// Lookup and creation happen under one registry lock, so concurrent
    /// first fragments from a client share a single session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if no slot can be freed
    pub fn get_or_admit(&self, client_id: &str, user_id: Option<&str>) -> Result<Admission> {
        let mut registry = self.write();
        if let Some(session) = registry.active.get(client_id) {
            return Ok(Admission {
                session: session.clone(),
                ended: Vec::new(),
            });
        }
        self.admit_locked(&mut registry, client_id, user_id, Utc::now())
    }

    fn admit_locked(
        &self,
        registry: &mut Registry,
        client_id: &str,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        let ceiling = self.config.max_active;
        let max_history = self.config.max_history;
        let mut ended = Vec::new();

        if let Some(previous) = registry.retire(client_id, SessionStatus::Ended, now, max_history) {
            tracing::info!(
                client = client_id,
                session = %previous.id,
                "replacing active session"
            );
            ended.push(previous);
        }

        if registry.active.len() >= ceiling {
            for idle in registry.idle_clients(now, self.config.idle_timeout) {
                ended.extend(registry.retire(&idle, SessionStatus::Ended, now, max_history));
            }
        }

        while registry.active.len() >= ceiling {
            let Some(oldest) = registry.oldest_client() else {
                break;
            };
            if let Some(evicted) =
                registry.retire(&oldest, SessionStatus::Ended, now, max_history)
            {
                tracing::warn!(
                    session = %evicted.id,
                    client = %oldest,
                    "evicted session at capacity"
                );
                ended.push(evicted);
            }
        }

        if registry.active.len() >= ceiling {
            tracing::error!(ceiling, "no session slot could be freed");
            return Err(Error::CapacityExceeded {
                active: registry.active.len(),
                ceiling,
            });
        }

        let session = Session::new(client_id, user_id, self.config.context_turns, now);
        registry
            .by_id
            .insert(session.id.clone(), client_id.to_string());
        registry
            .gates
            .insert(session.id.clone(), Arc::new(AsyncMutex::new(())));
        registry.active.insert(client_id.to_string(), session.clone());

        tracing::info!(session = %session.id, client = client_id, "created session");
        Ok(Admission { session, ended })
    }

    /// Active session for a client
    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<Session> {
        self.read().active.get(client_id).cloned()
    }

    /// Active session by session ID
    #[must_use]
    pub fn get_by_id(&self, session_id: &str) -> Option<Session> {
        let registry = self.read();
        let client_id = registry.by_id.get(session_id)?;
        registry.active.get(client_id).cloned()
    }

    /// End a client's active session normally
    ///
    /// Returns `None` if the client has no active session.
    pub fn end(&self, client_id: &str) -> Option<Session> {
        self.close(client_id, SessionStatus::Ended)
    }

    /// End a client's active session with error status
    pub fn abort(&self, client_id: &str) -> Option<Session> {
        self.close(client_id, SessionStatus::Error)
    }

    fn close(&self, client_id: &str, status: SessionStatus) -> Option<Session> {
        let session = self
            .write()
            .retire(client_id, status, Utc::now(), self.config.max_history)?;
        tracing::info!(session = %session.id, client = client_id, %status, "ended session");
        Some(session)
    }

    /// Append an exchange to a client's active session
    ///
    /// Returns `false` when the client has no active session.
    pub fn add_interaction(
        &self,
        client_id: &str,
        user_text: &str,
        reply_text: &str,
        confidence: f32,
    ) -> bool {
        let mut registry = self.write();
        let Some(session) = registry.active.get_mut(client_id) else {
            tracing::warn!(client = client_id, "no active session for interaction");
            return false;
        };
        session.add_interaction(user_text, reply_text, confidence, Utc::now());
        tracing::debug!(session = %session.id, "added interaction");
        true
    }

    /// Append an exchange to an active session by session ID
    ///
    /// Returns `false` when the session is no longer active.
    pub fn record_exchange(
        &self,
        session_id: &str,
        user_text: &str,
        reply_text: &str,
        confidence: f32,
    ) -> bool {
        let mut registry = self.write();
        let Some(session) = registry.active_by_id_mut(session_id) else {
            tracing::debug!(session = session_id, "exchange arrived after session ended");
            return false;
        };
        session.add_interaction(user_text, reply_text, confidence, Utc::now());
        true
    }

    /// Record one fragment's processing latency on an active session
    pub fn record_response_time(&self, session_id: &str, elapsed: Duration) -> bool {
        let mut registry = self.write();
        let Some(session) = registry.active_by_id_mut(session_id) else {
            return false;
        };
        session
            .response_times_ms
            .push(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        true
    }

    /// End every active session started more than the idle timeout before `now`
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> Vec<Session> {
        let mut registry = self.write();
        let swept: Vec<Session> = registry
            .idle_clients(now, self.config.idle_timeout)
            .into_iter()
            .filter_map(|client_id| {
                registry.retire(&client_id, SessionStatus::Ended, now, self.config.max_history)
            })
            .collect();

        if !swept.is_empty() {
            tracing::info!(count = swept.len(), "swept idle sessions");
        }
        swept
    }

    /// End every active session, for shutdown
    pub fn drain(&self) -> Vec<Session> {
        let now = Utc::now();
        let mut registry = self.write();
        let clients: Vec<String> = registry.active.keys().cloned().collect();
        clients
            .iter()
            .filter_map(|c| registry.retire(c, SessionStatus::Ended, now, self.config.max_history))
            .collect()
    }

    /// Gate that serializes fragment processing for one session
    ///
    /// Unknown sessions get a fresh, unshared gate.
    #[must_use]
    pub fn turn_gate(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        self.read()
            .gates
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(AsyncMutex::new(())))
    }

    /// Analytics for a client's session, falling back to its latest ended one
    #[must_use]
    pub fn session_analytics(&self, client_id: &str) -> Option<SessionAnalytics> {
        let now = Utc::now();
        let registry = self.read();
        registry
            .active
            .get(client_id)
            .or_else(|| registry.history.iter().rev().find(|s| s.client_id == client_id))
            .map(|s| s.analytics(now))
    }

    /// Export an active or ended session by ID
    #[must_use]
    pub fn export(&self, session_id: &str) -> Option<SessionExport> {
        let now = Utc::now();
        let registry = self.read();
        registry
            .by_id
            .get(session_id)
            .and_then(|client_id| registry.active.get(client_id))
            .or_else(|| registry.history.iter().rev().find(|s| s.id == session_id))
            .map(|s| s.export(now))
    }

    /// All sessions of a user, active and ended, newest first
    #[must_use]
    pub fn user_sessions(&self, user_id: &str) -> Vec<SessionExport> {
        let now = Utc::now();
        let registry = self.read();
        let mut sessions: Vec<SessionExport> = registry
            .active
            .values()
            .chain(registry.history.iter())
            .filter(|s| s.user_id.as_deref() == Some(user_id))
            .map(|s| s.export(now))
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions
    }

    /// Totals across active and ended sessions
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self) -> SessionsSummary {
        let now = Utc::now();
        let registry = self.read();
        let total = registry.active.len() + registry.history.len();
        if total == 0 {
            return SessionsSummary::default();
        }

        let all = || registry.active.values().chain(registry.history.iter());
        let total_duration: f64 = all().map(|s| s.duration_secs(now)).sum();
        let total_interactions: u64 = all().map(|s| s.total_interactions).sum();

        SessionsSummary {
            total_sessions: total,
            active_sessions: registry.active.len(),
            completed_sessions: registry.history.len(),
            average_duration: total_duration / total as f64,
            total_interactions,
            average_interactions_per_session: total_interactions as f64 / total as f64,
        }
    }

    /// Number of active sessions
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.read().active.len()
    }

    /// Number of ended sessions retained
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.read().history.len()
    }

    /// Client IDs with an active session
    #[must_use]
    pub fn active_clients(&self) -> Vec<String> {
        let mut clients: Vec<String> = self.read().active.keys().cloned().collect();
        clients.sort();
        clients
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(max_active: usize) -> SessionManager {
        SessionManager::new(SessionConfig {
            context_turns: 4,
            max_active,
            idle_timeout: Duration::from_secs(60),
            max_history: 3,
        })
    }

    #[test]
    fn create_starts_active_and_empty() {
        let sessions = manager(10);
        let session = sessions.create("client-1", Some("user-1")).unwrap();

        assert!(session.is_active());
        assert_eq!(session.total_interactions, 0);
        assert!(session.context.is_empty());
        assert_eq!(session.user_id.as_deref(), Some("user-1"));
        assert_eq!(session.metadata["created_by"], "voice_assistant");
        assert_eq!(sessions.active_count(), 1);
    }

    #[test]
    fn get_or_admit_reuses_the_active_session() {
        let sessions = manager(10);
        let first = sessions.get_or_admit("client-1", None).unwrap();
        let again = sessions.get_or_admit("client-1", None).unwrap();

        assert_eq!(first.session.id, again.session.id);
        assert!(again.ended.is_empty());
        assert_eq!(sessions.history_len(), 0);
    }

    #[test]
    fn concurrent_get_or_admit_creates_one_session() {
        let sessions = manager(10);

        let ids: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| sessions.get_or_admit("client-1", None).unwrap()))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap().session.id)
                .collect()
        });

        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(sessions.active_count(), 1);
        assert_eq!(sessions.history_len(), 0);
    }

    #[test]
    fn get_or_admit_reports_evictions_at_capacity() {
        let sessions = manager(1);
        let first = sessions.get_or_admit("client-1", None).unwrap();
        let second = sessions.get_or_admit("client-2", None).unwrap();

        assert_eq!(second.ended.len(), 1);
        assert_eq!(second.ended[0].id, first.session.id);
        assert_eq!(sessions.active_count(), 1);
    }

    #[test]
    fn get_only_sees_active_sessions() {
        let sessions = manager(10);
        let session = sessions.create("client-1", None).unwrap();

        assert_eq!(sessions.get("client-1").unwrap().id, session.id);
        assert_eq!(sessions.get_by_id(&session.id).unwrap().client_id, "client-1");

        sessions.end("client-1");
        assert!(sessions.get("client-1").is_none());
        assert!(sessions.get_by_id(&session.id).is_none());
    }

    #[test]
    fn end_twice_returns_none_without_duplicating_history() {
        let sessions = manager(10);
        sessions.create("client-1", None).unwrap();

        let ended = sessions.end("client-1").unwrap();
        assert_eq!(ended.status, SessionStatus::Ended);
        assert!(ended.ended_at.is_some());

        assert!(sessions.end("client-1").is_none());
        assert_eq!(sessions.history_len(), 1);
    }

    #[test]
    fn recreate_under_same_client_gets_new_identity() {
        let sessions = manager(10);
        let first = sessions.create("client-1", None).unwrap();
        sessions.end("client-1");
        let second = sessions.create("client-1", None).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(sessions.active_count(), 1);
    }

    #[test]
    fn create_replaces_existing_active_session() {
        let sessions = manager(10);
        let first = sessions.create("client-1", None).unwrap();
        let admission = sessions.admit("client-1", None).unwrap();

        assert_eq!(admission.ended.len(), 1);
        assert_eq!(admission.ended[0].id, first.id);
        assert_eq!(sessions.active_count(), 1);
        assert_eq!(sessions.get("client-1").unwrap().id, admission.session.id);
    }

    #[test]
    fn capacity_evicts_oldest_started_first() {
        let sessions = manager(2);
        let t0 = Utc::now();
        sessions.admit_at("a", None, t0).unwrap();
        sessions
            .admit_at("b", None, t0 + chrono::Duration::seconds(1))
            .unwrap();

        let admission = sessions
            .admit_at("c", None, t0 + chrono::Duration::seconds(2))
            .unwrap();

        assert_eq!(admission.ended.len(), 1);
        assert_eq!(admission.ended[0].client_id, "a");
        assert_eq!(sessions.active_clients(), ["b", "c"]);
    }

    #[test]
    fn capacity_sweeps_idle_sessions_before_evicting() {
        let sessions = manager(2);
        let t0 = Utc::now();
        sessions.admit_at("a", None, t0).unwrap();
        sessions
            .admit_at("b", None, t0 + chrono::Duration::seconds(30))
            .unwrap();

        // Both exceed the 60s idle timeout by now
        let admission = sessions
            .admit_at("c", None, t0 + chrono::Duration::seconds(200))
            .unwrap();

        assert_eq!(admission.ended.len(), 2);
        assert_eq!(sessions.active_clients(), ["c"]);
    }

    #[test]
    fn zero_ceiling_is_capacity_error() {
        let sessions = manager(0);
        let err = sessions.create("client-1", None).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { ceiling: 0, .. }));
    }

    #[test]
    fn add_interaction_truncates_window_but_counts_every_exchange() {
        let sessions = manager(10);
        sessions.create("client-1", None).unwrap();

        for i in 0..5 {
            assert!(sessions.add_interaction("client-1", &format!("q{i}"), &format!("a{i}"), 0.9));
        }

        let session = sessions.get("client-1").unwrap();
        assert_eq!(session.total_interactions, 5);
        assert_eq!(session.context.len(), 4);
        let texts: Vec<_> = session.context.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["q3", "a3", "q4", "a4"]);
    }

    #[test]
    fn add_interaction_without_session_is_lost_update() {
        let sessions = manager(10);
        assert!(!sessions.add_interaction("ghost", "hi", "hello", 1.0));
    }

    #[test]
    fn record_exchange_after_end_is_noop() {
        let sessions = manager(10);
        let session = sessions.create("client-1", None).unwrap();
        sessions.end("client-1");

        assert!(!sessions.record_exchange(&session.id, "late", "reply", 0.9));
        let exported = sessions.export(&session.id).unwrap();
        assert_eq!(exported.total_interactions, 0);
    }

    #[test]
    fn sweep_idle_ends_only_old_sessions() {
        let sessions = manager(10);
        let t0 = Utc::now();
        sessions.admit_at("old", None, t0).unwrap();
        sessions
            .admit_at("new", None, t0 + chrono::Duration::seconds(50))
            .unwrap();

        let swept = sessions.sweep_idle(t0 + chrono::Duration::seconds(90));

        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].client_id, "old");
        assert_eq!(sessions.active_clients(), ["new"]);
    }

    #[test]
    fn history_is_capped_oldest_dropped() {
        let sessions = manager(10);
        for i in 0..5 {
            let client = format!("client-{i}");
            sessions.create(&client, None).unwrap();
            sessions.end(&client);
        }

        assert_eq!(sessions.history_len(), 3);
        assert!(sessions.session_analytics("client-0").is_none());
        assert!(sessions.session_analytics("client-4").is_some());
    }

    #[test]
    fn abort_sets_error_status() {
        let sessions = manager(10);
        sessions.create("client-1", None).unwrap();
        let aborted = sessions.abort("client-1").unwrap();
        assert_eq!(aborted.status, SessionStatus::Error);
    }

    #[test]
    fn session_analytics_reports_average_confidence() {
        let sessions = manager(10);
        sessions.create("client-1", None).unwrap();
        sessions.add_interaction("client-1", "q1", "a1", 0.8);
        sessions.add_interaction("client-1", "q2", "a2", 0.6);

        let analytics = sessions.session_analytics("client-1").unwrap();
        assert_eq!(analytics.total_interactions, 2);
        assert_eq!(analytics.conversation_length, 4);
        assert!((analytics.average_confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn user_sessions_span_active_and_history_newest_first() {
        let sessions = manager(10);
        let t0 = Utc::now();
        sessions.admit_at("a", Some("u1"), t0).unwrap();
        sessions.end("a");
        sessions
            .admit_at("b", Some("u1"), t0 + chrono::Duration::seconds(5))
            .unwrap();
        sessions
            .admit_at("c", Some("u2"), t0 + chrono::Duration::seconds(10))
            .unwrap();

        let listed = sessions.user_sessions("u1");
        let clients: Vec<_> = listed.iter().map(|s| s.client_id.as_str()).collect();
        assert_eq!(clients, ["b", "a"]);
    }

    #[test]
    fn summary_counts_active_and_completed() {
        let sessions = manager(10);
        sessions.create("a", None).unwrap();
        sessions.add_interaction("a", "q", "r", 1.0);
        sessions.create("b", None).unwrap();
        sessions.end("b");

        let summary = sessions.summary();
        assert_eq!(summary.total_sessions, 2);
        assert_eq!(summary.active_sessions, 1);
        assert_eq!(summary.completed_sessions, 1);
        assert_eq!(summary.total_interactions, 1);
        assert!((summary.average_interactions_per_session - 0.5).abs() < 1e-9);
    }

    #[test]
    fn drain_ends_everything() {
        let sessions = manager(10);
        sessions.create("a", None).unwrap();
        sessions.create("b", None).unwrap();

        let drained = sessions.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained.iter().all(|s| s.status == SessionStatus::Ended));
        assert_eq!(sessions.active_count(), 0);
    }

    #[test]
    fn turn_gate_is_shared_per_session() {
        let sessions = manager(10);
        let session = sessions.create("a", None).unwrap();

        let g1 = sessions.turn_gate(&session.id);
        let g2 = sessions.turn_gate(&session.id);
        assert!(Arc::ptr_eq(&g1, &g2));

        let unknown = sessions.turn_gate("nope");
        assert!(!Arc::ptr_eq(&g1, &unknown));
    }
}
