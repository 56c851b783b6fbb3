//! Conversation sessions
//!
//! A session is one call from a client: identity, timing, a bounded context
//! window and counters. The [`SessionManager`] owns every live session and a
//! capped history of ended ones.

mod context;
mod manager;

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use context::{ContextWindow, Role, Turn};
pub use manager::{Admission, SessionManager};

/// Default number of turns retained per session
pub const DEFAULT_CONTEXT_TURNS: usize = 20;

/// Session manager configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum turns retained in each context window
    pub context_turns: usize,
    /// Ceiling on concurrently active sessions
    pub max_active: usize,
    /// Sessions older than this (since start) are ended by the idle sweep
    pub idle_timeout: Duration,
    /// Maximum number of ended sessions kept in history
    pub max_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            context_turns: DEFAULT_CONTEXT_TURNS,
            max_active: 1000,
            idle_timeout: Duration::from_secs(3600),
            max_history: 10_000,
        }
    }
}

/// Lifecycle state of a session
///
/// Advances from `Active` to `Ended` or `Error` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
    Error,
}

impl SessionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversation session
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    /// Completed exchanges, independent of window truncation
    pub total_interactions: u64,
    pub context: ContextWindow,
    pub last_interaction_at: Option<DateTime<Utc>>,
    /// Measured pipeline latency of every fragment processed for this session
    pub response_times_ms: Vec<u64>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Session {
    fn new(
        client_id: &str,
        user_id: Option<&str>,
        context_turns: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("created_by".to_string(), "voice_assistant".into());
        metadata.insert("version".to_string(), "1.0".into());

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            user_id: user_id.map(str::to_string),
            started_at: now,
            ended_at: None,
            status: SessionStatus::Active,
            total_interactions: 0,
            context: ContextWindow::new(context_turns),
            last_interaction_at: None,
            response_times_ms: Vec::new(),
            metadata,
        }
    }

    /// Whether the session is still accepting interactions
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Seconds from start to end, or to `now` while still active
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self, now: DateTime<Utc>) -> f64 {
        let end = self.ended_at.unwrap_or(now);
        (end - self.started_at).num_milliseconds().max(0) as f64 / 1000.0
    }

    /// Move out of `Active`; later transitions are ignored
    fn close(&mut self, status: SessionStatus, at: DateTime<Utc>) {
        if self.is_active() {
            self.status = status;
            self.ended_at = Some(at);
        }
    }

    fn add_interaction(
        &mut self,
        user_text: &str,
        reply_text: &str,
        confidence: f32,
        at: DateTime<Utc>,
    ) {
        self.context.push_exchange(user_text, reply_text, confidence, at);
        self.total_interactions += 1;
        self.last_interaction_at = Some(at);
    }

    /// Snapshot the session for storage or analytics
    #[must_use]
    pub fn export(&self, now: DateTime<Utc>) -> SessionExport {
        SessionExport {
            session_id: self.id.clone(),
            client_id: self.client_id.clone(),
            user_id: self.user_id.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            status: self.status,
            duration_secs: self.duration_secs(now),
            total_interactions: self.total_interactions,
            turns: self.context.to_vec(),
            response_times_ms: self.response_times_ms.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Per-session analytics snapshot
    #[must_use]
    pub fn analytics(&self, now: DateTime<Utc>) -> SessionAnalytics {
        SessionAnalytics {
            session_id: self.id.clone(),
            client_id: self.client_id.clone(),
            user_id: self.user_id.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            last_interaction_at: self.last_interaction_at,
            duration_secs: self.duration_secs(now),
            total_interactions: self.total_interactions,
            conversation_length: self.context.len(),
            average_confidence: self.context.average_user_confidence(),
        }
    }
}

/// Complete, owned copy of a session
///
/// This is the only shape in which session data leaves the manager, and the
/// input to analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExport {
    pub session_id: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub duration_secs: f64,
    pub total_interactions: u64,
    pub turns: Vec<Turn>,
    #[serde(default)]
    pub response_times_ms: Vec<u64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Per-session summary metrics
#[derive(Debug, Clone, Serialize)]
pub struct SessionAnalytics {
    pub session_id: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_interaction_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
    pub total_interactions: u64,
    /// Turns currently held in the context window
    pub conversation_length: usize,
    pub average_confidence: f64,
}

/// Totals across active and ended sessions
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionsSummary {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub completed_sessions: usize,
    pub average_duration: f64,
    pub total_interactions: u64,
    pub average_interactions_per_session: f64,
}
