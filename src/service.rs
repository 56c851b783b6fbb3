//! Voice service
//!
//! Ties the session manager, pipeline and analytics together behind the
//! operations a transport needs: start a call, feed it audio, end it, and
//! read analytics.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::Result;
use crate::analytics::{AnalyticsEngine, CallAnalytics, CommonQuestions, ErrorAnalytics};
use crate::pipeline::{Orchestrator, Outcome, PipelineConfig, PipelineResult};
use crate::providers::Providers;
use crate::session::{
    Session, SessionAnalytics, SessionConfig, SessionExport, SessionManager, SessionsSummary,
};

/// Health of one capability provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub provider: &'static str,
    pub healthy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub transcription: ProviderHealth,
    pub retrieval: ProviderHealth,
    pub generation: ProviderHealth,
    pub synthesis: ProviderHealth,
}

impl ServiceHealth {
    #[must_use]
    pub const fn all_healthy(&self) -> bool {
        self.transcription.healthy
            && self.retrieval.healthy
            && self.generation.healthy
            && self.synthesis.healthy
    }
}

/// Effective pipeline and session limits
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationSummary {
    pub confidence_threshold: f32,
    pub stage_timeout_ms: u128,
    pub history_exchanges: usize,
    pub context_turns: usize,
    pub max_active_sessions: usize,
    pub idle_timeout_secs: u64,
}

/// Point-in-time service status
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub healthy: bool,
    pub active_sessions: usize,
    pub services: ServiceHealth,
    pub configuration: ConfigurationSummary,
}

/// The voice assistant core
pub struct VoiceService {
    sessions: Arc<SessionManager>,
    pipeline: Orchestrator,
    analytics: Arc<AnalyticsEngine>,
}

impl VoiceService {
    #[must_use]
    pub fn new(
        session_config: SessionConfig,
        pipeline_config: PipelineConfig,
        providers: Providers,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(session_config));
        let pipeline = Orchestrator::new(pipeline_config, Arc::clone(&sessions), providers);
        Self {
            sessions,
            pipeline,
            analytics: Arc::new(AnalyticsEngine::new()),
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub const fn pipeline(&self) -> &Orchestrator {
        &self.pipeline
    }

    #[must_use]
    pub fn analytics(&self) -> &AnalyticsEngine {
        &self.analytics
    }

    fn record(&self, ended: &[Session]) {
        let now = Utc::now();
        for session in ended {
            self.analytics.record_call(&session.export(now));
        }
    }

    /// Start a session for a client
    ///
    /// Sessions ended to make room are recorded as finished calls.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if no slot can be freed
    pub fn create_session(&self, client_id: &str, user_id: Option<&str>) -> Result<Session> {
        let admission = self.sessions.admit(client_id, user_id)?;
        self.record(&admission.ended);
        Ok(admission.session)
    }

    /// Session ID for a client, creating a session if it has none
    fn session_id_for(&self, client_id: &str) -> Result<String> {
        let admission = self.sessions.get_or_admit(client_id, None)?;
        self.record(&admission.ended);
        Ok(admission.session.id)
    }

    fn note_failure(&self, result: &PipelineResult) {
        if result.outcome == Outcome::Error {
            let message = result.error.as_deref().unwrap_or("pipeline failure");
            self.analytics
                .log_error("pipeline", message, Some(&result.session_id));
        }
    }

    /// Process one audio fragment from a client
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if a new session was needed and could not be admitted
    pub async fn process_fragment(&self, client_id: &str, audio: &[u8]) -> Result<PipelineResult> {
        let session_id = self.session_id_for(client_id)?;
        let result = self.pipeline.process_fragment(&session_id, audio).await;
        self.note_failure(&result);
        Ok(result)
    }

    /// Process a stream of audio chunks from a client
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if a new session was needed and could not be admitted
    pub fn process_stream<'a>(
        &'a self,
        client_id: &str,
        audio: BoxStream<'a, Vec<u8>>,
    ) -> Result<BoxStream<'a, PipelineResult>> {
        let session_id = self.session_id_for(client_id)?;
        Ok(self
            .pipeline
            .process_stream(session_id, audio)
            .inspect(move |result| self.note_failure(result))
            .boxed())
    }

    /// End a client's session and record the call
    pub fn end_session(&self, client_id: &str) -> Option<SessionExport> {
        let session = self.sessions.end(client_id)?;
        let export = session.export(Utc::now());
        self.analytics.record_call(&export);
        Some(export)
    }

    /// End a client's session as failed and record the call
    pub fn abort_session(&self, client_id: &str) -> Option<SessionExport> {
        let session = self.sessions.abort(client_id)?;
        let export = session.export(Utc::now());
        self.analytics.record_call(&export);
        Some(export)
    }

    /// End sessions past the idle timeout, returning how many were ended
    pub fn sweep_idle(&self) -> usize {
        let swept = self.sessions.sweep_idle(Utc::now());
        self.record(&swept);
        swept.len()
    }

    /// End and record every active session
    pub fn shutdown(&self) -> usize {
        let drained = self.sessions.drain();
        self.record(&drained);
        tracing::info!(sessions = drained.len(), "drained active sessions");
        drained.len()
    }

    #[must_use]
    pub fn call_analytics(&self) -> CallAnalytics {
        self.analytics.call_analytics()
    }

    #[must_use]
    pub fn common_questions(&self, limit: usize) -> CommonQuestions {
        self.analytics.common_questions(limit)
    }

    #[must_use]
    pub fn error_analytics(&self) -> ErrorAnalytics {
        self.analytics.error_analytics()
    }

    #[must_use]
    pub fn session_analytics(&self, client_id: &str) -> Option<SessionAnalytics> {
        self.sessions.session_analytics(client_id)
    }

    /// Analytics for every active session, ordered by client ID
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionAnalytics> {
        let now = Utc::now();
        self.sessions
            .active_clients()
            .iter()
            .filter_map(|client| self.sessions.get(client))
            .map(|session| session.analytics(now))
            .collect()
    }

    #[must_use]
    pub fn user_sessions(&self, user_id: &str) -> Vec<SessionExport> {
        self.sessions.user_sessions(user_id)
    }

    #[must_use]
    pub fn sessions_summary(&self) -> SessionsSummary {
        self.sessions.summary()
    }

    /// Check every provider concurrently
    pub async fn health(&self) -> ServiceHealth {
        let timeout = self.pipeline.config().stage_timeout;
        let transcriber = self.pipeline.transcriber();
        let retriever = self.pipeline.retriever();
        let generator = self.pipeline.generator();
        let synthesizer = self.pipeline.synthesizer();

        let (transcription, retrieval, generation, synthesis) = tokio::join!(
            bounded_check(timeout, transcriber.health_check()),
            bounded_check(timeout, retriever.health_check()),
            bounded_check(timeout, generator.health_check()),
            bounded_check(timeout, synthesizer.health_check()),
        );

        ServiceHealth {
            transcription: ProviderHealth {
                provider: transcriber.name(),
                healthy: transcription,
            },
            retrieval: ProviderHealth {
                provider: retriever.name(),
                healthy: retrieval,
            },
            generation: ProviderHealth {
                provider: generator.name(),
                healthy: generation,
            },
            synthesis: ProviderHealth {
                provider: synthesizer.name(),
                healthy: synthesis,
            },
        }
    }

    /// Provider health, active sessions and effective configuration
    pub async fn status(&self) -> ServiceStatus {
        let services = self.health().await;
        let pipeline = self.pipeline.config();
        let sessions = self.sessions.config();

        ServiceStatus {
            healthy: services.all_healthy(),
            active_sessions: self.sessions.active_count(),
            services,
            configuration: ConfigurationSummary {
                confidence_threshold: pipeline.confidence_threshold,
                stage_timeout_ms: pipeline.stage_timeout.as_millis(),
                history_exchanges: pipeline.history_exchanges,
                context_turns: sessions.context_turns,
                max_active_sessions: sessions.max_active,
                idle_timeout_secs: sessions.idle_timeout.as_secs(),
            },
        }
    }
}

/// A health check that does not answer in time counts as unhealthy
async fn bounded_check(timeout: Duration, check: impl Future<Output = bool>) -> bool {
    tokio::time::timeout(timeout, check).await.unwrap_or(false)
}
