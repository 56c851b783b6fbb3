//! Voice pipeline orchestration
//!
//! One fragment flows through transcription, a confidence gate, context
//! retrieval, response generation, voice formatting and synthesis, and ends
//! with the exchange recorded on the session. Every call yields a
//! [`PipelineResult`]; capability failures degrade to fixed replies instead
//! of surfacing as errors.

mod voice_format;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;

pub use voice_format::format_for_voice;

use crate::providers::{
    GenerationRequest, Generator, Providers, Retriever, Synthesizer, Transcriber, TranscriptEvent,
    Transcription,
};
use crate::session::{SessionManager, Turn};
use crate::{Error, Result};

/// Reply when transcription confidence is below the threshold
pub const CLARIFICATION_REPLY: &str =
    "I'm sorry, I didn't catch that clearly. Could you please repeat your question?";

/// Reply when generation fails or produces nothing
pub const FALLBACK_REPLY: &str = "I apologize, but I'm having trouble processing your request right now. Could you please try again?";

/// Reply when the pipeline fails unexpectedly
pub const ERROR_REPLY: &str =
    "I'm sorry, I encountered a technical issue. Please try again or speak with a human agent.";

/// System instructions for customer service conversations
pub const CUSTOMER_SERVICE_PROMPT: &str = "\
You are an expert customer service representative speaking with a caller.

Goals:
1. Solve the caller's problem quickly and effectively
2. Show understanding and care for their concerns
3. Stay professional and courteous
4. Keep answers brief but complete, this is a voice conversation
5. Use any provided information to personalise the answer
6. Offer to connect a human agent when you cannot help

Voice guidelines:
- Speak naturally in short, clear sentences
- Avoid jargon and formatting such as lists or markdown
- Confirm understanding on complex requests

The caller phoned for help. Leave them satisfied with the experience.";

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Transcripts below this confidence get the clarification reply
    pub confidence_threshold: f32,
    /// Exchanges of history given to the generator
    pub history_exchanges: usize,
    /// Upper bound on retrieved context items
    pub max_context_results: usize,
    /// Bound on each external capability call
    pub stage_timeout: Duration,
    pub system_prompt: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            history_exchanges: 5,
            max_context_results: 5,
            stage_timeout: Duration::from_secs(5),
            system_prompt: CUSTOMER_SERVICE_PROMPT.to_string(),
        }
    }
}

/// How a fragment was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Reply generated (possibly with the fallback text)
    Success,
    /// Low-confidence transcript, caller asked to repeat
    Clarification,
    /// No speech recognized
    Empty,
    /// Unexpected failure, apology returned
    Error,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Clarification => "clarification",
            Self::Empty => "empty",
            Self::Error => "error",
        }
    }
}

/// Result of processing one fragment
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub session_id: String,
    pub outcome: Outcome,
    pub transcript: String,
    pub reply: String,
    /// Synthesized reply, `None` if synthesis failed or was skipped
    pub audio: Option<Vec<u8>>,
    pub confidence: f32,
    pub processing_time: Duration,
    /// Failure that produced an `Error` outcome
    pub error: Option<String>,
}

/// Stage output before timing is attached
struct Resolved {
    outcome: Outcome,
    transcript: String,
    reply: String,
    audio: Option<Vec<u8>>,
    confidence: f32,
}

impl Resolved {
    const fn empty() -> Self {
        Self {
            outcome: Outcome::Empty,
            transcript: String::new(),
            reply: String::new(),
            audio: None,
            confidence: 0.0,
        }
    }
}

/// Coordinates the capabilities for each fragment
pub struct Orchestrator {
    config: PipelineConfig,
    sessions: Arc<SessionManager>,
    transcriber: Arc<dyn Transcriber>,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    synthesizer: Arc<dyn Synthesizer>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        sessions: Arc<SessionManager>,
        providers: Providers,
    ) -> Self {
        let Providers {
            transcriber,
            retriever,
            generator,
            synthesizer,
        } = providers;
        Self {
            config,
            sessions,
            transcriber,
            retriever,
            generator,
            synthesizer,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn transcriber(&self) -> &dyn Transcriber {
        self.transcriber.as_ref()
    }

    #[must_use]
    pub fn retriever(&self) -> &dyn Retriever {
        self.retriever.as_ref()
    }

    #[must_use]
    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    #[must_use]
    pub fn synthesizer(&self) -> &dyn Synthesizer {
        self.synthesizer.as_ref()
    }

    /// Process one audio fragment for a session
    ///
    /// Fragments for the same session are processed one at a time; fragments
    /// for different sessions run independently.
    pub async fn process_fragment(&self, session_id: &str, audio: &[u8]) -> PipelineResult {
        let started = Instant::now();
        let gate = self.sessions.turn_gate(session_id);
        let _turn = gate.lock().await;

        tracing::debug!(session = session_id, audio_bytes = audio.len(), "processing fragment");

        let resolved = match self.transcribe(audio).await {
            Ok(Some(transcription)) => self.respond(session_id, transcription).await,
            Ok(None) => {
                tracing::info!(session = session_id, "no speech in fragment");
                Ok(Resolved::empty())
            }
            Err(e) => Err(e),
        };

        self.finish(session_id, started, resolved).await
    }

    /// Process a stream of audio chunks for a session
    ///
    /// Emits one result per finalized utterance; interim transcription events
    /// produce nothing. Each transcription event must arrive within the stage
    /// timeout; on expiry an error result is emitted and the stream ends.
    pub fn process_stream<'a>(
        &'a self,
        session_id: String,
        audio: BoxStream<'a, Vec<u8>>,
    ) -> BoxStream<'a, PipelineResult> {
        self.bounded_events(self.transcriber.transcribe_stream(audio))
            .filter(|event| {
                futures::future::ready(event.as_ref().map_or(true, |e| e.is_final))
            })
            .then(move |event| {
                let session_id = session_id.clone();
                async move { self.process_event(&session_id, event).await }
            })
            .boxed()
    }

    /// Bound the wait for each transcription event by the stage timeout
    fn bounded_events<'a>(
        &self,
        events: BoxStream<'a, Result<TranscriptEvent>>,
    ) -> BoxStream<'a, Result<TranscriptEvent>> {
        let timeout = self.config.stage_timeout;
        futures::stream::unfold(Some(events), move |state| async move {
            let mut events = state?;
            match tokio::time::timeout(timeout, events.next()).await {
                Ok(Some(event)) => Some((event, Some(events))),
                Ok(None) => None,
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "streaming transcription stalled"
                    );
                    let expired = Error::Timeout {
                        stage: "transcription",
                        millis: timeout.as_millis(),
                    };
                    Some((Err(expired), None))
                }
            }
        })
        .boxed()
    }

    async fn process_event(
        &self,
        session_id: &str,
        event: Result<TranscriptEvent>,
    ) -> PipelineResult {
        let started = Instant::now();
        let gate = self.sessions.turn_gate(session_id);
        let _turn = gate.lock().await;

        let resolved = match event {
            Ok(e) if e.transcript.trim().is_empty() => Ok(Resolved::empty()),
            Ok(e) => {
                let transcription = Transcription {
                    transcript: e.transcript,
                    confidence: e.confidence,
                };
                self.respond(session_id, transcription).await
            }
            Err(e) => Err(e),
        };

        self.finish(session_id, started, resolved).await
    }

    /// Bound a capability call by the stage timeout
    async fn bounded<T>(
        &self,
        stage: &'static str,
        call: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.stage_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                stage,
                millis: self.config.stage_timeout.as_millis(),
            }),
        }
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<Option<Transcription>> {
        let transcription = self
            .bounded("transcription", self.transcriber.transcribe(audio))
            .await?;
        Ok(transcription.filter(|t| !t.transcript.trim().is_empty()))
    }

    /// Stages after transcription
    async fn respond(&self, session_id: &str, transcription: Transcription) -> Result<Resolved> {
        let Transcription {
            transcript,
            confidence,
        } = transcription;

        if confidence < self.config.confidence_threshold {
            tracing::warn!(
                session = session_id,
                confidence,
                threshold = self.config.confidence_threshold,
                "low confidence transcription"
            );
            return Ok(Resolved {
                outcome: Outcome::Clarification,
                transcript: String::new(),
                reply: CLARIFICATION_REPLY.to_string(),
                audio: self.speak(session_id, CLARIFICATION_REPLY).await,
                confidence: 0.0,
            });
        }

        // Snapshot, no session state is held across the capability calls
        let (user_id, history) = self
            .sessions
            .get_by_id(session_id)
            .map(|s| (s.user_id, s.context.recent(self.config.history_exchanges * 2)))
            .unwrap_or_default();

        let context = self
            .retrieve(session_id, &transcript, user_id.as_deref(), &history)
            .await;

        let reply = self
            .generate(session_id, &transcript, context.as_deref(), &history)
            .await;

        let spoken = format_for_voice(&reply);
        let audio = self.speak(session_id, &spoken).await;

        if !self
            .sessions
            .record_exchange(session_id, &transcript, &reply, confidence)
        {
            tracing::debug!(session = session_id, "exchange not recorded, session inactive");
        }

        Ok(Resolved {
            outcome: Outcome::Success,
            transcript,
            reply,
            audio,
            confidence,
        })
    }

    /// Retrieval, degrading to no context on failure
    async fn retrieve(
        &self,
        session_id: &str,
        query: &str,
        user_id: Option<&str>,
        history: &[Turn],
    ) -> Option<String> {
        let call = self.retriever.retrieve_context(
            query,
            user_id,
            history,
            self.config.max_context_results,
        );
        match self.bounded("retrieval", call).await {
            Ok(context) if context.trim().is_empty() => {
                tracing::debug!(session = session_id, "no relevant context");
                None
            }
            Ok(context) => Some(context),
            Err(e) => {
                tracing::warn!(
                    session = session_id,
                    error = %e,
                    "retrieval failed, continuing without context"
                );
                None
            }
        }
    }

    /// Generation, degrading to the fallback reply on failure
    async fn generate(
        &self,
        session_id: &str,
        user_text: &str,
        context: Option<&str>,
        history: &[Turn],
    ) -> String {
        let request = GenerationRequest {
            user_text,
            context,
            history,
            system_prompt: &self.config.system_prompt,
        };
        match self
            .bounded("generation", self.generator.generate_reply(request))
            .await
        {
            Ok(Some(reply)) if !reply.trim().is_empty() => reply,
            Ok(_) => {
                tracing::warn!(session = session_id, "generation returned nothing, using fallback");
                FALLBACK_REPLY.to_string()
            }
            Err(e) => {
                tracing::warn!(
                    session = session_id,
                    error = %e,
                    "generation failed, using fallback"
                );
                FALLBACK_REPLY.to_string()
            }
        }
    }

    /// Synthesis, degrading to no audio on failure
    async fn speak(&self, session_id: &str, text: &str) -> Option<Vec<u8>> {
        match self
            .bounded("synthesis", self.synthesizer.synthesize(text))
            .await
        {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(
                    session = session_id,
                    error = %e,
                    "synthesis failed, returning text only"
                );
                None
            }
        }
    }

    /// Attach timing, converting an unexpected failure into the error outcome
    async fn finish(
        &self,
        session_id: &str,
        started: Instant,
        resolved: Result<Resolved>,
    ) -> PipelineResult {
        let (resolved, error) = match resolved {
            Ok(resolved) => (resolved, None),
            Err(e) => {
                tracing::error!(session = session_id, error = %e, "pipeline failed");
                let resolved = Resolved {
                    outcome: Outcome::Error,
                    transcript: String::new(),
                    reply: ERROR_REPLY.to_string(),
                    audio: self.speak(session_id, ERROR_REPLY).await,
                    confidence: 0.0,
                };
                (resolved, Some(e.to_string()))
            }
        };

        let processing_time = started.elapsed();
        self.sessions.record_response_time(session_id, processing_time);

        tracing::info!(
            session = session_id,
            outcome = resolved.outcome.as_str(),
            elapsed_ms = u64::try_from(processing_time.as_millis()).unwrap_or(u64::MAX),
            "fragment processed"
        );

        PipelineResult {
            session_id: session_id.to_string(),
            outcome: resolved.outcome,
            transcript: resolved.transcript,
            reply: resolved.reply,
            audio: resolved.audio,
            confidence: resolved.confidence,
            processing_time,
            error,
        }
    }
}
