//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use beacon_voice::providers::{
    GenerationRequest, Generator, Providers, Retriever, Synthesizer, Transcriber, Transcription,
};
use beacon_voice::session::Turn;
use beacon_voice::{Error, PipelineConfig, Result, SessionConfig, VoiceService};

/// How the stub capabilities behave
#[derive(Debug, Clone)]
pub struct Behavior {
    pub confidence: f32,
    pub context: String,
    pub transcription_delay: Duration,
    pub generation_delay: Duration,
    pub fail_transcription: bool,
    pub fail_retrieval: bool,
    pub fail_generation: bool,
    pub fail_synthesis: bool,
    pub healthy: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            confidence: 0.95,
            context: "FAQ: Q: How long does shipping take?\nA: Three to five days.".to_string(),
            transcription_delay: Duration::ZERO,
            generation_delay: Duration::ZERO,
            fail_transcription: false,
            fail_retrieval: false,
            fail_generation: false,
            fail_synthesis: false,
            healthy: true,
        }
    }
}

/// Call counters shared by the stubs
#[derive(Debug, Default)]
pub struct Calls {
    pub transcribe: AtomicUsize,
    pub retrieve: AtomicUsize,
    pub generate: AtomicUsize,
    pub synthesize: AtomicUsize,
    /// History length seen by the most recent generation
    pub last_history_len: AtomicUsize,
}

impl Calls {
    pub fn transcribe(&self) -> usize {
        self.transcribe.load(Ordering::SeqCst)
    }

    pub fn retrieve(&self) -> usize {
        self.retrieve.load(Ordering::SeqCst)
    }

    pub fn generate(&self) -> usize {
        self.generate.load(Ordering::SeqCst)
    }

    pub fn synthesize(&self) -> usize {
        self.synthesize.load(Ordering::SeqCst)
    }

    pub fn last_history_len(&self) -> usize {
        self.last_history_len.load(Ordering::SeqCst)
    }
}

/// One stub standing in for all four capabilities
///
/// Transcription echoes the audio bytes as UTF-8 text. Generation answers
/// `reply to {text}`. Synthesis returns the text bytes.
#[derive(Debug, Default)]
pub struct Stub {
    pub behavior: Behavior,
    pub calls: Calls,
}

impl Stub {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: Calls::default(),
        })
    }

    pub fn providers(self: &Arc<Self>) -> Providers {
        Providers {
            transcriber: self.clone(),
            retriever: self.clone(),
            generator: self.clone(),
            synthesizer: self.clone(),
        }
    }
}

#[async_trait]
impl Transcriber for Stub {
    fn name(&self) -> &'static str {
        "stub-stt"
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<Option<Transcription>> {
        self.calls.transcribe.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.behavior.transcription_delay).await;
        if self.behavior.fail_transcription {
            return Err(Error::Stt("stub transcription failure".to_string()));
        }
        let transcript = String::from_utf8_lossy(audio).trim().to_string();
        if transcript.is_empty() {
            return Ok(None);
        }
        Ok(Some(Transcription {
            transcript,
            confidence: self.behavior.confidence,
        }))
    }

    async fn health_check(&self) -> bool {
        self.behavior.healthy
    }
}

#[async_trait]
impl Retriever for Stub {
    fn name(&self) -> &'static str {
        "stub-kb"
    }

    async fn retrieve_context(
        &self,
        _query: &str,
        _user_id: Option<&str>,
        _history: &[Turn],
        _max_results: usize,
    ) -> Result<String> {
        self.calls.retrieve.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_retrieval {
            return Err(Error::Retrieval("stub retrieval failure".to_string()));
        }
        Ok(self.behavior.context.clone())
    }

    async fn health_check(&self) -> bool {
        self.behavior.healthy
    }
}

#[async_trait]
impl Generator for Stub {
    fn name(&self) -> &'static str {
        "stub-llm"
    }

    async fn generate_reply(&self, request: GenerationRequest<'_>) -> Result<Option<String>> {
        self.calls.generate.fetch_add(1, Ordering::SeqCst);
        self.calls
            .last_history_len
            .store(request.history.len(), Ordering::SeqCst);
        tokio::time::sleep(self.behavior.generation_delay).await;
        if self.behavior.fail_generation {
            return Err(Error::Llm("stub generation failure".to_string()));
        }
        Ok(Some(format!("reply to {}", request.user_text)))
    }

    async fn health_check(&self) -> bool {
        self.behavior.healthy
    }
}

#[async_trait]
impl Synthesizer for Stub {
    fn name(&self) -> &'static str {
        "stub-tts"
    }

    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>> {
        self.calls.synthesize.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_synthesis {
            return Err(Error::Tts("stub synthesis failure".to_string()));
        }
        Ok(Some(text.as_bytes().to_vec()))
    }

    async fn health_check(&self) -> bool {
        self.behavior.healthy
    }
}

/// Pipeline config with a short stage timeout for tests
pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        stage_timeout: Duration::from_millis(500),
        ..PipelineConfig::default()
    }
}

/// Build a service over the stub with test defaults
pub fn test_service(stub: &Arc<Stub>) -> VoiceService {
    VoiceService::new(
        SessionConfig::default(),
        test_pipeline_config(),
        stub.providers(),
    )
}

/// Build a service over the stub with explicit configs
pub fn test_service_with(
    stub: &Arc<Stub>,
    sessions: SessionConfig,
    pipeline: PipelineConfig,
) -> VoiceService {
    VoiceService::new(sessions, pipeline, stub.providers())
}
