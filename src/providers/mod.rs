//! External AI capabilities consumed by the pipeline
//!
//! Each capability is a trait with one implementation per provider. The
//! pipeline only sees the traits; providers are injected at construction.

mod chat;
mod deepgram;
mod elevenlabs;
mod knowledge;

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

pub use chat::{ChatCompletionGenerator, GROQ_API_BASE};
pub use deepgram::DeepgramTranscriber;
pub use elevenlabs::{ElevenLabsSynthesizer, VoiceSettings};
pub use knowledge::{KnowledgeBaseFile, KnowledgeBaseRetriever, KnowledgeEntry, KnowledgeKind};

use crate::Result;
use crate::session::Turn;

/// A completed transcription of one fragment
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub transcript: String,
    /// Recognizer confidence in `0.0..=1.0`
    pub confidence: f32,
}

/// One event from a streaming transcription
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub transcript: String,
    pub confidence: f32,
    /// Whether the recognizer considers the utterance finished
    pub is_final: bool,
}

/// Input to response generation
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub user_text: &'a str,
    /// Retrieved context, if any was found
    pub context: Option<&'a str>,
    /// Recent conversation, oldest-first
    pub history: &'a [Turn],
    pub system_prompt: &'a str,
}

/// Speech-to-text capability
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Provider name for logs and health reports
    fn name(&self) -> &'static str;

    /// Transcribe one audio fragment
    ///
    /// Returns `None` when no speech was recognized.
    async fn transcribe(&self, audio: &[u8]) -> Result<Option<Transcription>>;

    /// Transcribe a sequence of audio chunks
    ///
    /// The default transcribes each chunk on its own and reports every
    /// recognized chunk as a final utterance. Providers with native streaming
    /// override this and emit interim events too.
    fn transcribe_stream<'a>(
        &'a self,
        audio: BoxStream<'a, Vec<u8>>,
    ) -> BoxStream<'a, Result<TranscriptEvent>> {
        audio
            .then(move |chunk| async move { self.transcribe(&chunk).await })
            .filter_map(|result| async move {
                match result {
                    Ok(Some(t)) => Some(Ok(TranscriptEvent {
                        transcript: t.transcript,
                        confidence: t.confidence,
                        is_final: true,
                    })),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed()
    }

    async fn health_check(&self) -> bool;
}

/// Context retrieval capability
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &'static str;

    /// Find context relevant to `query`
    ///
    /// An empty string means nothing relevant was found.
    async fn retrieve_context(
        &self,
        query: &str,
        user_id: Option<&str>,
        history: &[Turn],
        max_results: usize,
    ) -> Result<String>;

    async fn health_check(&self) -> bool;
}

/// Response generation capability
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Generate a reply, or `None` if the model produced nothing
    async fn generate_reply(&self, request: GenerationRequest<'_>) -> Result<Option<String>>;

    async fn health_check(&self) -> bool;
}

/// Text-to-speech capability
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Synthesize speech, or `None` if the provider returned no audio
    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>>;

    async fn health_check(&self) -> bool;
}

/// The four capabilities a pipeline is built from
#[derive(Clone)]
pub struct Providers {
    pub transcriber: Arc<dyn Transcriber>,
    pub retriever: Arc<dyn Retriever>,
    pub generator: Arc<dyn Generator>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct EchoTranscriber;

    #[async_trait]
    impl Transcriber for EchoTranscriber {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn transcribe(&self, audio: &[u8]) -> Result<Option<Transcription>> {
            match audio {
                b"" => Ok(None),
                b"fail" => Err(Error::Stt("boom".to_string())),
                _ => Ok(Some(Transcription {
                    transcript: String::from_utf8_lossy(audio).into_owned(),
                    confidence: 0.9,
                })),
            }
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn default_stream_emits_final_event_per_recognized_chunk() {
        let transcriber = EchoTranscriber;
        let chunks = futures::stream::iter(vec![b"hello".to_vec(), Vec::new(), b"world".to_vec()]);

        let events: Vec<_> = transcriber
            .transcribe_stream(chunks.boxed())
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        let first = events[0].as_ref().unwrap();
        assert_eq!(first.transcript, "hello");
        assert!(first.is_final);
        assert_eq!(events[1].as_ref().unwrap().transcript, "world");
    }

    #[tokio::test]
    async fn default_stream_surfaces_errors() {
        let transcriber = EchoTranscriber;
        let chunks = futures::stream::iter(vec![b"fail".to_vec()]);

        let events: Vec<_> = transcriber
            .transcribe_stream(chunks.boxed())
            .collect()
            .await;

        assert!(matches!(events.as_slice(), [Err(Error::Stt(_))]));
    }
}
