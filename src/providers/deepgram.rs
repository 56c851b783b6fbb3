//! Deepgram speech-to-text

use async_trait::async_trait;

use super::{Transcriber, Transcription};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.deepgram.com";

/// Response from the Deepgram listen API
#[derive(serde::Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(serde::Deserialize)]
struct ListenResults {
    channels: Vec<ListenChannel>,
}

#[derive(serde::Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(serde::Deserialize)]
struct ListenAlternative {
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

impl ListenResponse {
    /// First alternative of the first channel, if it carries speech
    fn into_transcription(self) -> Option<Transcription> {
        let alternative = self
            .results
            .channels
            .into_iter()
            .next()?
            .alternatives
            .into_iter()
            .next()?;

        let transcript = alternative.transcript.trim().to_string();
        if transcript.is_empty() {
            return None;
        }

        Some(Transcription {
            transcript,
            confidence: alternative.confidence.clamp(0.0, 1.0),
        })
    }
}

/// Transcribes fragments with Deepgram's prerecorded API
pub struct DeepgramTranscriber {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl DeepgramTranscriber {
    /// Create a new Deepgram transcriber
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn listen_url(&self) -> String {
        format!(
            "{}/v1/listen?model={}&punctuate=true&smart_format=true",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    fn name(&self) -> &'static str {
        "deepgram"
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<Option<Transcription>> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let response = self
            .client
            .post(self.listen_url())
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: ListenResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Deepgram response");
            e
        })?;

        let transcription = result.into_transcription();
        match &transcription {
            Some(t) => tracing::info!(
                transcript = %t.transcript,
                confidence = t.confidence,
                "transcription complete"
            ),
            None => tracing::debug!("no speech detected"),
        }
        Ok(transcription)
    }

    async fn health_check(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/v1/projects", self.base_url))
            .header("Authorization", format!("Token {}", self.api_key))
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "Deepgram health check failed");
                false
            }
        }
    }
}
