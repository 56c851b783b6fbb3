//! ElevenLabs text-to-speech

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Synthesizer;
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

/// Voice tuning sent with each synthesis request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.75,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// Synthesizes speech with ElevenLabs, returning MP3 audio
pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
    model: String,
    settings: VoiceSettings,
    base_url: String,
}

impl ElevenLabsSynthesizer {
    /// Create a new ElevenLabs synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, voice_id: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice_id,
            model,
            settings: VoiceSettings::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    #[must_use]
    pub const fn with_settings(mut self, settings: VoiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Point the client at a different API host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsSynthesizer {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);
        let request = SpeechRequest {
            text,
            model_id: &self.model,
            voice_settings: self.settings,
        };

        tracing::debug!(
            chars = text.len(),
            voice = %self.voice_id,
            "starting ElevenLabs synthesis"
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "ElevenLabs API error");
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Ok(None);
        }
        Ok(Some(audio.to_vec()))
    }

    async fn health_check(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/v1/user", self.base_url))
            .header("xi-api-key", &self.api_key)
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "ElevenLabs health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_voice_settings() {
        let request = SpeechRequest {
            text: "Hello there.",
            model_id: "eleven_multilingual_v2",
            voice_settings: VoiceSettings::default(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model_id"], "eleven_multilingual_v2");
        assert_eq!(json["voice_settings"]["stability"], 0.75);
        assert_eq!(json["voice_settings"]["similarity_boost"], 0.75);
        assert_eq!(json["voice_settings"]["style"], 0.0);
        assert_eq!(json["voice_settings"]["use_speaker_boost"], true);
    }

    #[test]
    fn requires_api_key() {
        assert!(matches!(
            ElevenLabsSynthesizer::new(String::new(), "voice".to_string(), "model".to_string()),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn blank_text_synthesizes_nothing() {
        let tts = ElevenLabsSynthesizer::new(
            "key".to_string(),
            "voice".to_string(),
            "model".to_string(),
        )
        .unwrap()
            .with_base_url("http://127.0.0.1:9");
        assert_eq!(tts.synthesize("   ").await.unwrap(), None);
    }
}
