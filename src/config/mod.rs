//! Configuration management for the voice service
//!
//! Values resolve with precedence env > TOML file > defaults.

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::PipelineConfig;
use crate::providers::{
    ChatCompletionGenerator, DeepgramTranscriber, ElevenLabsSynthesizer, GROQ_API_BASE,
    KnowledgeBaseRetriever, Providers, VoiceSettings,
};
use crate::session::SessionConfig;
use crate::{Error, Result};

use file::VoiceConfigFile;

/// Default API server port
pub const DEFAULT_PORT: u16 = 8000;

/// Voice service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API server port
    pub port: u16,

    /// API keys
    pub api_keys: ApiKeys,

    /// Deepgram model
    pub stt_model: String,

    pub tts: TtsConfig,

    pub llm: LlmConfig,

    /// Knowledge base file, empty knowledge base when unset
    pub knowledge_path: Option<PathBuf>,

    pub pipeline: PipelineConfig,

    pub sessions: SessionConfig,
}

/// API keys for external services
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
    pub groq: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "<set>");
        f.debug_struct("ApiKeys")
            .field("deepgram", &mask(&self.deepgram))
            .field("elevenlabs", &mask(&self.elevenlabs))
            .field("groq", &mask(&self.groq))
            .finish()
    }
}

/// Text-to-speech configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub voice_id: String,
    pub model: String,
    pub settings: VoiceSettings,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model: "eleven_multilingual_v2".to_string(),
            settings: VoiceSettings::default(),
        }
    }
}

/// Response generation configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: GROQ_API_BASE.to_string(),
            model: "mixtral-8x7b-32768".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}

impl Config {
    /// Load configuration from the environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if a resolved value is out of range
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Compose a config file with an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a resolved value is out of range
    pub fn resolve(fc: VoiceConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
            groq: env("GROQ_API_KEY").or(fc.api_keys.groq),
        };

        let port = parse_env(&env, "BEACON_VOICE_PORT")
            .or(fc.server.port)
            .unwrap_or(DEFAULT_PORT);

        let pipeline_defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            confidence_threshold: parse_env(&env, "BEACON_VOICE_CONFIDENCE_THRESHOLD")
                .or(fc.pipeline.confidence_threshold)
                .unwrap_or(pipeline_defaults.confidence_threshold),
            stage_timeout: parse_env(&env, "BEACON_VOICE_STAGE_TIMEOUT_MS")
                .or(fc.pipeline.stage_timeout_ms)
                .map_or(pipeline_defaults.stage_timeout, Duration::from_millis),
            history_exchanges: fc
                .pipeline
                .history_exchanges
                .unwrap_or(pipeline_defaults.history_exchanges),
            max_context_results: fc
                .pipeline
                .max_context_results
                .unwrap_or(pipeline_defaults.max_context_results),
            system_prompt: fc
                .pipeline
                .system_prompt
                .unwrap_or(pipeline_defaults.system_prompt),
        };

        let session_defaults = SessionConfig::default();
        let sessions = SessionConfig {
            context_turns: fc
                .sessions
                .context_turns
                .unwrap_or(session_defaults.context_turns),
            max_active: parse_env(&env, "BEACON_VOICE_MAX_SESSIONS")
                .or(fc.sessions.max_active)
                .unwrap_or(session_defaults.max_active),
            idle_timeout: parse_env(&env, "BEACON_VOICE_IDLE_TIMEOUT_SECS")
                .or(fc.sessions.idle_timeout_secs)
                .map_or(session_defaults.idle_timeout, Duration::from_secs),
            max_history: fc
                .sessions
                .max_history
                .unwrap_or(session_defaults.max_history),
        };

        let tts_defaults = TtsConfig::default();
        let settings_defaults = tts_defaults.settings;
        let tts = TtsConfig {
            voice_id: env("BEACON_VOICE_TTS_VOICE")
                .or(fc.tts.voice_id)
                .unwrap_or(tts_defaults.voice_id),
            model: fc.tts.model.unwrap_or(tts_defaults.model),
            settings: VoiceSettings {
                stability: fc.tts.stability.unwrap_or(settings_defaults.stability),
                similarity_boost: fc
                    .tts
                    .similarity_boost
                    .unwrap_or(settings_defaults.similarity_boost),
                style: fc.tts.style.unwrap_or(settings_defaults.style),
                use_speaker_boost: fc
                    .tts
                    .use_speaker_boost
                    .unwrap_or(settings_defaults.use_speaker_boost),
            },
        };

        let llm_defaults = LlmConfig::default();
        let llm = LlmConfig {
            base_url: fc.llm.base_url.unwrap_or(llm_defaults.base_url),
            model: env("BEACON_VOICE_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or(llm_defaults.model),
            max_tokens: fc.llm.max_tokens.unwrap_or(llm_defaults.max_tokens),
            temperature: fc.llm.temperature.unwrap_or(llm_defaults.temperature),
        };

        let config = Self {
            port,
            api_keys,
            stt_model: env("BEACON_VOICE_STT_MODEL")
                .or(fc.stt.model)
                .unwrap_or_else(|| "nova-2".to_string()),
            tts,
            llm,
            knowledge_path: env("BEACON_VOICE_KNOWLEDGE_PATH")
                .map(PathBuf::from)
                .or(fc.knowledge.path),
            pipeline,
            sessions,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.pipeline.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence threshold must be between 0 and 1, got {}",
                self.pipeline.confidence_threshold
            )));
        }
        if self.pipeline.stage_timeout.is_zero() {
            return Err(Error::Config("stage timeout must be positive".to_string()));
        }
        if self.sessions.max_active == 0 {
            return Err(Error::Config(
                "max active sessions must be at least 1".to_string(),
            ));
        }
        if self.sessions.context_turns == 0 {
            return Err(Error::Config(
                "context window must hold at least one turn".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the provider set described by this config
    ///
    /// # Errors
    ///
    /// Returns error if an API key is missing or the knowledge base cannot be loaded
    pub fn providers(&self) -> Result<Providers> {
        let require = |key: &Option<String>, name: &str| {
            key.clone()
                .ok_or_else(|| Error::Config(format!("{name} is not set")))
        };

        let transcriber = DeepgramTranscriber::new(
            require(&self.api_keys.deepgram, "DEEPGRAM_API_KEY")?,
            self.stt_model.clone(),
        )?;

        let synthesizer = ElevenLabsSynthesizer::new(
            require(&self.api_keys.elevenlabs, "ELEVENLABS_API_KEY")?,
            self.tts.voice_id.clone(),
            self.tts.model.clone(),
        )?
        .with_settings(self.tts.settings);

        let generator = ChatCompletionGenerator::new(
            require(&self.api_keys.groq, "GROQ_API_KEY")?,
            self.llm.base_url.clone(),
            self.llm.model.clone(),
        )?
        .with_sampling(self.llm.max_tokens, self.llm.temperature);

        let retriever = match &self.knowledge_path {
            Some(path) => KnowledgeBaseRetriever::load(path)?,
            None => {
                tracing::warn!(
                    "no knowledge base configured, replies will not use retrieved context"
                );
                KnowledgeBaseRetriever::default()
            }
        };

        Ok(Providers {
            transcriber: Arc::new(transcriber),
            retriever: Arc::new(retriever),
            generator: Arc::new(generator),
            synthesizer: Arc::new(synthesizer),
        })
    }
}
