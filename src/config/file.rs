//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-voice/config.toml` as a persistent config
//! source. Every field is optional; the file is a partial overlay on top of
//! defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct VoiceConfigFile {
    #[serde(default)]
    pub server: ServerFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    #[serde(default)]
    pub sessions: SessionsFileConfig,

    /// Speech-to-text settings
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Text-to-speech settings
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Response generation settings
    #[serde(default)]
    pub llm: LlmFileConfig,

    #[serde(default)]
    pub knowledge: KnowledgeFileConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
    pub groq: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Minimum transcription confidence (0.0 to 1.0)
    pub confidence_threshold: Option<f32>,
    /// Per-stage capability timeout
    pub stage_timeout_ms: Option<u64>,
    pub history_exchanges: Option<usize>,
    pub max_context_results: Option<usize>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionsFileConfig {
    pub max_active: Option<usize>,
    pub idle_timeout_secs: Option<u64>,
    /// Turns retained per context window
    pub context_turns: Option<usize>,
    pub max_history: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// Deepgram model (e.g. "nova-2")
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// ElevenLabs voice identifier
    pub voice_id: Option<String>,
    /// ElevenLabs model (e.g. "eleven_multilingual_v2")
    pub model: Option<String>,
    pub stability: Option<f32>,
    pub similarity_boost: Option<f32>,
    pub style: Option<f32>,
    pub use_speaker_boost: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// OpenAI-compatible API base URL
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KnowledgeFileConfig {
    /// Knowledge base TOML file
    pub path: Option<PathBuf>,
}

/// Load the TOML config file from the standard path
///
/// Returns `VoiceConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> VoiceConfigFile {
    let Some(path) = config_file_path() else {
        return VoiceConfigFile::default();
    };

    if !path.exists() {
        return VoiceConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                VoiceConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            VoiceConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/beacon-voice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-voice")
            .join("config.toml")
    })
}
