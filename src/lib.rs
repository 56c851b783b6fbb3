//! Beacon Voice - Voice pipeline orchestrator for phone-style assistants
//!
//! This library provides the core of a voice customer-service assistant:
//! - Session management (admission, context windows, idle sweep)
//! - The fragment pipeline (STT, retrieval, generation, TTS)
//! - Call analytics over finished sessions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Transports                        │
//! │        HTTP API  │  Telephony  │  WebSocket  │ ...   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  VoiceService                        │
//! │   Sessions  │  Pipeline Orchestrator  │  Analytics   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Providers                          │
//! │  Deepgram  │  Knowledge Base  │  Groq  │ ElevenLabs  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod service;
pub mod session;

pub use analytics::AnalyticsEngine;
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Orchestrator, Outcome, PipelineConfig, PipelineResult};
pub use providers::{Generator, Providers, Retriever, Synthesizer, Transcriber};
pub use service::VoiceService;
pub use session::{Session, SessionConfig, SessionManager, SessionStatus};
