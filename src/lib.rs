//! Doudou - a wake-word voice assistant
//!
//! This library provides the interaction pipeline:
//! - Voice processing (capture, voice activity recording, wake word, STT, TTS)
//! - A priority-ordered chain of response handlers
//! - Short-term conversational memory
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────┐   ┌─────────────┐
//! │  Microphone  │──▶│ VoiceActivityRecorder│──▶│ Transcriber │
//! └──────────────┘   └──────────────────────┘   └──────┬──────┘
//!        │                                             │
//!        ▼                                             ▼
//! ┌──────────────┐                             ┌──────────────┐
//! │ WakeDetector │                             │ HandlerChain │◀─▶ ContextStore
//! └──────────────┘                             └──────┬───────┘
//!                                                     ▼
//!                                              ┌──────────────┐
//!                                              │   Speaker    │
//!                                              └──────────────┘
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod session;
pub mod voice;

pub use config::Config;
pub use context::{ContextStore, Turn};
pub use error::{Error, Result};
pub use handlers::{Dispatch, Handler, HandlerChain, HandlerInfo, Registration, build_chain};
pub use llm::OllamaClient;
pub use session::{Session, SessionStatus};
