//! TOML configuration file loading
//!
//! Supports `~/.config/doudou/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::handlers::ReplyRule;
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct DoudouConfigFile {
    /// Microphone stream configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Voice activity detection thresholds and bounds
    #[serde(default)]
    pub vad: VadFileConfig,

    /// Conversation memory bounds
    #[serde(default)]
    pub context: ContextFileConfig,

    /// Handler chain configuration
    #[serde(default)]
    pub handlers: HandlersFileConfig,

    /// LLM backend configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Wake phrase configuration
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Speech-to-text configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Text-to-speech configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Spoken messages
    #[serde(default)]
    pub messages: MessagesFileConfig,

    /// Directory for temporary utterance clips
    pub temp_dir: Option<String>,

    /// Mirror all wake-loop audio into this WAV file
    pub debug_wav_path: Option<String>,
}

/// Microphone stream configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub sample_rate: Option<u32>,
    pub frame_size: Option<usize>,
    /// Longest wait for a single frame before the read counts as failed
    pub read_timeout_ms: Option<u64>,
}

/// Voice activity detection configuration
#[derive(Debug, Default, Deserialize)]
pub struct VadFileConfig {
    /// Mean absolute amplitude above which a frame counts as speech
    pub energy_threshold: Option<f32>,
    /// Frame-to-frame energy change that counts as a speech onset
    pub energy_delta: Option<f32>,
    pub silence_limit_secs: Option<f32>,
    pub max_duration_secs: Option<f32>,
    pub max_wait_secs: Option<f32>,
}

/// Conversation memory configuration
#[derive(Debug, Default, Deserialize)]
pub struct ContextFileConfig {
    pub timeout_secs: Option<u64>,
    pub max_turns: Option<usize>,
}

/// Handler chain configuration
#[derive(Debug, Default, Deserialize)]
pub struct HandlersFileConfig {
    /// Enabled handlers; earlier entries win ties in priority
    pub enabled: Option<Vec<String>>,

    /// Declared priority per handler name (higher runs first)
    #[serde(default)]
    pub priorities: HashMap<String, i32>,

    /// Regex reply rules for the `rules` handler
    #[serde(default)]
    pub rules: Vec<ReplyRule>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Ollama base URL (e.g. `http://localhost:11434`)
    pub host: Option<String>,

    /// Model name (e.g. "gemma3")
    pub model: Option<String>,

    pub timeout_secs: Option<u64>,

    pub temperature: Option<f32>,
}

/// Wake phrase configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    pub phrases: Option<Vec<String>>,

    /// RMS energy that opens a candidate wake segment
    pub energy_threshold: Option<f32>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// "whisper" or "deepgram"
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,

    /// Spoken language hint (ISO 639-1); empty disables it
    pub language: Option<String>,
}

/// Text-to-speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// "openai", "elevenlabs" or "console"
    pub provider: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    pub api_key: Option<String>,
}

/// Spoken messages
#[derive(Debug, Default, Deserialize)]
pub struct MessagesFileConfig {
    pub acknowledge: Option<String>,
    pub thinking: Option<String>,
    pub fallback: Option<String>,
    pub not_heard: Option<String>,
    pub apology: Option<String>,
}

/// Load the TOML config file
///
/// An explicit `path` must exist and parse. Without one, the standard path is
/// tried and `DoudouConfigFile::default()` is returned if it is missing or
/// broken.
///
/// # Errors
///
/// Returns error if an explicitly requested file cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<DoudouConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(DoudouConfigFile::default());
    };

    if !path.exists() {
        return Ok(DoudouConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(DoudouConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(DoudouConfigFile::default())
        }
    }
}

/// Return the config file path: `~/.config/doudou/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("doudou").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_overlay_parses() {
        let fc: DoudouConfigFile = toml::from_str(
            r#"
            [vad]
            energy_threshold = 450.0

            [handlers]
            enabled = ["greeting", "llm"]
            priorities = { greeting = 5 }

            [[handlers.rules]]
            pattern = "^ping$"
            reply = "pong"
            "#,
        )
        .unwrap();

        assert_eq!(fc.vad.energy_threshold, Some(450.0));
        assert!(fc.vad.energy_delta.is_none());
        assert_eq!(
            fc.handlers.enabled,
            Some(vec!["greeting".to_string(), "llm".to_string()])
        );
        assert_eq!(fc.handlers.priorities.get("greeting"), Some(&5));
        assert_eq!(fc.handlers.rules.len(), 1);
        assert!(fc.llm.host.is_none());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            load_config_file(Some(&missing)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_explicit_file_loads() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[llm]\nmodel = \"qwen3\"\n").unwrap();

        let fc = load_config_file(Some(&path)).unwrap();
        assert_eq!(fc.llm.model.as_deref(), Some("qwen3"));
    }
}
