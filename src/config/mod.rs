//! Configuration management for the Doudou assistant
//!
//! A [`Config`] is built once at start-up and handed by reference to each
//! component constructor. Nothing mutates it afterwards.

pub mod file;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::handlers::ReplyRule;
use crate::{Error, Result};

use file::DoudouConfigFile;

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Microphone stream
    pub audio: AudioConfig,

    /// Voice activity detection
    pub vad: VadConfig,

    /// Conversation memory
    pub context: ContextConfig,

    /// Handler chain
    pub handlers: HandlersConfig,

    /// LLM backend
    pub llm: LlmConfig,

    /// Wake phrases
    pub wake: WakeConfig,

    /// Speech-to-text
    pub stt: SttConfig,

    /// Text-to-speech
    pub tts: TtsConfig,

    /// Spoken messages
    pub messages: AssistantMessages,

    /// Directory for temporary utterance clips
    pub temp_dir: PathBuf,

    /// Mirror all wake-loop audio into this WAV file
    pub debug_wav_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            vad: VadConfig::default(),
            context: ContextConfig::default(),
            handlers: HandlersConfig::default(),
            llm: LlmConfig::default(),
            wake: WakeConfig::default(),
            stt: SttConfig::default(),
            tts: TtsConfig::default(),
            messages: AssistantMessages::default(),
            temp_dir: std::env::temp_dir().join("doudou"),
            debug_wav_path: None,
        }
    }
}

/// Microphone stream configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Samples per second (mono)
    pub sample_rate: u32,

    /// Samples per frame
    pub frame_size: usize,

    /// Longest wait for a single frame
    pub read_timeout: Duration,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_size: 1024,
            read_timeout: Duration::from_secs(2),
        }
    }
}

impl AudioConfig {
    /// Duration covered by one frame
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_size as f64 / f64::from(self.sample_rate))
    }
}

/// Voice activity detection configuration
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Mean absolute amplitude (i16 scale) above which a frame is speech
    pub energy_threshold: f32,

    /// Frame-to-frame energy change that marks a speech onset
    pub energy_delta: f32,

    /// Consecutive silence that ends an utterance
    pub silence_limit: Duration,

    /// Hard cap on the length of one clip
    pub max_duration: Duration,

    /// Longest wait for speech to start
    pub max_wait: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 300.0,
            energy_delta: 100.0,
            silence_limit: Duration::from_secs(3),
            max_duration: Duration::from_secs(10),
            max_wait: Duration::from_secs(10),
        }
    }
}

/// Conversation memory configuration
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Turns at least this old drop out of the active view
    pub timeout: Duration,

    /// Most turns kept in storage
    pub max_turns: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_turns: 10,
        }
    }
}

/// Handler chain configuration
#[derive(Debug, Clone)]
pub struct HandlersConfig {
    /// Enabled handler names; earlier entries win ties in priority
    pub enabled: Vec<String>,

    /// Priority overrides per handler name
    pub priorities: HashMap<String, i32>,

    /// Reply rules for the `rules` handler
    pub rules: Vec<ReplyRule>,
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            enabled: ["rules", "time", "greeting", "llm"]
                .into_iter()
                .map(String::from)
                .collect(),
            priorities: HashMap::new(),
            rules: Vec::new(),
        }
    }
}

impl HandlersConfig {
    /// Effective priority of a handler: the configured value, else `declared`
    #[must_use]
    pub fn priority_of(&self, name: &str, declared: i32) -> i32 {
        self.priorities.get(name).copied().unwrap_or(declared)
    }
}

/// LLM backend configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Ollama base URL
    pub host: String,

    /// Model name
    pub model: String,

    /// Request timeout
    pub timeout: Duration,

    /// Sampling temperature (backend default when unset)
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "gemma3".to_string(),
            timeout: Duration::from_secs(90),
            temperature: None,
        }
    }
}

/// Wake phrase configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Phrases that wake the assistant; the index of the match is reported
    pub phrases: Vec<String>,

    /// RMS energy (normalized) that opens a candidate wake segment
    pub energy_threshold: f32,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            phrases: vec!["豆豆".to_string()],
            energy_threshold: 0.03,
        }
    }
}

/// STT provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttProviderKind {
    #[default]
    Whisper,
    Deepgram,
}

impl SttProviderKind {
    fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Speech-to-text configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub provider: SttProviderKind,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
    /// Language hint sent to the backend, if any
    pub language: Option<String>,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            provider: SttProviderKind::Whisper,
            model: "whisper-1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(15),
            language: Some("zh".to_string()),
        }
    }
}

/// TTS provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProviderKind {
    #[default]
    OpenAI,
    ElevenLabs,
    /// Print responses instead of speaking them
    Console,
}

impl TtsProviderKind {
    fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "elevenlabs" => Ok(Self::ElevenLabs),
            "console" => Ok(Self::Console),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Text-to-speech configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub provider: TtsProviderKind,
    pub model: String,
    pub voice: String,
    pub speed: f32,
    pub api_key: Option<SecretString>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: TtsProviderKind::OpenAI,
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            api_key: None,
        }
    }
}

/// Fixed utterances spoken by the session
#[derive(Debug, Clone)]
pub struct AssistantMessages {
    /// Spoken right after the wake phrase
    pub acknowledge: String,
    /// Spoken once a transcript is in hand, before dispatch
    pub thinking: String,
    /// Spoken when no handler answers
    pub fallback: String,
    /// Spoken when nothing intelligible was captured
    pub not_heard: String,
    /// Spoken when the wake cycle fails
    pub apology: String,
}

impl Default for AssistantMessages {
    fn default() -> Self {
        Self {
            acknowledge: "豆豆在呢，咋了呀".to_string(),
            thinking: "已收到您的问题，让豆豆先思考下再回复您".to_string(),
            fallback: "抱歉，我不太明白你的意思".to_string(),
            not_heard: "抱歉，我没有听清，请再说一遍".to_string(),
            apology: "抱歉，处理时出现错误，请重试".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the TOML file and the process environment
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file cannot be loaded or the
    /// resulting configuration is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path)?;
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration with precedence env > toml > default
    ///
    /// # Errors
    ///
    /// Returns error if a value is malformed or out of range
    pub fn from_sources(fc: DoudouConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let env_num = |key: &str| parse_env::<u64>(&env, key);
        let env_float = |key: &str| parse_env::<f32>(&env, key);

        let audio = AudioConfig {
            sample_rate: parse_env::<u32>(&env, "DOUDOU_SAMPLE_RATE")?
                .or(fc.audio.sample_rate)
                .unwrap_or(defaults.audio.sample_rate),
            frame_size: parse_env::<usize>(&env, "DOUDOU_FRAME_SIZE")?
                .or(fc.audio.frame_size)
                .unwrap_or(defaults.audio.frame_size),
            read_timeout: fc
                .audio
                .read_timeout_ms
                .map_or(defaults.audio.read_timeout, Duration::from_millis),
        };

        let vad = VadConfig {
            energy_threshold: env_float("DOUDOU_ENERGY_THRESHOLD")?
                .or(fc.vad.energy_threshold)
                .unwrap_or(defaults.vad.energy_threshold),
            energy_delta: env_float("DOUDOU_ENERGY_DELTA")?
                .or(fc.vad.energy_delta)
                .unwrap_or(defaults.vad.energy_delta),
            silence_limit: seconds(fc.vad.silence_limit_secs, defaults.vad.silence_limit)?,
            max_duration: seconds(fc.vad.max_duration_secs, defaults.vad.max_duration)?,
            max_wait: seconds(fc.vad.max_wait_secs, defaults.vad.max_wait)?,
        };

        let context = ContextConfig {
            timeout: env_num("DOUDOU_CONTEXT_TIMEOUT")?
                .or(fc.context.timeout_secs)
                .map_or(defaults.context.timeout, Duration::from_secs),
            max_turns: parse_env::<usize>(&env, "DOUDOU_MAX_CONTEXT_TURNS")?
                .or(fc.context.max_turns)
                .unwrap_or(defaults.context.max_turns),
        };

        let handlers = HandlersConfig {
            enabled: env("DOUDOU_HANDLERS")
                .map(|s| split_list(&s))
                .or(fc.handlers.enabled)
                .unwrap_or(defaults.handlers.enabled),
            priorities: fc.handlers.priorities,
            rules: fc.handlers.rules,
        };

        let llm = LlmConfig {
            host: env("LLM_HOST")
                .or(fc.llm.host)
                .unwrap_or(defaults.llm.host),
            model: env("DOUDOU_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or(defaults.llm.model),
            timeout: fc
                .llm
                .timeout_secs
                .map_or(defaults.llm.timeout, Duration::from_secs),
            temperature: fc.llm.temperature,
        };

        let wake = WakeConfig {
            phrases: env("DOUDOU_WAKE_PHRASES")
                .map(|s| split_list(&s))
                .or(fc.wake.phrases)
                .unwrap_or(defaults.wake.phrases),
            energy_threshold: fc
                .wake
                .energy_threshold
                .unwrap_or(defaults.wake.energy_threshold),
        };

        let stt_provider = fc
            .stt
            .provider
            .as_deref()
            .map(SttProviderKind::parse)
            .transpose()?
            .unwrap_or_default();
        let stt_key_var = match stt_provider {
            SttProviderKind::Whisper => "OPENAI_API_KEY",
            SttProviderKind::Deepgram => "DEEPGRAM_API_KEY",
        };
        let stt = SttConfig {
            provider: stt_provider,
            model: fc.stt.model.unwrap_or_else(|| match stt_provider {
                SttProviderKind::Whisper => defaults.stt.model.clone(),
                SttProviderKind::Deepgram => "nova-2".to_string(),
            }),
            api_key: env(stt_key_var)
                .or(fc.stt.api_key)
                .map(SecretString::from),
            timeout: fc
                .stt
                .timeout_secs
                .map_or(defaults.stt.timeout, Duration::from_secs),
            language: match env("DOUDOU_STT_LANGUAGE").or(fc.stt.language) {
                Some(language) if language.trim().is_empty() => None,
                Some(language) => Some(language.trim().to_string()),
                None => defaults.stt.language.clone(),
            },
        };

        let tts_provider = env("DOUDOU_TTS_PROVIDER")
            .or(fc.tts.provider)
            .as_deref()
            .map(TtsProviderKind::parse)
            .transpose()?
            .unwrap_or_default();
        let tts_key = match tts_provider {
            TtsProviderKind::OpenAI => env("OPENAI_API_KEY"),
            TtsProviderKind::ElevenLabs => env("ELEVENLABS_API_KEY"),
            TtsProviderKind::Console => None,
        };
        let tts = TtsConfig {
            provider: tts_provider,
            model: fc.tts.model.unwrap_or_else(|| match tts_provider {
                TtsProviderKind::ElevenLabs => "eleven_multilingual_v2".to_string(),
                _ => defaults.tts.model.clone(),
            }),
            voice: fc.tts.voice.unwrap_or(defaults.tts.voice),
            speed: fc.tts.speed.unwrap_or(defaults.tts.speed),
            api_key: tts_key.or(fc.tts.api_key).map(SecretString::from),
        };

        let dm = defaults.messages;
        let messages = AssistantMessages {
            acknowledge: fc.messages.acknowledge.unwrap_or(dm.acknowledge),
            thinking: fc.messages.thinking.unwrap_or(dm.thinking),
            fallback: fc.messages.fallback.unwrap_or(dm.fallback),
            not_heard: fc.messages.not_heard.unwrap_or(dm.not_heard),
            apology: fc.messages.apology.unwrap_or(dm.apology),
        };

        let temp_dir = env("DOUDOU_TEMP_DIR")
            .or(fc.temp_dir)
            .map_or(defaults.temp_dir, PathBuf::from);

        let debug_wav_path = env("DOUDOU_DEBUG_WAV")
            .or(fc.debug_wav_path)
            .map(PathBuf::from);

        let config = Self {
            audio,
            vad,
            context,
            handlers,
            llm,
            wake,
            stt,
            tts,
            messages,
            temp_dir,
            debug_wav_path,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first offending value
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be positive".into()));
        }
        if self.audio.frame_size == 0 {
            return Err(Error::Config("audio.frame_size must be positive".into()));
        }
        if !(self.vad.energy_threshold >= 0.0 && self.vad.energy_delta >= 0.0) {
            return Err(Error::Config("vad thresholds must be non-negative".into()));
        }
        if self.vad.silence_limit.is_zero() || self.vad.max_duration.is_zero() {
            return Err(Error::Config(
                "vad.silence_limit_secs and vad.max_duration_secs must be positive".into(),
            ));
        }
        if self.context.max_turns == 0 {
            return Err(Error::Config("context.max_turns must be positive".into()));
        }
        if self.handlers.enabled.is_empty() {
            return Err(Error::Config("handlers.enabled must not be empty".into()));
        }
        if self.wake.phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(Error::Config("wake.phrases must name at least one phrase".into()));
        }
        Ok(())
    }
}

fn seconds(value: Option<f32>, default: Duration) -> Result<Duration> {
    value.map_or(Ok(default), |secs| {
        Duration::try_from_secs_f32(secs)
            .map_err(|e| Error::Config(format!("invalid duration {secs}: {e}")))
    })
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{key}={v}: {e}")))
        })
        .transpose()
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}
