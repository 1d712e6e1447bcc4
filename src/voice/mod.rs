//! Voice processing module
//!
//! Handles audio capture, utterance recording, wake word detection,
//! speech-to-text, speech synthesis and playback.

mod capture;
mod frame;
mod playback;
mod recorder;
mod speaker;
mod stt;
mod tts;
mod wake_word;

pub use capture::{AudioCapture, MicrophoneSource};
pub use frame::{AudioFrame, AudioFrameSource, UtteranceClip, wav_spec};
pub use playback::{AudioPlayback, DEFAULT_PLAYBACK_RATE};
pub use recorder::{RecordOutcome, RecorderState, Recording, VoiceActivityRecorder};
pub use speaker::{ConsoleSpeaker, Speaker, TtsSpeaker};
pub use stt::{SpeechToText, Transcriber};
pub use tts::TextToSpeech;
pub use wake_word::{DetectorState, TranscribedWakeDetector, WakeDetector};
