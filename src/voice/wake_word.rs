//! Wake word detection
//!
//! Energy gating finds short speech segments in the idle stream; each
//! segment is transcribed and matched against the configured wake phrases.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::{Error, Result};

use super::frame::{AudioFrame, UtteranceClip};
use super::stt::Transcriber;

/// Minimum segment length worth transcribing
const MIN_SPEECH_SECS: f32 = 0.3;

/// Silence that closes a candidate segment
const SILENCE_SECS: f32 = 0.5;

/// Segments longer than this are checked without waiting for silence
const MAX_SEGMENT_SECS: f32 = 3.0;

/// Consumes the idle audio stream and reports wake phrases
#[async_trait]
pub trait WakeDetector: Send {
    /// Process one frame
    ///
    /// Returns the index of the triggered phrase, or a negative value.
    ///
    /// # Errors
    ///
    /// Returns error if the detector cannot process audio at all; a failed
    /// check of one segment is not an error
    async fn process(&mut self, frame: &AudioFrame) -> Result<i32>;

    /// Drop any partially accumulated audio
    fn reset(&mut self) {}
}

/// State of the segment gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Accumulating a candidate segment
    Listening,
}

/// Wake detector that verifies candidate segments by transcription
pub struct TranscribedWakeDetector {
    phrases: Vec<String>,
    transcriber: Arc<dyn Transcriber>,
    temp_dir: PathBuf,
    sample_rate: u32,
    energy_threshold: f32,
    min_speech_samples: usize,
    silence_samples_limit: usize,
    max_segment_samples: usize,

    state: DetectorState,
    segment: UtteranceClip,
    segment_samples: usize,
    silence_samples: usize,
}

impl TranscribedWakeDetector {
    /// Create a detector for the configured wake phrases
    ///
    /// # Errors
    ///
    /// Returns [`Error::WakeWord`] if no usable phrase is configured
    pub fn new(config: &Config, transcriber: Arc<dyn Transcriber>) -> Result<Self> {
        let phrases: Vec<String> = config
            .wake
            .phrases
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        if phrases.is_empty() {
            return Err(Error::WakeWord("at least one wake phrase required".to_string()));
        }

        let rate = config.audio.sample_rate;
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let secs = |s: f32| (s * rate as f32) as usize;

        tracing::debug!(wake_phrases = ?phrases, "wake word detector initialized");

        Ok(Self {
            phrases,
            transcriber,
            temp_dir: config.temp_dir.clone(),
            sample_rate: rate,
            energy_threshold: config.wake.energy_threshold,
            min_speech_samples: secs(MIN_SPEECH_SECS),
            silence_samples_limit: secs(SILENCE_SECS),
            max_segment_samples: secs(MAX_SEGMENT_SECS),
            state: DetectorState::Idle,
            segment: UtteranceClip::new(rate),
            segment_samples: 0,
            silence_samples: 0,
        })
    }

    /// Configured wake phrases, normalized
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Current gate state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    /// Index of the first wake phrase contained in `transcript`
    #[must_use]
    pub fn match_phrase(&self, transcript: &str) -> Option<usize> {
        let normalized = transcript.to_lowercase();
        self.phrases.iter().position(|p| normalized.contains(p.as_str()))
    }

    /// Feed the gate; returns a finished segment when one is ready
    fn gate(&mut self, frame: &AudioFrame) -> Option<UtteranceClip> {
        let is_speech = frame.rms() > self.energy_threshold;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Listening;
                    self.segment = UtteranceClip::new(self.sample_rate);
                    self.segment.push(frame.clone());
                    self.segment_samples = frame.len();
                    self.silence_samples = 0;
                    tracing::trace!("speech detected, listening");
                }
                None
            }
            DetectorState::Listening => {
                self.segment.push(frame.clone());
                self.segment_samples += frame.len();

                if is_speech {
                    self.silence_samples = 0;
                } else {
                    self.silence_samples += frame.len();
                }

                let closed = self.silence_samples > self.silence_samples_limit;
                let long_enough = self.segment_samples > self.min_speech_samples;

                if (closed && long_enough) || self.segment_samples >= self.max_segment_samples {
                    let segment =
                        std::mem::replace(&mut self.segment, UtteranceClip::new(self.sample_rate));
                    self.reset();
                    return Some(segment);
                }

                // Too much silence without enough speech
                if self.silence_samples > self.silence_samples_limit * 2 {
                    tracing::trace!("timeout - resetting");
                    self.reset();
                }
                None
            }
        }
    }

    /// Transcribe a segment and look for a wake phrase
    async fn check_segment(&self, segment: &UtteranceClip) -> Result<Option<usize>> {
        std::fs::create_dir_all(&self.temp_dir)?;
        let file = tempfile::Builder::new()
            .prefix("wake_")
            .suffix(".wav")
            .tempfile_in(&self.temp_dir)?;
        segment.write_wav(file.path())?;

        let transcript = match self.transcriber.transcribe(file.path()).await {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(error = %e, "wake segment transcription failed");
                return Ok(None);
            }
        };

        let matched = self.match_phrase(&transcript);
        if let Some(index) = matched {
            tracing::info!(phrase = %self.phrases[index], transcript, "wake word detected");
        } else {
            tracing::debug!(transcript, "no wake word in segment");
        }
        Ok(matched)
    }
}

#[async_trait]
impl WakeDetector for TranscribedWakeDetector {
    async fn process(&mut self, frame: &AudioFrame) -> Result<i32> {
        let Some(segment) = self.gate(frame) else {
            return Ok(-1);
        };

        tracing::debug!(samples = segment.sample_count(), "checking segment for wake word");
        Ok(self
            .check_segment(&segment)
            .await?
            .and_then(|i| i32::try_from(i).ok())
            .unwrap_or(-1))
    }

    fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.segment = UtteranceClip::new(self.sample_rate);
        self.segment_samples = 0;
        self.silence_samples = 0;
    }
}
