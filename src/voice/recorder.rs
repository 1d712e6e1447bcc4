//! Voice activity recorder
//!
//! Turns a continuous frame stream into at most one utterance clip. A frame
//! is active when its mean absolute amplitude crosses the energy threshold or
//! when its energy jumps by more than the delta threshold from the previous
//! frame, which catches sudden onsets over an already noisy floor. The
//! first frame of a recording only seeds that reference, so a steady hum
//! below the threshold never counts as an onset.
//!
//! All bounds are counted in samples, so the outcome for a given frame
//! sequence never depends on wall-clock time.

use crate::config::{AudioConfig, VadConfig};

use super::frame::{AudioFrame, AudioFrameSource, UtteranceClip};

/// Recorder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Waiting for speech to start
    Idle,
    /// Speech started, appending every frame
    Recording,
}

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Silence limit reached after speech
    Complete,
    /// Maximum duration reached
    Truncated,
    /// No speech before the wait bound, or capture failed
    Empty,
}

impl std::fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Truncated => write!(f, "truncated"),
            Self::Empty => write!(f, "empty"),
        }
    }
}

/// A finished recording
#[derive(Debug, Clone)]
pub struct Recording {
    pub clip: UtteranceClip,
    pub outcome: RecordOutcome,
}

impl Recording {
    /// Whether speech was captured
    #[must_use]
    pub fn has_speech(&self) -> bool {
        self.outcome != RecordOutcome::Empty && !self.clip.is_empty()
    }
}

/// Energy/delta voice activity recorder
#[derive(Debug)]
pub struct VoiceActivityRecorder {
    energy_threshold: f32,
    energy_delta: f32,
    sample_rate: u32,
    silence_limit_samples: usize,
    max_duration_samples: usize,
    max_wait_samples: usize,

    state: RecorderState,
    previous_energy: Option<f32>,
    clip: UtteranceClip,
    clip_samples: usize,
    silence_samples: usize,
    idle_samples: usize,
}

impl VoiceActivityRecorder {
    /// Create a recorder for the given stream and thresholds
    #[must_use]
    pub fn new(audio: &AudioConfig, vad: &VadConfig) -> Self {
        let rate = audio.sample_rate;
        tracing::debug!(
            sample_rate = rate,
            frame_size = audio.frame_size,
            energy_threshold = vad.energy_threshold,
            energy_delta = vad.energy_delta,
            "voice activity recorder initialized"
        );

        Self {
            energy_threshold: vad.energy_threshold,
            energy_delta: vad.energy_delta,
            sample_rate: rate,
            silence_limit_samples: samples_for(vad.silence_limit, rate).max(1),
            max_duration_samples: samples_for(vad.max_duration, rate).max(1),
            max_wait_samples: samples_for(vad.max_wait, rate),
            state: RecorderState::Idle,
            previous_energy: None,
            clip: UtteranceClip::new(rate),
            clip_samples: 0,
            silence_samples: 0,
            idle_samples: 0,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> RecorderState {
        self.state
    }

    /// Classify a frame, updating the previous-energy reference
    fn is_active(&mut self, frame: &AudioFrame) -> bool {
        let energy = frame.mean_abs();
        let above_threshold = energy > self.energy_threshold;
        let previous = self.previous_energy.replace(energy).unwrap_or(energy);
        let sudden_change = (energy - previous).abs() > self.energy_delta;
        above_threshold || sudden_change
    }

    /// Feed one frame
    ///
    /// Returns the terminal outcome once the recording is over; call
    /// [`Self::finish`] to take the clip.
    pub fn push(&mut self, frame: AudioFrame) -> Option<RecordOutcome> {
        let active = self.is_active(&frame);
        let len = frame.len();

        match self.state {
            RecorderState::Idle => {
                if !active {
                    self.idle_samples += len;
                    if self.idle_samples >= self.max_wait_samples {
                        tracing::debug!(waited = self.idle_samples, "no speech before wait bound");
                        return Some(RecordOutcome::Empty);
                    }
                    return None;
                }
                tracing::debug!(energy = ?self.previous_energy, "speech detected, recording");
                self.state = RecorderState::Recording;
                self.silence_samples = 0;
            }
            RecorderState::Recording => {
                if active {
                    self.silence_samples = 0;
                } else {
                    self.silence_samples += len;
                }
            }
        }

        self.clip.push(frame);
        self.clip_samples += len;

        tracing::trace!(
            clip_samples = self.clip_samples,
            silence = self.silence_samples,
            active,
            "recording state"
        );

        if self.silence_samples >= self.silence_limit_samples {
            return Some(RecordOutcome::Complete);
        }
        if self.clip_samples >= self.max_duration_samples {
            return Some(RecordOutcome::Truncated);
        }
        None
    }

    /// Take the recording for `outcome` and return to idle
    pub fn finish(&mut self, outcome: RecordOutcome) -> Recording {
        let clip = if outcome == RecordOutcome::Empty {
            UtteranceClip::new(self.sample_rate)
        } else {
            std::mem::replace(&mut self.clip, UtteranceClip::new(self.sample_rate))
        };
        self.reset();
        Recording { clip, outcome }
    }

    /// Reset to idle, dropping any partial clip
    pub fn reset(&mut self) {
        self.state = RecorderState::Idle;
        self.previous_energy = None;
        self.clip = UtteranceClip::new(self.sample_rate);
        self.clip_samples = 0;
        self.silence_samples = 0;
        self.idle_samples = 0;
    }

    /// Record one utterance from `source`
    ///
    /// Never fails: a capture error abandons the recording and yields
    /// [`RecordOutcome::Empty`].
    #[allow(clippy::future_not_send)]
    pub async fn record<S>(&mut self, source: &mut S) -> Recording
    where
        S: AudioFrameSource + ?Sized,
    {
        self.reset();

        loop {
            match source.read_frame().await {
                Ok(frame) => {
                    if let Some(outcome) = self.push(frame) {
                        let recording = self.finish(outcome);
                        tracing::info!(
                            outcome = %recording.outcome,
                            frames = recording.clip.frame_count(),
                            secs = recording.clip.duration().as_secs_f32(),
                            "recording finished"
                        );
                        return recording;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "capture failed, abandoning recording");
                    return self.finish(RecordOutcome::Empty);
                }
            }
        }
    }
}

/// Number of samples covering `duration` at `rate`, rounded up
fn samples_for(duration: std::time::Duration, rate: u32) -> usize {
    let nanos = duration.as_nanos() * u128::from(rate);
    usize::try_from(nanos.div_ceil(1_000_000_000)).unwrap_or(usize::MAX)
}
