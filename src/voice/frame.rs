//! PCM frames, utterance clips and the frame source contract

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Fixed-length block of signed 16-bit mono samples
///
/// Frames are immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Box<[i16]>,
}

impl AudioFrame {
    /// Wrap a block of samples
    #[must_use]
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }

    /// A frame of `len` zero samples
    #[must_use]
    pub fn silence(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    /// Samples in this frame
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean absolute sample magnitude on the i16 scale
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_abs(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: u64 = self
            .samples
            .iter()
            .map(|&s| u64::from(s.unsigned_abs()))
            .sum();
        (sum as f64 / self.samples.len() as f64) as f32
    }

    /// RMS energy with samples normalized to [-1.0, 1.0]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let v = f64::from(s) / 32768.0;
                v * v
            })
            .sum();
        (sum_squares / self.samples.len() as f64).sqrt() as f32
    }
}

/// Ordered frames captured for one utterance
#[derive(Debug, Clone, Default)]
pub struct UtteranceClip {
    frames: Vec<AudioFrame>,
    sample_rate: u32,
}

impl UtteranceClip {
    /// Create an empty clip at `sample_rate`
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self {
            frames: Vec::new(),
            sample_rate,
        }
    }

    pub(crate) fn push(&mut self, frame: AudioFrame) {
        self.frames.push(frame);
    }

    /// Captured frames in order
    #[must_use]
    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    /// Number of frames
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Total number of samples
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.frames.iter().map(AudioFrame::len).sum()
    }

    /// Whether no audio was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sample rate of the clip
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of the captured audio
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.sample_count() as f64 / f64::from(self.sample_rate))
    }

    /// All samples, concatenated
    #[must_use]
    pub fn to_samples(&self) -> Vec<i16> {
        self.frames
            .iter()
            .flat_map(|f| f.samples().iter().copied())
            .collect()
    }

    /// Write the clip as a mono 16-bit WAV file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or encoded
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let mut writer = hound::WavWriter::create(path, wav_spec(self.sample_rate))?;
        for frame in &self.frames {
            for &sample in frame.samples() {
                writer.write_sample(sample)?;
            }
        }
        writer.finalize()?;
        Ok(())
    }
}

/// WAV header for mono 16-bit PCM
#[must_use]
pub const fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// A live stream of fixed-size PCM frames
///
/// Reads block on real-time I/O; implementations bound each read with a
/// timeout so a dead device surfaces as an error instead of a hang.
#[async_trait(?Send)]
pub trait AudioFrameSource {
    /// Read the next frame
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Capture`] if the device fails or times out
    async fn read_frame(&mut self) -> Result<AudioFrame>;

    /// Sample rate of produced frames
    fn sample_rate(&self) -> u32;

    /// Samples per produced frame
    fn frame_size(&self) -> usize;

    /// Drop audio buffered but not yet read
    fn discard_pending(&mut self) {}
}
