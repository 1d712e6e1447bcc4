//! Audio capture from microphone

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use crate::config::AudioConfig;
use crate::{Error, Result};

use super::frame::{AudioFrame, AudioFrameSource};

/// Captures audio from the default input device
///
/// The device callback downmixes to mono, converts samples to i16 and
/// forwards them over a channel; the stream stops when the capture is
/// dropped.
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supports = |channels: u16| -> Result<Option<cpal::SupportedStreamConfigRange>> {
            Ok(device
                .supported_input_configs()
                .map_err(|e| Error::Audio(e.to_string()))?
                .find(|c| {
                    c.channels() == channels
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                }))
        };

        // Prefer mono, fall back to stereo and downmix
        let supported_config = match supports(1)? {
            Some(config) => config,
            None => supports(2)?
                .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?,
        };

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    /// Start capturing, sending sample blocks to `tx`
    ///
    /// # Errors
    ///
    /// Returns error if capture fails
    pub fn start(&mut self, tx: mpsc::UnboundedSender<Vec<i16>>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels);
        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Receiver gone means the source was dropped
                    let _ = tx.send(downmix(data, channels));
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Frame source backed by the default microphone
pub struct MicrophoneSource {
    capture: AudioCapture,
    rx: mpsc::UnboundedReceiver<Vec<i16>>,
    pending: VecDeque<i16>,
    sample_rate: u32,
    frame_size: usize,
    read_timeout: Duration,
}

impl MicrophoneSource {
    /// Open and start the default microphone
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened or started
    pub fn open(audio: &AudioConfig) -> Result<Self> {
        let mut capture = AudioCapture::new(audio.sample_rate)?;
        let (tx, rx) = mpsc::unbounded_channel();
        capture.start(tx)?;

        Ok(Self {
            capture,
            rx,
            pending: VecDeque::new(),
            sample_rate: audio.sample_rate,
            frame_size: audio.frame_size,
            read_timeout: audio.read_timeout,
        })
    }

    /// Check if the underlying stream is running
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.capture.is_capturing()
    }
}

#[async_trait(?Send)]
impl AudioFrameSource for MicrophoneSource {
    async fn read_frame(&mut self) -> Result<AudioFrame> {
        while self.pending.len() < self.frame_size {
            match tokio::time::timeout(self.read_timeout, self.rx.recv()).await {
                Ok(Some(block)) => self.pending.extend(block),
                Ok(None) => return Err(Error::Capture("input stream closed".to_string())),
                Err(_) => {
                    return Err(Error::Capture(format!(
                        "no audio within {}ms",
                        self.read_timeout.as_millis()
                    )));
                }
            }
        }

        let samples: Vec<i16> = self.pending.drain(..self.frame_size).collect();
        Ok(AudioFrame::new(samples))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn discard_pending(&mut self) {
        let mut dropped = self.pending.len();
        self.pending.clear();
        while let Ok(block) = self.rx.try_recv() {
            dropped += block.len();
        }
        tracing::trace!(samples = dropped, "discarded buffered audio");
    }
}

/// Average interleaved `channels` into mono i16 samples
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn downmix(data: &[f32], channels: usize) -> Vec<i16> {
    let channels = channels.max(1);
    data.chunks(channels)
        .map(|frame| {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            (mono * 32767.0).clamp(-32768.0, 32767.0) as i16
        })
        .collect()
}
