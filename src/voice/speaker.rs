//! Spoken output
//!
//! The session only needs `speak(text)`; how the words reach the user is up
//! to the implementation.

use async_trait::async_trait;

use crate::Result;

use super::playback::AudioPlayback;
use super::tts::TextToSpeech;

/// Delivers a response to the user
#[async_trait(?Send)]
pub trait Speaker {
    /// Say `text`
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails; callers log and move on
    async fn speak(&mut self, text: &str) -> Result<()>;
}

/// Synthesizes with a TTS backend and plays through the speakers
pub struct TtsSpeaker {
    tts: TextToSpeech,
    playback: AudioPlayback,
}

impl TtsSpeaker {
    #[must_use]
    pub const fn new(tts: TextToSpeech, playback: AudioPlayback) -> Self {
        Self { tts, playback }
    }
}

#[async_trait(?Send)]
impl Speaker for TtsSpeaker {
    async fn speak(&mut self, text: &str) -> Result<()> {
        tracing::debug!(text, "speaking");
        let audio = self.tts.synthesize(text).await?;
        self.playback.play_mp3(&audio).await
    }
}

/// Prints responses to stdout
#[derive(Debug, Default)]
pub struct ConsoleSpeaker;

#[async_trait(?Send)]
impl Speaker for ConsoleSpeaker {
    async fn speak(&mut self, text: &str) -> Result<()> {
        println!("[豆豆] {text}");
        Ok(())
    }
}
