//! Interaction session
//!
//! Ties the pipeline together: wake detection, recording, transcription,
//! handler dispatch and spoken output.

use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::config::Config;
use crate::context::ContextStore;
use crate::handlers::{Dispatch, HandlerChain, HandlerInfo, build_chain};
use crate::voice::{
    AudioFrame, AudioFrameSource, Speaker, Transcriber, VoiceActivityRecorder,
    WakeDetector, wav_spec,
};
use crate::Result;

type DebugWavWriter = hound::WavWriter<BufWriter<File>>;

/// Pause after a failed read in the wake loop, per consecutive failure
const READ_RETRY_STEP: Duration = Duration::from_millis(50);

/// Longest pause between failed reads
const READ_RETRY_MAX: Duration = Duration::from_secs(1);

/// Snapshot of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Whether the wake loop is running
    pub running: bool,

    /// Handlers in dispatch order
    pub handlers: Vec<HandlerInfo>,

    /// Unexpired conversation turns
    pub active_turns: usize,
}

/// One assistant instance
///
/// Owns the conversation memory, the handler chain and the output side of
/// the audio pipeline. The microphone and wake detector are lent to
/// [`Session::run`].
pub struct Session {
    config: Config,
    chain: HandlerChain,
    context: ContextStore,
    recorder: VoiceActivityRecorder,
    transcriber: Option<Arc<dyn Transcriber>>,
    speaker: Box<dyn Speaker>,
    running: bool,
}

impl Session {
    /// Create a session
    ///
    /// Without a transcriber the session only answers text; see
    /// [`Session::with_transcriber`].
    #[must_use]
    pub fn new(config: Config, chain: HandlerChain, speaker: Box<dyn Speaker>) -> Self {
        let context = ContextStore::new(&config.context);
        let recorder = VoiceActivityRecorder::new(&config.audio, &config.vad);

        Self {
            config,
            chain,
            context,
            recorder,
            transcriber: None,
            speaker,
            running: false,
        }
    }

    /// Set the transcriber used for recorded commands
    #[must_use]
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Conversation memory
    #[must_use]
    pub const fn context(&self) -> &ContextStore {
        &self.context
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            running: self.running,
            handlers: self.chain.handlers(),
            active_turns: self.context.active_turns(None).len(),
        }
    }

    /// Replace the handler chain with one built from `config`
    ///
    /// The new chain is built in full before it replaces the old one, so a
    /// failed reload leaves the current handlers in place.
    ///
    /// # Errors
    ///
    /// Returns error if the new chain cannot be built
    pub fn reload_handlers(&mut self, config: &Config) -> Result<()> {
        let chain = build_chain(config)?;
        self.chain = chain;
        self.config.handlers = config.handlers.clone();
        self.config.llm = config.llm.clone();
        tracing::info!(handlers = self.chain.len(), "handlers reloaded");
        Ok(())
    }

    /// Answer a transcript and remember the exchange
    ///
    /// Returns what should be said back: the handler's response, or the
    /// configured fallback when no handler answered.
    #[allow(clippy::future_not_send)]
    pub async fn respond_to_text(&mut self, input: &str) -> String {
        let had_history = !self.context.is_empty();
        if self.context.purge_expired() && had_history {
            tracing::info!("conversation timed out, starting fresh");
        }

        let response = match self.chain.dispatch(input, &mut self.context).await {
            Dispatch::Handled { handler, response } => {
                tracing::info!(handler = %handler, response = %response, "responding");
                response
            }
            Dispatch::Unhandled => {
                tracing::info!(input, "no handler answered, using fallback");
                self.config.messages.fallback.clone()
            }
        };

        self.context.append(input, Some(response.clone()));
        response
    }

    /// Run one wake cycle after the wake phrase was heard
    ///
    /// Never fails: errors are logged and answered with an apology.
    #[allow(clippy::future_not_send)]
    pub async fn handle_wake<S>(&mut self, source: &mut S)
    where
        S: AudioFrameSource + ?Sized,
    {
        if let Err(e) = self.wake_cycle(source).await {
            tracing::error!(error = %e, "wake cycle failed");
            let apology = self.config.messages.apology.clone();
            self.say(&apology).await;
        }
        self.recorder.reset();
    }

    #[allow(clippy::future_not_send)]
    async fn wake_cycle<S>(&mut self, source: &mut S) -> Result<()>
    where
        S: AudioFrameSource + ?Sized,
    {
        let acknowledge = self.config.messages.acknowledge.clone();
        self.say(&acknowledge).await;
        // Drop whatever the microphone picked up while we were talking
        source.discard_pending();

        let recording = self.recorder.record(source).await;

        // Deleted on drop when the cycle ends, success or failure
        let wav = if recording.has_speech() {
            std::fs::create_dir_all(&self.config.temp_dir)?;
            let wav = tempfile::Builder::new()
                .prefix("utterance_")
                .suffix(".wav")
                .tempfile_in(&self.config.temp_dir)?;
            recording.clip.write_wav(wav.path())?;
            Some(wav)
        } else {
            None
        };

        let transcript = match &wav {
            Some(wav) => self.transcribe(wav.path()).await,
            None => String::new(),
        };

        if transcript.is_empty() {
            let not_heard = self.config.messages.not_heard.clone();
            self.say(&not_heard).await;
            return Ok(());
        }

        tracing::info!(transcript = %transcript, "heard command");
        let thinking = self.config.messages.thinking.clone();
        self.say(&thinking).await;

        let response = self.respond_to_text(&transcript).await;
        self.say(&response).await;
        Ok(())
    }

    async fn transcribe(&self, wav: &std::path::Path) -> String {
        let Some(transcriber) = &self.transcriber else {
            tracing::warn!("no transcriber configured");
            return String::new();
        };

        match tokio::time::timeout(self.config.stt.timeout, transcriber.transcribe(wav)).await {
            Ok(Ok(text)) => text.trim().to_string(),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "transcription failed");
                String::new()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.stt.timeout.as_millis(),
                    "transcription timed out"
                );
                String::new()
            }
        }
    }

    /// Speak, logging failures
    #[allow(clippy::future_not_send)]
    pub async fn say(&mut self, text: &str) {
        if let Err(e) = self.speaker.speak(text).await {
            tracing::warn!(error = %e, text, "speech output failed");
        }
    }

    /// Listen for wake phrases until `shutdown` fires
    ///
    /// The signal is checked between frames.
    ///
    /// # Errors
    ///
    /// Returns error if the debug WAV cannot be created or finalized
    #[allow(clippy::future_not_send)]
    pub async fn run<S, W>(
        &mut self,
        source: &mut S,
        detector: &mut W,
        shutdown: &mut mpsc::Receiver<()>,
    ) -> Result<()>
    where
        S: AudioFrameSource + ?Sized,
        W: WakeDetector + ?Sized,
    {
        let mut debug_wav = self.open_debug_wav(source.sample_rate())?;

        self.running = true;
        tracing::info!(phrases = ?self.config.wake.phrases, "listening for wake phrase");

        let mut read_failures: u32 = 0;
        loop {
            match shutdown.try_recv() {
                Ok(()) => {
                    tracing::info!("shutdown requested");
                    break;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
            }

            let frame = match source.read_frame().await {
                Ok(frame) => {
                    read_failures = 0;
                    frame
                }
                Err(e) => {
                    read_failures = read_failures.saturating_add(1);
                    if read_failures == 1 {
                        tracing::warn!(error = %e, "audio read failed");
                    } else {
                        tracing::debug!(error = %e, failures = read_failures, "audio read failed");
                    }
                    tokio::time::sleep(
                        READ_RETRY_STEP.saturating_mul(read_failures).min(READ_RETRY_MAX),
                    )
                    .await;
                    continue;
                }
            };

            if let Some(writer) = debug_wav.as_mut() {
                if let Err(e) = write_frame(writer, &frame) {
                    tracing::warn!(error = %e, "debug wav write failed, disabling");
                    debug_wav = None;
                }
            }

            let signal = match detector.process(&frame).await {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!(error = %e, "wake detection failed");
                    continue;
                }
            };

            if signal >= 0 {
                tracing::info!(phrase_index = signal, "wake phrase detected");
                self.handle_wake(source).await;
                detector.reset();
                source.discard_pending();
            }
        }

        self.running = false;
        if let Some(writer) = debug_wav {
            writer.finalize()?;
        }
        Ok(())
    }

    fn open_debug_wav(&self, sample_rate: u32) -> Result<Option<DebugWavWriter>> {
        let Some(path) = &self.config.debug_wav_path else {
            return Ok(None);
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let writer = hound::WavWriter::create(path, wav_spec(sample_rate))?;
        tracing::info!(path = %path.display(), "mirroring audio to debug wav");
        Ok(Some(writer))
    }
}

fn write_frame(writer: &mut DebugWavWriter, frame: &AudioFrame) -> Result<()> {
    for &sample in frame.samples() {
        writer.write_sample(sample)?;
    }
    Ok(())
}
