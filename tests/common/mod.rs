//! Shared test utilities
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use doudou::voice::{AudioFrame, AudioFrameSource, Speaker, Transcriber, WakeDetector};
use doudou::{Config, Error, Result};

pub const SAMPLE_RATE: u32 = 16_000;
pub const FRAME_SIZE: usize = 1600;

/// Config with short VAD bounds: 0.1 s frames, 0.5 s silence, 1 s wait
#[must_use]
pub fn test_config(temp_dir: &Path) -> Config {
    let mut config = Config::default();
    config.audio.sample_rate = SAMPLE_RATE;
    config.audio.frame_size = FRAME_SIZE;
    config.vad.silence_limit = Duration::from_millis(500);
    config.vad.max_duration = Duration::from_secs(5);
    config.vad.max_wait = Duration::from_secs(1);
    config.temp_dir = temp_dir.to_path_buf();
    config.handlers.enabled = vec!["time".to_string(), "greeting".to_string()];
    config
}

#[must_use]
pub fn loud_frame() -> AudioFrame {
    AudioFrame::new(vec![8000; FRAME_SIZE])
}

#[must_use]
pub fn quiet_frame() -> AudioFrame {
    AudioFrame::silence(FRAME_SIZE)
}

/// A spoken command: half a second of speech, then a second of silence
#[must_use]
pub fn utterance() -> Vec<AudioFrame> {
    let mut frames = vec![loud_frame(); 5];
    frames.extend(vec![quiet_frame(); 10]);
    frames
}

/// Plays back a fixed list of frames
///
/// Once the script runs out every read fails, and the shutdown sender (if
/// any) fires so a wake loop ends.
pub struct ScriptedSource {
    frames: VecDeque<AudioFrame>,
    shutdown: Option<mpsc::Sender<()>>,
    pub reads: usize,
}

impl ScriptedSource {
    #[must_use]
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames: frames.into(),
            shutdown: None,
            reads: 0,
        }
    }

    #[must_use]
    pub fn with_shutdown(mut self, tx: mpsc::Sender<()>) -> Self {
        self.shutdown = Some(tx);
        self
    }
}

#[async_trait(?Send)]
impl AudioFrameSource for ScriptedSource {
    async fn read_frame(&mut self) -> Result<AudioFrame> {
        self.reads += 1;
        if let Some(frame) = self.frames.pop_front() {
            return Ok(frame);
        }
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.try_send(());
        }
        Err(Error::Capture("script exhausted".to_string()))
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn frame_size(&self) -> usize {
        FRAME_SIZE
    }
}

/// Records everything said
#[derive(Clone, Default)]
pub struct RecordingSpeaker {
    pub said: Rc<RefCell<Vec<String>>>,
}

impl RecordingSpeaker {
    #[must_use]
    pub fn said(&self) -> Vec<String> {
        self.said.borrow().clone()
    }
}

#[async_trait(?Send)]
impl Speaker for RecordingSpeaker {
    async fn speak(&mut self, text: &str) -> Result<()> {
        self.said.borrow_mut().push(text.to_string());
        Ok(())
    }
}

/// Returns a canned transcript and remembers the files it was given
pub struct FixedTranscriber {
    reply: Result<String>,
    pub seen: Mutex<Vec<PathBuf>>,
}

impl FixedTranscriber {
    #[must_use]
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Err(Error::Stt("backend down".to_string())),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, wav: &Path) -> Result<String> {
        assert!(wav.exists(), "transcriber handed a missing file");
        let reader = hound::WavReader::open(wav)?;
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);

        self.seen.lock().unwrap().push(wav.to_path_buf());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(e) => Err(Error::Stt(e.to_string())),
        }
    }
}

/// Fires on the given frame numbers (1-based)
pub struct ScriptedWake {
    triggers: Vec<usize>,
    seen: usize,
}

impl ScriptedWake {
    #[must_use]
    pub fn new(triggers: &[usize]) -> Self {
        Self {
            triggers: triggers.to_vec(),
            seen: 0,
        }
    }
}

#[async_trait]
impl WakeDetector for ScriptedWake {
    async fn process(&mut self, _frame: &AudioFrame) -> Result<i32> {
        self.seen += 1;
        Ok(if self.triggers.contains(&self.seen) { 0 } else { -1 })
    }
}

/// In-process stand-in for an Ollama server
///
/// Answers `/api/generate` with `status` and `body`; every request body is
/// kept in the returned log.
pub async fn spawn_ollama(status: StatusCode, body: Value) -> (String, Arc<Mutex<Vec<Value>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);

    let app = Router::new()
        .route(
            "/api/generate",
            post(move |Json(request): Json<Value>| {
                let log = Arc::clone(&log);
                let body = body.clone();
                async move {
                    log.lock().unwrap().push(request);
                    (status, Json(body))
                }
            }),
        )
        .route("/api/tags", get(|| async { Json(json!({ "models": [] })) }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), requests)
}
