//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::sync::Arc;
use std::time::Duration;

use doudou::Config;
use doudou::voice::{
    AudioFrame, DetectorState, RecordOutcome, RecorderState, TranscribedWakeDetector,
    UtteranceClip, VoiceActivityRecorder, WakeDetector,
};

mod common;

use common::{FRAME_SIZE, FixedTranscriber, SAMPLE_RATE, ScriptedSource, quiet_frame, test_config};

/// Generate one frame of a sine wave
fn sine_frame(frequency: f32, amplitude: f32) -> AudioFrame {
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let samples = (0..FRAME_SIZE)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (amplitude * 32767.0 * (2.0 * std::f32::consts::PI * frequency * t).sin()) as i16
        })
        .collect();
    AudioFrame::new(samples)
}

/// Constant-level frame
fn level_frame(level: i16) -> AudioFrame {
    AudioFrame::new(vec![level; FRAME_SIZE])
}

fn recorder(config: &Config) -> VoiceActivityRecorder {
    VoiceActivityRecorder::new(&config.audio, &config.vad)
}

#[test]
fn test_quiet_stream_stays_idle() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut vad = recorder(&config);

    // Below threshold and never jumping by more than the delta
    let levels = [50, 120, 200, 280, 200, 120, 50, 0, 60];
    let mut outcome = None;
    for level in levels.iter().cycle().take(10) {
        assert_eq!(vad.state(), RecorderState::Idle);
        outcome = vad.push(level_frame(*level));
        if outcome.is_some() {
            break;
        }
    }

    assert_eq!(outcome, Some(RecordOutcome::Empty));
    let recording = vad.finish(RecordOutcome::Empty);
    assert!(recording.clip.is_empty());
    assert!(!recording.has_speech());
}

#[tokio::test]
async fn test_steady_hum_is_not_an_onset() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut vad = recorder(&config);

    // Mean level 150 sits above the delta but below the floor
    let mut source = ScriptedSource::new(vec![level_frame(150); 30]);
    let recording = vad.record(&mut source).await;

    assert_eq!(recording.outcome, RecordOutcome::Empty);
    assert!(recording.clip.is_empty());
    // Wait bound is 1 s of 0.1 s frames
    assert_eq!(source.reads, 10);

    // A second recording starts from a fresh reference too
    let recording = vad.record(&mut source).await;
    assert_eq!(recording.outcome, RecordOutcome::Empty);
}

#[test]
fn test_sudden_onset_starts_recording() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut vad = recorder(&config);

    // 250 is under the threshold, but 250 after 100 is a jump of 150
    assert!(vad.push(level_frame(100)).is_none());
    assert_eq!(vad.state(), RecorderState::Idle);
    assert!(vad.push(level_frame(250)).is_none());
    assert_eq!(vad.state(), RecorderState::Recording);
}

#[test]
fn test_complete_clip_has_every_observed_frame() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut vad = recorder(&config);

    // Leading silence is not part of the clip
    for _ in 0..3 {
        assert!(vad.push(quiet_frame()).is_none());
    }

    let mut pushed = 0;
    let mut outcome = None;
    let script = std::iter::repeat_n(sine_frame(440.0, 0.3), 4).chain(std::iter::repeat(quiet_frame()));
    for frame in script.take(50) {
        pushed += 1;
        outcome = vad.push(frame);
        if outcome.is_some() {
            break;
        }
    }

    assert_eq!(outcome, Some(RecordOutcome::Complete));
    // Four speech frames, the onset-of-silence frame, five silent frames
    assert_eq!(pushed, 10);
    let recording = vad.finish(RecordOutcome::Complete);
    assert_eq!(recording.clip.frame_count(), pushed);
    assert_eq!(vad.state(), RecorderState::Idle);
}

#[tokio::test]
async fn test_truncated_clip_is_bounded() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.vad.max_duration = Duration::from_millis(1250);
    let mut vad = recorder(&config);

    let mut source = ScriptedSource::new(vec![sine_frame(300.0, 0.5); 100]);
    let recording = vad.record(&mut source).await;

    assert_eq!(recording.outcome, RecordOutcome::Truncated);
    let frame = Duration::from_millis(100);
    assert!(recording.clip.duration() <= config.vad.max_duration + frame);
    assert!(recording.clip.duration() >= config.vad.max_duration);
    assert_eq!(source.reads, 13);
}

#[test]
fn test_clip_wav_roundtrip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("clip.wav");

    let mut vad = recorder(&test_config(dir.path()));
    vad.push(sine_frame(440.0, 0.5));
    vad.push(sine_frame(440.0, 0.5));
    let recording = vad.finish(RecordOutcome::Truncated);
    let clip: &UtteranceClip = &recording.clip;
    clip.write_wav(&path).unwrap();

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);

    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples, clip.to_samples());
    assert_eq!(samples.len(), 2 * FRAME_SIZE);
}

#[tokio::test]
async fn test_wake_detector_reports_phrase_index() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.wake.phrases = vec!["Hey Doudou".to_string(), "豆豆".to_string()];

    let transcriber = FixedTranscriber::new("豆豆，在吗");
    let mut detector = TranscribedWakeDetector::new(&config, Arc::clone(&transcriber) as _).unwrap();
    assert_eq!(detector.phrases(), &["hey doudou", "豆豆"]);

    let mut signal = -1;
    for _ in 0..5 {
        signal = detector.process(&sine_frame(440.0, 0.3)).await.unwrap();
    }
    assert_eq!(signal, -1);
    assert_eq!(detector.state(), DetectorState::Listening);

    for _ in 0..10 {
        signal = detector.process(&quiet_frame()).await.unwrap();
        if signal >= 0 {
            break;
        }
    }
    assert_eq!(signal, 1);
    assert_eq!(transcriber.calls(), 1);
    // The segment file is cleaned up after the check
    assert!(!transcriber.seen.lock().unwrap()[0].exists());
}

#[tokio::test]
async fn test_wake_detector_reset_drops_segment() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcriber = FixedTranscriber::new("豆豆");
    let mut detector = TranscribedWakeDetector::new(&config, Arc::clone(&transcriber) as _).unwrap();

    detector.process(&sine_frame(440.0, 0.3)).await.unwrap();
    assert_eq!(detector.state(), DetectorState::Listening);

    detector.reset();
    assert_eq!(detector.state(), DetectorState::Idle);
    assert_eq!(transcriber.calls(), 0);
}
