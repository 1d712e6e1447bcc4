use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use doudou::config::TtsProviderKind;
use doudou::voice::{
    AudioFrameSource, AudioPlayback, ConsoleSpeaker, MicrophoneSource, Speaker, SpeechToText,
    TextToSpeech, TranscribedWakeDetector, Transcriber, TtsSpeaker,
};
use doudou::{Config, HandlerInfo, OllamaClient, Session, build_chain};

/// Doudou - a wake-word voice assistant
#[derive(Parser)]
#[command(name = "doudou", version, about)]
struct Cli {
    /// Configuration file (default: ~/.config/doudou/config.toml)
    #[arg(short, long, env = "DOUDOU_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Print responses instead of speaking them
    #[arg(long, env = "DOUDOU_NO_VOICE_OUTPUT", global = true)]
    no_voice_output: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for the wake phrase and answer spoken commands (default)
    Run,
    /// Answer one text input and exit
    Ask {
        /// Text to answer
        text: String,
    },
    /// Interactive text conversation
    Chat,
    /// List enabled handlers in dispatch order
    Handlers,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "你好，我是豆豆")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,doudou=info",
        1 => "info,doudou=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_voice(config, cli.no_voice_output).await,
        Command::Ask { text } => ask(config, &text).await,
        Command::Chat => chat(config, cli.config.as_deref()).await,
        Command::Handlers => list_handlers(&config),
        Command::TestMic { duration } => test_mic(&config, duration).await,
        Command::TestTts { text } => test_tts(&config, &text).await,
    }
}

/// Run the voice assistant until interrupted
#[allow(clippy::future_not_send)]
async fn run_voice(config: Config, no_voice_output: bool) -> anyhow::Result<()> {
    let chain = build_chain(&config)?;
    if config.handlers.enabled.iter().any(|h| h == "llm") {
        check_llm(&config).await?;
    }

    let transcriber: Arc<dyn Transcriber> = Arc::new(SpeechToText::from_config(&config.stt)?);
    let speaker = make_speaker(&config, no_voice_output)?;
    let mut detector = TranscribedWakeDetector::new(&config, Arc::clone(&transcriber))?;
    let mut source = MicrophoneSource::open(&config.audio)?;

    // Set up shutdown signal
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    let phrases = config.wake.phrases.join(", ");
    let mut session = Session::new(config, chain, speaker).with_transcriber(transcriber);
    tracing::info!("doudou ready - say \"{phrases}\"");

    // Voice loop stays on the main task (cpal streams aren't Send)
    session.run(&mut source, &mut detector, &mut shutdown_rx).await?;

    tracing::info!("doudou stopped");
    Ok(())
}

fn make_speaker(config: &Config, no_voice_output: bool) -> anyhow::Result<Box<dyn Speaker>> {
    if no_voice_output || config.tts.provider == TtsProviderKind::Console {
        return Ok(Box::new(ConsoleSpeaker));
    }

    let tts = TextToSpeech::from_config(&config.tts)?;
    let playback = AudioPlayback::new()?;
    Ok(Box::new(TtsSpeaker::new(tts, playback)))
}

async fn check_llm(config: &Config) -> anyhow::Result<()> {
    let client = OllamaClient::from_config(&config.llm)?;
    if client.check_service().await {
        tracing::debug!(host = %config.llm.host, "ollama reachable");
    } else {
        tracing::warn!(host = %config.llm.host, "ollama not reachable, llm answers will fail");
    }
    Ok(())
}

/// Text-only session
fn text_session(config: Config) -> anyhow::Result<Session> {
    let chain = build_chain(&config)?;
    Ok(Session::new(config, chain, Box::new(ConsoleSpeaker)))
}

/// Answer a single input
#[allow(clippy::future_not_send)]
async fn ask(config: Config, text: &str) -> anyhow::Result<()> {
    let mut session = text_session(config)?;
    let response = session.respond_to_text(text).await;
    session.say(&response).await;
    Ok(())
}

/// Read lines from stdin until EOF or `exit`
#[allow(clippy::future_not_send)]
async fn chat(config: Config, config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let mut session = text_session(config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "Type a message, /status for session status, /reload to reload handlers, exit to quit.\n"
    );

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            "exit" | "quit" => break,
            "/status" => println!("{}", serde_json::to_string_pretty(&session.status())?),
            "/reload" => {
                let reloaded = Config::load(config_path)
                    .and_then(|config| session.reload_handlers(&config));
                match reloaded {
                    Ok(()) => list_chain(&session.status().handlers),
                    Err(e) => println!("reload failed, keeping current handlers: {e}"),
                }
            }
            _ => {
                let response = session.respond_to_text(input).await;
                session.say(&response).await;
            }
        }
    }

    Ok(())
}

/// Print the handler chain
fn list_handlers(config: &Config) -> anyhow::Result<()> {
    let chain = build_chain(config)?;
    list_chain(&chain.handlers());
    Ok(())
}

fn list_chain(handlers: &[HandlerInfo]) {
    for (i, handler) in handlers.iter().enumerate() {
        println!(
            "{:2}. {:<10} priority {:>3}  {}",
            i + 1,
            handler.name,
            handler.priority,
            handler.description
        );
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut source = MicrophoneSource::open(&config.audio)?;
    println!("Sample rate: {} Hz", source.sample_rate());
    println!(
        "Speech threshold: {} (mean absolute amplitude)",
        config.vad.energy_threshold
    );
    println!("---");

    for i in 0..duration {
        let second = Instant::now();
        let mut energy = 0.0_f32;
        let mut peak = 0_u16;
        let mut frames = 0_u32;

        while second.elapsed() < Duration::from_secs(1) {
            let frame = source.read_frame().await?;
            energy += frame.mean_abs();
            peak = peak.max(frame.samples().iter().map(|s| s.unsigned_abs()).max().unwrap_or(0));
            frames += 1;
        }

        #[allow(clippy::cast_precision_loss)]
        let energy = energy / frames.max(1) as f32;

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy / 40.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);
        let marker = if energy > config.vad.energy_threshold { "speech" } else { "" };

        println!(
            "[{:2}s] energy: {:7.1} | peak: {:5} | [{}] {}",
            i + 1,
            energy,
            peak,
            meter,
            marker
        );
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If energy stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test TTS output
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = TextToSpeech::from_config(&config.tts)?;

    println!("Synthesizing speech...");
    let mp3_data = tts.synthesize(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing audio...");
    let mut playback = AudioPlayback::new()?;
    playback.play_mp3(&mp3_data).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
