use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use murmur::api::{ApiServer, ApiState};
use murmur::retrieval::{SimilarityIndex, ingest_files};
use murmur::services::{LlamaCompletion, Synthesizer};
use murmur::voice::{
    AudioCapture, AudioPlayback, DevicePlayer, DeviceRecorder, OpenAiSpeech, SAMPLE_RATE,
    calculate_rms, decode_mp3, transcriber_from_config,
};
use murmur::{Config, MetricsLog, Pipeline, PipelineSettings, VoiceLoop};

/// Murmur - retrieval-augmented voice assistant
#[derive(Parser)]
#[command(name = "murmur", version, about)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, env = "MURMUR_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Record, answer and speak in a loop on this machine
    Listen {
        /// Stop after this many interactions
        #[arg(short, long)]
        turns: Option<usize>,
    },
    /// Serve browser clients over HTTP and WebSocket
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Add documents to the retrieval index
    Ingest {
        /// Text files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Move ingested files here afterwards
        #[arg(long)]
        move_to: Option<PathBuf>,
    },
    /// Show the chunks retrieved for a query
    Query {
        /// Query text
        text: String,
        /// Number of chunks
        #[arg(short)]
        k: Option<usize>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,murmur=info",
        1 => "info,murmur=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
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
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Listen { turns: None }) {
        Command::Listen { turns } => listen(&config, turns).await,
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(&config).await
        }
        Command::Ingest { files, move_to } => ingest(&config, &files, move_to.as_deref()),
        Command::Query { text, k } => query(&config, &text, k),
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text } => test_tts(&config, &text).await,
    }
}

/// Build the shared pipeline from configuration
fn build_pipeline(config: &Config) -> anyhow::Result<Arc<Pipeline>> {
    config.ensure_dirs()?;

    let index = Arc::new(SimilarityIndex::from_config(&config.retrieval)?);
    let metrics = Arc::new(Mutex::new(MetricsLog::from_config(&config.metrics)?));
    let transcriber = transcriber_from_config(&config.asr)?;
    let completer = Arc::new(LlamaCompletion::from_config(&config.completion)?);

    tracing::info!(
        chunks = index.len()?,
        asr = ?config.asr.provider,
        completion = %config.completion.url,
        policy = ?config.pipeline.failure_policy,
        "pipeline ready"
    );

    Ok(Arc::new(Pipeline::new(
        transcriber,
        completer,
        index,
        metrics,
        PipelineSettings::from_config(config),
    )))
}

async fn listen(config: &Config, turns: Option<usize>) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;
    let synthesizer = Arc::new(OpenAiSpeech::from_config(&config.tts)?);

    let voice_loop = VoiceLoop::new(
        pipeline,
        Arc::new(DeviceRecorder),
        synthesizer,
        Arc::new(DevicePlayer),
        &config.audio.work_dir,
        Duration::from_secs(config.audio.record_secs),
    );

    println!("Listening. Press Ctrl+C to stop.");
    let completed = voice_loop.run(turns).await?;
    tracing::info!(completed, "voice loop finished");
    Ok(())
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;
    let state = ApiState::new(pipeline, &config.audio.work_dir);
    ApiServer::new(state, &config.server).run().await?;
    Ok(())
}

fn ingest(config: &Config, files: &[PathBuf], move_to: Option<&Path>) -> anyhow::Result<()> {
    config.ensure_dirs()?;
    let index = SimilarityIndex::from_config(&config.retrieval)?;
    let processed = move_to.or(config.retrieval.processed_dir.as_deref());

    let report = ingest_files(&index, files, processed)?;

    println!(
        "Ingested {} file(s), {} chunk(s); index now holds {} chunk(s)",
        report.files,
        report.chunks,
        index.len()?
    );
    for path in &report.moved {
        println!("  moved to {}", path.display());
    }
    Ok(())
}

fn query(config: &Config, text: &str, k: Option<usize>) -> anyhow::Result<()> {
    let index = SimilarityIndex::from_config(&config.retrieval)?;
    let results = index.query_scored(text, k.unwrap_or(config.retrieval.top_k))?;

    if results.is_empty() {
        println!("No matching chunks.");
        return Ok(());
    }

    for (rank, hit) in results.iter().enumerate() {
        let preview: String = hit.text.chars().take(100).collect();
        println!("[{}] score {:.4} (chunk {}): {preview}", rank + 1, hit.score, hit.position);
    }
    Ok(())
}

#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}

async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    let num_samples = sample_rate as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());

    tokio::task::spawn_blocking(move || {
        AudioPlayback::new(sample_rate)?.play_blocking(samples)
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl list sinks short");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}

async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = OpenAiSpeech::from_config(&config.tts)?;

    println!("Synthesizing speech...");
    let audio = tts.synthesize(text).await?;
    println!("Got {} bytes of audio data", audio.bytes.len());

    let pcm = decode_mp3(&audio.bytes)?;
    println!("Playing {:.1}s of audio...", pcm.duration().as_secs_f64());

    tokio::task::spawn_blocking(move || {
        AudioPlayback::new(pcm.sample_rate)?.play_blocking(pcm.samples)
    })
    .await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
