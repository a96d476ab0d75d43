use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voice_rtc_client::audio::{AudioBackendFactory, AudioSource};
use voice_rtc_client::{Config, ConsoleView, SessionController, WebRtcBackend};

const CONTROL_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Real-time voice conversation client
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/voice-rtc-client")]
    config: String,

    /// Server base URL
    #[arg(long)]
    server: Option<String>,

    /// Add the public STUN server to the ICE server list
    #[arg(long)]
    use_stun: bool,

    /// Replay a 16-bit PCM WAV file instead of capturing the microphone
    #[arg(long)]
    audio_file: Option<PathBuf>,

    /// Preset to select once connected
    #[arg(long)]
    preset: Option<String>,

    /// Model to select once connected
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    let mut session_config = cfg.session_config()?;
    if let Some(server) = args.server {
        session_config.server_url = server;
    }
    if args.use_stun {
        session_config.rtc.use_stun = true;
    }
    if let Some(path) = args.audio_file {
        session_config.audio_source = AudioSource::File(path);
    }

    info!("Server: {}", session_config.server_url);
    info!("Audio source: {:?}", session_config.audio_source);

    let backend = WebRtcBackend::new().context("Failed to initialise WebRTC")?;
    let view = match AudioBackendFactory::create_playback() {
        Ok(playback) => ConsoleView::with_playback(playback),
        Err(e) => {
            warn!("Remote audio will not be played: {:#}", e);
            ConsoleView::new()
        }
    };
    let mut controller = SessionController::new(session_config, Arc::new(backend), Arc::new(view));

    controller.start().await?;

    let deadline = tokio::time::Instant::now() + CONTROL_OPEN_TIMEOUT;
    while !controller.control_channel_open() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    if let Some(preset) = args.preset.or(cfg.session.preset) {
        if let Err(e) = controller.select_preset(&preset).await {
            warn!("Could not select preset {}: {}", preset, e);
        }
    }
    if let Some(model) = args.model.or(cfg.session.model) {
        if let Err(e) = controller.select_model(&model).await {
            warn!("Could not select model {}: {}", model, e);
        }
    }

    info!("Conversation running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    controller.stop();
    controller.settle().await;
    info!("Status: {}", controller.status_text());

    Ok(())
}
