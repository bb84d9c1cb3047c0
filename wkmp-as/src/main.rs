//! Streaming Audio (wkmp-as) - Command-line player
//!
//! Plays one file (or a generated tone) through the streaming engine,
//! logging every engine event, and services device reinit requests until
//! playback finishes or Ctrl+C is pressed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wkmp_as::audio::MemoryDecoder;
use wkmp_as::backend::{CpalBackend, DeviceBackend, SimulatedBackend};
use wkmp_as::device::enumerate_with_retry;
use wkmp_as::AudioSubsystem;
use wkmp_common::config::TomlConfig;
use wkmp_common::events::{EventBus, SoundCategory, StreamPlayState};

/// Command-line arguments for wkmp-as
#[derive(Parser, Debug)]
#[command(name = "wkmp-as")]
#[command(about = "Streaming audio engine for WKMP")]
#[command(version)]
struct Args {
    /// Audio file to play (a 440 Hz test tone when omitted)
    file: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "WKMP_AS_CONFIG")]
    config: Option<PathBuf>,

    /// Extra passes through the file (-1 = loop until interrupted)
    #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
    loop_count: i32,

    /// Stream volume (0.0 - 1.0)
    #[arg(short, long, default_value_t = 1.0)]
    volume: f32,

    /// Playback device index (-1 = system default)
    #[arg(short, long, env = "WKMP_AS_DEVICE", allow_hyphen_values = true)]
    device: Option<i32>,

    /// Use the simulated backend instead of real audio hardware
    #[arg(long)]
    simulated: bool,

    /// Print playback and capture devices, then exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing (RUST_LOG overrides the configured level)
    let level = config.logging.level.to_ascii_lowercase();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("wkmp_as={0},wkmp_common={0}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let params = Arc::new(config.audio_params());
    if let Some(index) = args.device {
        params
            .set_playback_device_index(index)
            .map_err(anyhow::Error::msg)
            .context("Invalid --device")?;
    }

    let backend: Arc<dyn DeviceBackend> = if args.simulated {
        Arc::new(
            SimulatedBackend::new(&["Simulated Output"], &["Simulated Input"])
                .with_realtime_clock(48_000),
        )
    } else {
        Arc::new(CpalBackend::new())
    };

    if args.list_devices {
        let playback = enumerate_with_retry(backend.as_ref(), true)
            .context("Failed to enumerate playback devices")?;
        let capture = enumerate_with_retry(backend.as_ref(), false)
            .context("Failed to enumerate capture devices")?;
        println!("Playback devices:");
        for (index, name) in playback.iter().enumerate() {
            println!("  [{}] {}", index, name);
        }
        println!("Capture devices:");
        for (index, name) in capture.iter().enumerate() {
            println!("  [{}] {}", index, name);
        }
        return Ok(());
    }

    info!("Starting WKMP streaming audio ({} backend)", backend.name());

    // Opening the device blocks until the output thread reports back
    let mut subsystem =
        tokio::task::block_in_place(|| AudioSubsystem::new(backend, params, EventBus::default()))
            .context("Failed to start audio subsystem")?;

    let mut events = subsystem.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(event = event.event_type(), "{:?}", event),
                Err(RecvError::Lagged(skipped)) => warn!("Event log lagged, {} events skipped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let stream = match &args.file {
        Some(path) => subsystem
            .open_stream(path, SoundCategory::Music)
            .with_context(|| format!("Failed to open {}", path.display()))?,
        None => subsystem
            .open_decoder(
                Box::new(MemoryDecoder::sine(440.0, 2.0, 2, 44_100)),
                SoundCategory::Effects,
            )
            .context("Failed to open test tone")?,
    };

    let format = stream.format()?;
    info!(
        "Stream: {} ch, {} Hz, {:.2}s, uploading {}-bit",
        format.channels,
        format.sample_rate,
        format.duration_seconds(),
        format.sample_format.bit_depth()
    );
    for (key, value) in stream.metadata()? {
        info!("  {}: {}", key, value);
    }

    if args.loop_count != 0 {
        stream.set_loop(0, format.total_samples, args.loop_count)?;
    }
    stream.set_volume(args.volume)?;

    if !stream.play()? {
        warn!("Playback could not start (no voice or no audio device)");
    }

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_millis(50));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                subsystem.service_in_place();
                if stream.state()? == StreamPlayState::Standby && !subsystem.reinit_pending() {
                    info!("Playback finished at sample {}", stream.tell()?);
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, stopping");
                stream.stop()?;
                break;
            }
        }
    }

    drop(stream);
    tokio::task::block_in_place(|| subsystem.shutdown());
    info!("Shutdown complete");
    Ok(())
}
