//! Audio Player (pcmp-ap) - Main entry point
//!
//! Prepares and plays one track, serves the HTTP control API, and releases
//! everything on Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pcmp_ap::api::{self, AppContext};
use pcmp_ap::audio::{CpalSink, SinkKind};
use pcmp_ap::config::{PlayerConfig, MEDIA_ROOT_ENV_VAR};
use pcmp_ap::media::{DecoderSettings, FileSourceProvider};
use pcmp_ap::playback::{DefaultPipelineFactory, PlaybackController};
use pcmp_common::config::resolve_media_root;
use pcmp_common::events::EventBus;
use pcmp_common::time::millis_to_micros;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pcmp-ap
#[derive(Parser, Debug)]
#[command(name = "pcmp-ap")]
#[command(about = "Decode-and-playback audio player")]
#[command(version)]
struct Args {
    /// Track to play (relative to the media root, or absolute)
    track: Option<String>,

    /// Configuration file
    #[arg(short, long, env = "PCMP_CONFIG")]
    config: Option<PathBuf>,

    /// Folder relative track names resolve against
    #[arg(short, long, env = "PCMP_MEDIA_ROOT")]
    media_root: Option<PathBuf>,

    /// Output sink
    #[arg(long, value_enum, env = "PCMP_SINK")]
    sink: Option<SinkKind>,

    /// Output device name (cpal sink)
    #[arg(long, env = "PCMP_DEVICE")]
    device: Option<String>,

    /// HTTP control API port
    #[arg(short, long, env = "PCMP_PORT")]
    port: Option<u16>,

    /// Do not serve the HTTP control API
    #[arg(long)]
    no_server: bool,

    /// Start position in milliseconds
    #[arg(long)]
    seek_ms: Option<i64>,

    /// Output-less drain iterations before a track is failed (0 disables)
    #[arg(long)]
    stall_threshold: Option<u32>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "PCMP_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("pcmp_ap={0},pcmp_common={0},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_thread_ids(true))
        .init();

    if args.list_devices {
        for device in CpalSink::list_devices().context("Failed to list audio devices")? {
            println!("{}", device);
        }
        return Ok(());
    }

    let media_root = resolve_media_root(
        args.media_root.as_deref(),
        MEDIA_ROOT_ENV_VAR,
        config.media_root.as_deref(),
    );
    info!("Starting pcmp-ap (media root {})", media_root.display());

    let events = EventBus::new(256);
    let factory = DefaultPipelineFactory::new(
        Arc::new(FileSourceProvider::new(media_root)),
        DecoderSettings::from(&config.player),
        config.sink.clone(),
    );
    let controller = Arc::new(PlaybackController::new(
        Arc::new(factory),
        config.player.clone(),
        events.clone(),
    ));

    if let Some(track) = args.track.clone() {
        let seek_ms = args.seek_ms;
        let starter = Arc::clone(&controller);
        tokio::task::spawn_blocking(move || -> pcmp_ap::Result<()> {
            starter.prepare(&track)?;
            if let Some(ms) = seek_ms {
                starter.seek(millis_to_micros(ms))?;
            }
            starter.play()
        })
        .await
        .context("Playback start task failed")?
        .context("Failed to start playback")?;
    }

    let ticker = api::spawn_progress_ticker(
        Arc::clone(&controller),
        events.clone(),
        Duration::from_millis(config.server.progress_interval_ms),
    );

    if config.server.enabled {
        let ctx = AppContext {
            controller: Arc::clone(&controller),
            events: events.clone(),
            sink_settings: config.sink.clone(),
        };
        api::run(&config.server, ctx, shutdown_signal())
            .await
            .context("HTTP server failed")?;
    } else {
        shutdown_signal().await;
    }

    ticker.abort();
    let releaser = Arc::clone(&controller);
    if let Err(e) = tokio::task::spawn_blocking(move || releaser.release()).await {
        warn!("Release task failed: {}", e);
    }
    info!("Shutdown complete");
    Ok(())
}

/// CLI flags win over file values
fn apply_overrides(config: &mut PlayerConfig, args: &Args) {
    if let Some(kind) = args.sink {
        config.sink.kind = kind;
    }
    if args.device.is_some() {
        config.sink.device = args.device.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.no_server {
        config.server.enabled = false;
    }
    if let Some(threshold) = args.stall_threshold {
        config.player.stall_threshold = threshold;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
