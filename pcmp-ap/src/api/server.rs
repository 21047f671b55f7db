//! HTTP server setup and routing

use crate::config::{ServerSettings, SinkSettings};
use crate::error::{Error, Result};
use crate::playback::PlaybackController;
use axum::{
    routing::{get, post},
    Router,
};
use pcmp_common::events::{EventBus, PlayerEvent};
use pcmp_common::time::now;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub controller: Arc<PlaybackController>,
    pub events: EventBus,
    /// Settings used when a client switches sinks
    pub sink_settings: SinkSettings,
}

/// Build the router with all routes attached to `ctx`
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))
        // Playback control
        .route("/playback/prepare", post(super::handlers::prepare))
        .route("/playback/play", post(super::handlers::play))
        .route("/playback/pause", post(super::handlers::pause))
        .route("/playback/seek", post(super::handlers::seek))
        .route("/playback/release", post(super::handlers::release))
        .route("/playback/state", get(super::handlers::get_playback_state))
        .route("/playback/position", get(super::handlers::get_position))
        // Output
        .route("/audio/sink", post(super::handlers::set_sink))
        .route("/audio/devices", get(super::handlers::list_audio_devices))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves
pub async fn run(
    settings: &ServerSettings,
    ctx: AppContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.bind, settings.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid bind address {}: {}", settings.bind, e)))?;
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, build_router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}

/// Emit `PlaybackProgress` every `interval` while the controller is playing
pub fn spawn_progress_ticker(
    controller: Arc<PlaybackController>,
    events: EventBus,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let clock = controller.clock();
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(50)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let probe = Arc::clone(&controller);
            let playing = tokio::task::spawn_blocking(move || probe.is_playing())
                .await
                .unwrap_or(false);
            if !playing {
                continue;
            }
            debug!("Progress {}", clock);
            events.emit_lossy(PlayerEvent::PlaybackProgress {
                position_micros: clock.position_micros(),
                duration_micros: clock.duration_micros(),
                timestamp: now(),
            });
        }
    })
}
