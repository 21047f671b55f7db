//! HTTP request handlers
//!
//! Controller calls may block on the session lock (and on device I/O when
//! preparing or switching sinks), so they run on the blocking thread pool.

use crate::api::server::AppContext;
use crate::audio::{create_sink, CpalSink, SinkKind};
use crate::error::Error;
use crate::playback::PlaybackController;
use axum::{extract::State, http::StatusCode, Json};
use pcmp_common::events::PlaybackState;
use pcmp_common::time::{format_position, micros_to_millis, millis_to_micros};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrepareRequest {
    track: String,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    position_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct SinkRequest {
    kind: String,
    #[serde(default)]
    device: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlaybackStateResponse {
    state: PlaybackState,
    track: Option<String>,
    sink: Option<String>,
    position_micros: i64,
    duration_micros: i64,
}

#[derive(Debug, Serialize)]
pub struct PositionResponse {
    position_ms: i64,
    duration_ms: i64,
    position_micros: i64,
    duration_micros: i64,
    formatted: String,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    devices: Vec<String>,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn error_response(e: Error) -> ApiError {
    let status = match &e {
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Common(pcmp_common::Error::NotFound(_)) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }
    (
        status,
        Json(StatusResponse {
            status: "error".to_string(),
            message: Some(e.to_string()),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        message: None,
    })
}

/// Run a controller call on the blocking pool
async fn with_controller<T, F>(ctx: &AppContext, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&PlaybackController) -> crate::Result<T> + Send + 'static,
{
    let controller = Arc::clone(&ctx.controller);
    tokio::task::spawn_blocking(move || f(&controller))
        .await
        .map_err(|e| error_response(Error::Internal(format!("controller task failed: {}", e))))?
        .map_err(error_response)
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "pcmp-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Playback Control
// ============================================================================

/// POST /playback/prepare - open a track, leaving playback stopped
pub async fn prepare(
    State(ctx): State<AppContext>,
    Json(req): Json<PrepareRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    if req.track.trim().is_empty() {
        return Err(error_response(Error::BadRequest("track must not be empty".to_string())));
    }
    info!("Prepare request: {}", req.track);
    with_controller(&ctx, move |c| c.prepare(&req.track)).await?;
    Ok(ok())
}

/// POST /playback/play
pub async fn play(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    with_controller(&ctx, |c| c.play()).await?;
    Ok(ok())
}

/// POST /playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    with_controller(&ctx, |c| c.pause()).await?;
    Ok(ok())
}

/// POST /playback/seek
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    if req.position_ms < 0 {
        return Err(error_response(Error::BadRequest(format!(
            "position_ms must not be negative, got {}",
            req.position_ms
        ))));
    }
    let target = millis_to_micros(req.position_ms);
    with_controller(&ctx, move |c| c.seek(target)).await?;
    Ok(ok())
}

/// POST /playback/release
pub async fn release(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    with_controller(&ctx, |c| {
        c.release();
        Ok(())
    })
    .await?;
    Ok(ok())
}

/// GET /playback/state
pub async fn get_playback_state(
    State(ctx): State<AppContext>,
) -> Result<Json<PlaybackStateResponse>, ApiError> {
    with_controller(&ctx, |c| {
        Ok(Json(PlaybackStateResponse {
            state: c.state(),
            track: c.current_track(),
            sink: c.sink_name(),
            position_micros: c.position_micros(),
            duration_micros: c.duration_micros(),
        }))
    })
    .await
}

/// GET /playback/position - lock-free, served inline
pub async fn get_position(State(ctx): State<AppContext>) -> Json<PositionResponse> {
    let position_micros = ctx.controller.position_micros();
    let duration_micros = ctx.controller.duration_micros();
    Json(PositionResponse {
        position_ms: micros_to_millis(position_micros),
        duration_ms: micros_to_millis(duration_micros),
        position_micros,
        duration_micros,
        formatted: format_position(position_micros),
    })
}

// ============================================================================
// Output
// ============================================================================

/// POST /audio/sink - switch the output sink at runtime
pub async fn set_sink(
    State(ctx): State<AppContext>,
    Json(req): Json<SinkRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let kind: SinkKind = req.kind.parse().map_err(error_response)?;
    let mut settings = ctx.sink_settings.clone();
    if req.device.is_some() {
        settings.device = req.device;
    }
    info!("Sink switch request: {}", kind);
    with_controller(&ctx, move |c| c.switch_sink(create_sink(kind, &settings))).await?;
    Ok(ok())
}

/// GET /audio/devices - list platform output devices
pub async fn list_audio_devices() -> Result<Json<DeviceListResponse>, ApiError> {
    let devices = tokio::task::spawn_blocking(CpalSink::list_devices)
        .await
        .map_err(|e| error_response(Error::Internal(format!("device listing failed: {}", e))))?
        .map_err(error_response)?;
    info!("Found {} audio devices", devices.len());
    Ok(Json(DeviceListResponse { devices }))
}
