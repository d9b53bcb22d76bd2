//! Station status and control endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use oa_core::{ResolvedSong, StreamState};
use serde::Serialize;

use super::error::AppError;
use super::events::events_handler;
use super::AppContext;
use crate::station::SinkStats;

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/now-playing", get(now_playing))
        .route("/stream", get(stream_status))
        .route("/stream/start", post(start_stream))
        .route("/stream/stop", post(stop_stream))
        .route("/events", get(events_handler))
}

#[derive(Debug, Serialize)]
pub struct StreamStatus {
    pub name: String,
    pub state: StreamState,
    pub sink: SinkStats,
    pub now_playing: Option<ResolvedSong>,
}

impl StreamStatus {
    fn of(ctx: &AppContext) -> Self {
        Self {
            name: ctx.station.name().to_string(),
            state: ctx.station.state(),
            sink: ctx.station.sink_stats(),
            now_playing: ctx.station.currently_playing(),
        }
    }
}

/// GET /api/now-playing -- the clip listeners hear, or `null`.
async fn now_playing(State(ctx): State<AppContext>) -> Json<Option<ResolvedSong>> {
    Json(ctx.station.currently_playing())
}

/// GET /api/stream
async fn stream_status(State(ctx): State<AppContext>) -> Json<StreamStatus> {
    Json(StreamStatus::of(&ctx))
}

/// POST /api/stream/start
async fn start_stream(
    State(ctx): State<AppContext>,
) -> Result<(StatusCode, Json<StreamStatus>), AppError> {
    if !ctx.station.start() {
        return Err(AppError::conflict(format!(
            "stream '{}' is {}",
            ctx.station.name(),
            ctx.station.state()
        )));
    }
    Ok((StatusCode::ACCEPTED, Json(StreamStatus::of(&ctx))))
}

/// POST /api/stream/stop
async fn stop_stream(State(ctx): State<AppContext>) -> Result<Json<StreamStatus>, AppError> {
    if ctx.station.state() == StreamState::Idle {
        return Err(AppError::conflict(format!(
            "stream '{}' is not running",
            ctx.station.name()
        )));
    }
    ctx.station.teardown().await;
    Ok(Json(StreamStatus::of(&ctx)))
}
