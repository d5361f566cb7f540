//! HTTP handlers: the publish entry points used by the REST layer and a
//! health probe.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Serialize;

use crate::ws::EventEnvelope;

use super::error::ApiResult;
use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    /// Number of subscriber queues the event was placed on.
    pub delivered: usize,
}

/// Publish an event to one room.
///
/// POST /api/rooms/{room}/events
pub async fn publish_to_room(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Json(event): Json<EventEnvelope>,
) -> ApiResult<(StatusCode, Json<PublishResponse>)> {
    let delivered = state.hub.publish(&room, &event)?;
    Ok((StatusCode::ACCEPTED, Json(PublishResponse { delivered })))
}

/// Publish an event to every connected client.
///
/// POST /api/events
pub async fn publish_to_all(
    State(state): State<AppState>,
    Json(event): Json<EventEnvelope>,
) -> ApiResult<(StatusCode, Json<PublishResponse>)> {
    let delivered = state.hub.publish_all(&event)?;
    Ok((StatusCode::ACCEPTED, Json(PublishResponse { delivered })))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: usize,
    pub rooms: usize,
    pub uptime_secs: i64,
}

/// Health probe with hub occupancy counters.
///
/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        connections: state.hub.connection_count(),
        rooms: state.hub.room_count(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}
