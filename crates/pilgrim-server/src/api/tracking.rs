//! Tracking session API endpoints.
//!
//! The session moves between `stopped`, `active` and `paused`. Position
//! fixes are only evaluated while active.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use pilgrim_core::{PositionFix, ProximityTracker, SessionState};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the tracking router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_tracking))
        .route("/start", post(start_tracking))
        .route("/stop", post(stop_tracking))
        .route("/pause", post(pause_tracking))
        .route("/resume", post(resume_tracking))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Current tracking status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "session": "active",
    "last_position": {
        "latitude": 27.3389,
        "longitude": 88.6065,
        "accuracy": 12.0,
        "timestamp": "2025-03-02T06:15:00Z"
    },
    "inside": ["rumtek"],
    "zone_count": 12
}))]
pub struct TrackingResponse {
    /// Session state.
    pub session: SessionState,

    /// Last accepted fix, if any.
    pub last_position: Option<PositionFix>,

    /// Ids of zones the last fix lies inside, in registration order.
    pub inside: Vec<String>,

    /// Number of registered zones.
    #[schema(example = 12)]
    pub zone_count: usize,
}

impl TrackingResponse {
    fn from_tracker(tracker: &ProximityTracker) -> Self {
        let snapshot = tracker.snapshot();
        Self {
            session: snapshot.session,
            last_position: snapshot.last_position,
            zone_count: snapshot.zones.len(),
            inside: snapshot.inside,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Get tracking status.
#[utoipa::path(
    get,
    path = "/api/tracking",
    tag = "tracking",
    operation_id = "getTracking",
    summary = "Get tracking status",
    description = "Returns the session state, the last accepted fix and the zones \
        currently occupied.",
    responses(
        (status = 200, description = "Tracking status", body = TrackingResponse)
    )
)]
pub async fn get_tracking(State(state): State<SharedState>) -> Json<TrackingResponse> {
    let state_guard = state.read().await;
    Json(TrackingResponse::from_tracker(&state_guard.tracker))
}

/// Start tracking.
#[utoipa::path(
    post,
    path = "/api/tracking/start",
    tag = "tracking",
    operation_id = "startTracking",
    summary = "Start tracking",
    description = "Establishes the location watch. Starting an active session is a no-op.",
    responses(
        (status = 200, description = "Tracking started", body = TrackingResponse),
        (status = 503, description = "Location provider unavailable", body = ErrorResponse)
    )
)]
pub async fn start_tracking(State(state): State<SharedState>) -> ApiResult<Json<TrackingResponse>> {
    let state_guard = state.write().await;
    state_guard.tracker.start()?;
    Ok(Json(TrackingResponse::from_tracker(&state_guard.tracker)))
}

/// Stop tracking.
#[utoipa::path(
    post,
    path = "/api/tracking/stop",
    tag = "tracking",
    operation_id = "stopTracking",
    summary = "Stop tracking",
    description = "Releases the location watch and resets every zone to outside \
        without emitting exit events.",
    responses(
        (status = 200, description = "Tracking stopped", body = TrackingResponse)
    )
)]
pub async fn stop_tracking(State(state): State<SharedState>) -> Json<TrackingResponse> {
    let state_guard = state.write().await;
    state_guard.tracker.stop();
    Json(TrackingResponse::from_tracker(&state_guard.tracker))
}

/// Pause tracking.
#[utoipa::path(
    post,
    path = "/api/tracking/pause",
    tag = "tracking",
    operation_id = "pauseTracking",
    summary = "Pause tracking",
    description = "Releases the location watch but keeps zone state, so resuming \
        does not repeat entry events.",
    responses(
        (status = 200, description = "Tracking paused", body = TrackingResponse)
    )
)]
pub async fn pause_tracking(State(state): State<SharedState>) -> Json<TrackingResponse> {
    let state_guard = state.write().await;
    state_guard.tracker.pause();
    Json(TrackingResponse::from_tracker(&state_guard.tracker))
}

/// Resume tracking.
#[utoipa::path(
    post,
    path = "/api/tracking/resume",
    tag = "tracking",
    operation_id = "resumeTracking",
    summary = "Resume tracking",
    description = "Re-establishes the location watch after a pause. A no-op unless paused.",
    responses(
        (status = 200, description = "Tracking resumed", body = TrackingResponse),
        (status = 503, description = "Location provider unavailable", body = ErrorResponse)
    )
)]
pub async fn resume_tracking(
    State(state): State<SharedState>,
) -> ApiResult<Json<TrackingResponse>> {
    let state_guard = state.write().await;
    state_guard.tracker.resume()?;
    Ok(Json(TrackingResponse::from_tracker(&state_guard.tracker)))
}
