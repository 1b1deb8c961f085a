//! Position input API endpoints.
//!
//! The server's location provider is push-driven: clients post fixes and
//! provider errors here, and they are delivered to the tracker's watch.
//! Input arriving while tracking is not active is dropped.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use pilgrim_core::{PositionErrorKind, PositionFix, RawFix, SessionState};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Creates the fixes router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(push_fix))
        .route("/error", post(push_error))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Outcome of pushing input to the tracker.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "delivered": true,
    "session": "active",
    "last_position": null,
    "inside": []
}))]
pub struct PushResponse {
    /// Whether a watch was open to receive the input.
    pub delivered: bool,

    /// Session state after processing.
    pub session: SessionState,

    /// Last accepted fix after processing.
    pub last_position: Option<PositionFix>,

    /// Ids of zones the last fix lies inside.
    pub inside: Vec<String>,
}

/// Request body for reporting a provider failure.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "kind": "timeout" }))]
pub struct PositionErrorRequest {
    /// Failure kind.
    pub kind: PositionErrorKind,
}

// ============================================================================
// Handlers
// ============================================================================

/// Push a position fix.
#[utoipa::path(
    post,
    path = "/api/fixes",
    tag = "fixes",
    operation_id = "pushFix",
    summary = "Push a position fix",
    description = "Delivers a fix to the tracker. Malformed fixes are logged and \
        ignored, fixes worse than the accuracy limit are dropped, and fixes \
        within the movement threshold of the last accepted one are skipped. \
        `last_position` shows whether the fix was accepted.",
    request_body = RawFix,
    responses(
        (status = 200, description = "Fix processed", body = PushResponse)
    )
)]
pub async fn push_fix(
    State(state): State<SharedState>,
    Json(fix): Json<RawFix>,
) -> Json<PushResponse> {
    let state_guard = state.write().await;
    let delivered = state_guard.provider.push_fix(fix) > 0;
    let snapshot = state_guard.tracker.snapshot();
    Json(PushResponse {
        delivered,
        session: snapshot.session,
        last_position: snapshot.last_position,
        inside: snapshot.inside,
    })
}

/// Report a provider failure.
#[utoipa::path(
    post,
    path = "/api/fixes/error",
    tag = "fixes",
    operation_id = "pushPositionError",
    summary = "Report a location failure",
    description = "Delivers a provider error to the tracker. `permission_denied` \
        stops tracking and revokes the session; other kinds leave it running.",
    request_body = PositionErrorRequest,
    responses(
        (status = 200, description = "Error processed", body = PushResponse)
    )
)]
pub async fn push_error(
    State(state): State<SharedState>,
    Json(request): Json<PositionErrorRequest>,
) -> Json<PushResponse> {
    let state_guard = state.write().await;
    let delivered = state_guard.provider.push_error(request.kind) > 0;
    let snapshot = state_guard.tracker.snapshot();
    Json(PushResponse {
        delivered,
        session: snapshot.session,
        last_position: snapshot.last_position,
        inside: snapshot.inside,
    })
}
