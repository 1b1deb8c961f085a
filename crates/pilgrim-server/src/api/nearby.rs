//! Nearby zones API endpoint.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use pilgrim_core::{NearbyZone, PositionFix};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the nearby router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_nearby))
}

/// Query parameters for the nearby endpoint.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct NearbyQuery {
    /// Search radius in metres. Defaults to the configured nearby radius.
    #[param(example = 5000.0)]
    pub radius_m: Option<f64>,
}

/// Zones around the last accepted fix.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NearbyResponse {
    /// Radius used for the search, in metres.
    #[schema(example = 5000.0)]
    pub radius_m: f64,

    /// The fix distances are measured from. Absent before the first fix.
    pub position: Option<PositionFix>,

    /// Zones within the radius, nearest first.
    pub zones: Vec<NearbyZone>,
}

/// List zones near the last accepted fix.
#[utoipa::path(
    get,
    path = "/api/nearby",
    tag = "zones",
    operation_id = "getNearby",
    summary = "List nearby zones",
    description = "Returns zones whose centre lies within `radius_m` of the last \
        accepted fix, sorted by distance. Empty until a fix has been accepted.",
    params(NearbyQuery),
    responses(
        (status = 200, description = "Nearby zones", body = NearbyResponse),
        (status = 400, description = "Invalid radius", body = ErrorResponse)
    )
)]
pub async fn get_nearby(
    State(state): State<SharedState>,
    Query(query): Query<NearbyQuery>,
) -> ApiResult<Json<NearbyResponse>> {
    let state_guard = state.read().await;
    let radius_m = query
        .radius_m
        .unwrap_or(state_guard.config.tracker.nearby_radius_m);
    if !radius_m.is_finite() || radius_m < 0.0 {
        return Err(ApiError::bad_request(
            "INVALID_RADIUS",
            "radius_m must be a non-negative number of metres",
        ));
    }

    Ok(Json(NearbyResponse {
        radius_m,
        position: state_guard.tracker.last_position(),
        zones: state_guard.tracker.nearby(radius_m),
    }))
}
