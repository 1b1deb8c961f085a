//! Zone management API endpoints.
//!
//! Zones are circles around a centre coordinate. A new zone starts outside
//! and is first evaluated by the next accepted fix.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use pilgrim_core::{Coordinate, Zone};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the zones router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_zones).post(create_zone))
        .route("/{id}", get(get_zone).delete(delete_zone))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// All registered zones.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ZonesResponse {
    /// Zones in registration order.
    pub zones: Vec<Zone>,

    /// Number of zones.
    #[schema(example = 12)]
    pub count: usize,
}

/// Request body for registering a zone.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "rumtek",
    "name": "Rumtek Monastery",
    "latitude": 27.2885,
    "longitude": 88.5614,
    "radius_m": 150.0,
    "payload": { "lineage": "Karma Kagyu" }
}))]
pub struct CreateZoneRequest {
    /// Zone id: letters, digits, `_`, `.`, `:` or `-`, at most 64 characters.
    #[schema(example = "rumtek", min_length = 1, max_length = 64)]
    pub id: String,

    /// Display name. Defaults to the id.
    pub name: Option<String>,

    /// Centre latitude in degrees.
    pub latitude: f64,

    /// Centre longitude in degrees.
    pub longitude: f64,

    /// Radius in metres. Defaults to the configured zone radius.
    pub radius_m: Option<f64>,

    /// Opaque data returned with the zone's events.
    #[schema(value_type = Option<Object>)]
    pub payload: Option<serde_json::Value>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List zones.
#[utoipa::path(
    get,
    path = "/api/zones",
    tag = "zones",
    operation_id = "listZones",
    summary = "List registered zones",
    description = "Returns every zone in registration order with its containment flag.",
    responses(
        (status = 200, description = "Zones", body = ZonesResponse)
    )
)]
pub async fn list_zones(State(state): State<SharedState>) -> Json<ZonesResponse> {
    let state_guard = state.read().await;
    let zones = state_guard.tracker.zones();
    Json(ZonesResponse {
        count: zones.len(),
        zones,
    })
}

/// Register a zone.
#[utoipa::path(
    post,
    path = "/api/zones",
    tag = "zones",
    operation_id = "createZone",
    summary = "Register a zone",
    description = "Adds a circular zone. Registration never emits events; the zone \
        is evaluated by the next accepted fix.",
    request_body = CreateZoneRequest,
    responses(
        (status = 201, description = "Zone registered", body = Zone),
        (status = 400, description = "Invalid id, centre or radius", body = ErrorResponse),
        (status = 409, description = "Zone id already registered", body = ErrorResponse)
    )
)]
pub async fn create_zone(
    State(state): State<SharedState>,
    Json(request): Json<CreateZoneRequest>,
) -> ApiResult<(StatusCode, Json<Zone>)> {
    let state_guard = state.write().await;
    let tracker = &state_guard.tracker;

    let radius = request
        .radius_m
        .unwrap_or(state_guard.config.tracker.default_zone_radius_m);
    let name = request.name.unwrap_or_else(|| request.id.clone());
    let payload = request
        .payload
        .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));

    tracker.add_zone(
        request.id.clone(),
        Coordinate::new(request.latitude, request.longitude),
        radius,
        name,
        payload,
    )?;

    let zone = tracker
        .zone(&request.id)
        .ok_or_else(|| ApiError::zone_not_found(&request.id))?;
    Ok((StatusCode::CREATED, Json(zone)))
}

/// Get one zone.
#[utoipa::path(
    get,
    path = "/api/zones/{id}",
    tag = "zones",
    operation_id = "getZone",
    summary = "Get a zone",
    params(("id" = String, Path, description = "Zone id")),
    responses(
        (status = 200, description = "Zone", body = Zone),
        (status = 404, description = "Unknown zone", body = ErrorResponse)
    )
)]
pub async fn get_zone(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Zone>> {
    let state_guard = state.read().await;
    state_guard
        .tracker
        .zone(&id)
        .map(Json)
        .ok_or_else(|| ApiError::zone_not_found(&id))
}

/// Remove a zone.
#[utoipa::path(
    delete,
    path = "/api/zones/{id}",
    tag = "zones",
    operation_id = "deleteZone",
    summary = "Remove a zone",
    description = "Removes the zone without emitting an exit event.",
    params(("id" = String, Path, description = "Zone id")),
    responses(
        (status = 204, description = "Zone removed"),
        (status = 404, description = "Unknown zone", body = ErrorResponse)
    )
)]
pub async fn delete_zone(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let state_guard = state.write().await;
    if state_guard.tracker.remove_zone(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::zone_not_found(&id))
    }
}
