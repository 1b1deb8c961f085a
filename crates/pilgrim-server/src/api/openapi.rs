//! OpenAPI specification for the pilgrim API.

use axum::Json;
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::events::EventsResponse;
use super::fixes::{PositionErrorRequest, PushResponse};
use super::health::HealthResponse;
use super::nearby::NearbyResponse;
use super::tracking::TrackingResponse;
use super::visits::VisitsResponse;
use super::zones::{CreateZoneRequest, ZonesResponse};
use crate::journal::JournalEntry;

/// Serve the OpenAPI specification as JSON at `/api/openapi.json`.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// The OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// OpenAPI document for pilgrim.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "pilgrim API",
        version = "0.1.0",
        description = r#"
# pilgrim API

pilgrim tells a visitor when they arrive at, or leave, a monastery site.

## Overview

1. **Tracking**: start, pause, resume and stop the location session
2. **Zones**: circular geofences around each site, loaded from the site catalog or added here
3. **Fixes**: position reports pushed by the client device; each accepted fix
   is checked against every zone
4. **Events**: the recent enter, exit, position and error events
5. **Visits**: a capped history of zone entries

Fixes whose accuracy radius exceeds the configured limit are dropped, as are
fixes closer than the movement threshold to the last accepted one.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local pilgrim server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "tracking", description = "Tracking session lifecycle"),
        (name = "zones", description = "Geofence registration and proximity queries"),
        (name = "fixes", description = "Position input from the client device"),
        (name = "events", description = "Recent tracker events"),
        (name = "visits", description = "Recorded site visits")
    ),
    paths(
        super::health::health_check,
        super::tracking::get_tracking,
        super::tracking::start_tracking,
        super::tracking::stop_tracking,
        super::tracking::pause_tracking,
        super::tracking::resume_tracking,
        super::zones::list_zones,
        super::zones::create_zone,
        super::zones::get_zone,
        super::zones::delete_zone,
        super::nearby::get_nearby,
        super::fixes::push_fix,
        super::fixes::push_error,
        super::events::get_events,
        super::visits::get_visits,
        super::visits::clear_visits,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            TrackingResponse,
            ZonesResponse,
            CreateZoneRequest,
            NearbyResponse,
            PushResponse,
            PositionErrorRequest,
            EventsResponse,
            JournalEntry,
            VisitsResponse,
            pilgrim_core::Coordinate,
            pilgrim_core::Zone,
            pilgrim_core::RawFix,
            pilgrim_core::PositionFix,
            pilgrim_core::SessionState,
            pilgrim_core::PositionErrorKind,
            pilgrim_core::TrackerEvent,
            pilgrim_core::NearbyZone,
            pilgrim_core::VisitRecord,
        )
    )
)]
pub struct ApiDoc;
