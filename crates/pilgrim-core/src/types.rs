//! Shared types and OpenAPI schemas.
//!
//! Fixes, zones, session state and the event union published by the
//! [`ProximityTracker`](crate::tracker::ProximityTracker).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::geo::Coordinate;
use crate::tracker::TrackerError;

/// A single accepted-shape position report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PositionFix {
    /// Latitude in degrees.
    #[schema(example = 27.3389)]
    pub latitude: f64,

    /// Longitude in degrees.
    #[schema(example = 88.6065)]
    pub longitude: f64,

    /// Accuracy radius in metres.
    #[schema(example = 12.0)]
    pub accuracy: f64,

    /// When the position was captured.
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    /// The fix position as a coordinate.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// A position report as delivered by a location provider.
///
/// Providers may omit fields; [`PositionFix::try_from`] rejects such reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "latitude": 27.3389,
    "longitude": 88.6065,
    "accuracy": 12.0,
    "timestamp": "2025-03-02T06:15:00Z"
}))]
pub struct RawFix {
    /// Latitude in degrees.
    pub latitude: Option<f64>,

    /// Longitude in degrees.
    pub longitude: Option<f64>,

    /// Accuracy radius in metres.
    pub accuracy: Option<f64>,

    /// Capture time. Defaults to the time of ingestion.
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawFix {
    /// A complete report stamped with the current time.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            accuracy: Some(accuracy),
            timestamp: Some(Utc::now()),
        }
    }

    /// Same report with an explicit capture time.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl TryFrom<RawFix> for PositionFix {
    type Error = TrackerError;

    fn try_from(raw: RawFix) -> Result<Self, Self::Error> {
        let (Some(latitude), Some(longitude)) = (raw.latitude, raw.longitude) else {
            return Err(TrackerError::InvalidFix {
                reason: "missing coordinates".to_string(),
            });
        };
        let Some(accuracy) = raw.accuracy else {
            return Err(TrackerError::InvalidFix {
                reason: "missing accuracy".to_string(),
            });
        };
        if !Coordinate::new(latitude, longitude).is_valid() {
            return Err(TrackerError::InvalidFix {
                reason: format!("coordinates out of range: ({latitude}, {longitude})"),
            });
        }
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(TrackerError::InvalidFix {
                reason: format!("accuracy must be a non-negative number, got {accuracy}"),
            });
        }

        Ok(Self {
            latitude,
            longitude,
            accuracy,
            timestamp: raw.timestamp.unwrap_or_else(Utc::now),
        })
    }
}

/// A named circular region monitored for entry and exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Zone {
    /// Identifier, unique within a tracker.
    #[schema(example = "rumtek")]
    pub id: String,

    /// Centre of the zone.
    pub center: Coordinate,

    /// Radius in metres.
    #[schema(example = 100.0)]
    pub radius: f64,

    /// Display name.
    #[schema(example = "Rumtek Monastery")]
    pub name: String,

    /// Opaque data describing the entity the zone represents.
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,

    /// Whether the last accepted fix lies inside the zone.
    pub inside: bool,

    /// Fix timestamp of the last containment change.
    pub last_transition: Option<DateTime<Utc>>,
}

/// Lifecycle state of a tracking session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No watch; zone flags reset.
    #[default]
    Stopped,
    /// Watch established; fixes are processed.
    Active,
    /// Watch released; zone flags and last fix retained.
    Paused,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Active => "active",
            Self::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// Failure reported by a location provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PositionErrorKind {
    /// The user or platform refused location access.
    PermissionDenied,
    /// The provider could not determine a position.
    PositionUnavailable,
    /// The provider did not produce a position in time.
    Timeout,
}

impl PositionErrorKind {
    /// Human-readable description shown to listeners.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::PermissionDenied => "Location access denied by user.",
            Self::PositionUnavailable => "Location information unavailable.",
            Self::Timeout => "Location request timed out.",
        }
    }
}

impl fmt::Display for PositionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Event published to tracker subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// A fix was accepted. Emitted after any transitions it caused.
    PositionUpdated {
        /// The accepted fix.
        fix: PositionFix,
    },

    /// A zone's containment flipped to inside.
    Enter {
        /// Zone identifier.
        zone_id: String,
        /// Zone state after the transition.
        zone: Zone,
        /// Distance from the fix to the zone centre, in metres.
        distance: f64,
    },

    /// A zone's containment flipped to outside.
    Exit {
        /// Zone identifier.
        zone_id: String,
        /// Zone state after the transition.
        zone: Zone,
        /// Distance from the fix to the zone centre, in metres.
        distance: f64,
    },

    /// The location provider reported a failure.
    PositionError {
        /// What went wrong.
        kind: PositionErrorKind,
        /// Human-readable description.
        message: String,
    },
}

impl TrackerEvent {
    /// Short name of the variant, used in logs and the event journal.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PositionUpdated { .. } => "position_updated",
            Self::Enter { .. } => "enter",
            Self::Exit { .. } => "exit",
            Self::PositionError { .. } => "position_error",
        }
    }

    /// Zone id for `Enter`/`Exit` events.
    #[must_use]
    pub fn zone_id(&self) -> Option<&str> {
        match self {
            Self::Enter { zone_id, .. } | Self::Exit { zone_id, .. } => Some(zone_id),
            _ => None,
        }
    }
}

/// A zone together with its distance from the last accepted fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NearbyZone {
    /// The zone.
    pub zone: Zone,

    /// Distance in metres from the last accepted fix to the zone centre.
    #[schema(example = 420.5)]
    pub distance: f64,
}

/// Point-in-time export of tracker state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrackerSnapshot {
    /// Current session state.
    pub session: SessionState,

    /// Last accepted fix, if any.
    pub last_position: Option<PositionFix>,

    /// Registered zones in registration order.
    pub zones: Vec<Zone>,

    /// Ids of zones currently inside, in registration order.
    pub inside: Vec<String>,
}
