//! Great-circle geometry on a spherical earth.
//!
//! All distances are in metres. Coordinates are WGS84 degrees, but the
//! earth is treated as a sphere, so results are accurate to roughly 0.5%.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Mean earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A point on the earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinate {
    /// Latitude in degrees, positive north.
    #[schema(example = 27.3389)]
    pub latitude: f64,

    /// Longitude in degrees, positive east.
    #[schema(example = 88.6065)]
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `true` if both components are finite and within range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Haversine distance between two points on a sphere of the given radius.
///
/// The result is symmetric in its arguments and exactly zero for identical
/// points.
#[must_use]
pub fn haversine_distance(a: Coordinate, b: Coordinate, earth_radius: f64) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    earth_radius * c
}

/// Point reached by travelling `distance` metres due north (negative: south).
///
/// Handy for building fixes at a known distance from a zone centre.
#[must_use]
pub fn offset_north(origin: Coordinate, distance: f64, earth_radius: f64) -> Coordinate {
    let delta_lat = (distance / earth_radius).to_degrees();
    Coordinate::new(origin.latitude + delta_lat, origin.longitude)
}
