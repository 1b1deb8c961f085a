//! Site catalog loading.
//!
//! Monitored sites are listed in a TOML file:
//!
//! ```toml
//! [[sites]]
//! id = "rumtek"
//! name = "Rumtek Monastery"
//! latitude = 27.2885
//! longitude = 88.5614
//! radius_m = 150.0
//!
//! [sites.payload]
//! founded = 1966
//! lineage = "Karma Kagyu"
//! ```
//!
//! Sites without `radius_m` get the configured default zone radius.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::geo::Coordinate;
use crate::tracker::ProximityTracker;

/// Errors that can occur while loading a site catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("Failed to read site catalog {}: {source}", .path.display())]
    Read {
        /// Catalog path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The catalog is not valid TOML or has the wrong shape.
    #[error("Failed to parse site catalog: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two sites share an id.
    #[error("Site '{0}' appears more than once in the catalog")]
    DuplicateSite(String),
}

/// Result type for catalog operations.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// One monitored site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Zone identifier.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// Zone radius in metres; falls back to the configured default.
    #[serde(default)]
    pub radius_m: Option<f64>,

    /// Extra data attached to the zone.
    #[serde(default)]
    pub payload: Option<toml::Table>,
}

impl Site {
    /// Centre of the site.
    #[must_use]
    pub const fn center(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Payload as JSON, with the site name included for listeners.
    #[must_use]
    pub fn payload_json(&self) -> serde_json::Value {
        let mut value = self
            .payload
            .as_ref()
            .and_then(|table| serde_json::to_value(table).ok())
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
        if let Some(map) = value.as_object_mut() {
            map.entry("name")
                .or_insert_with(|| serde_json::Value::String(self.name.clone()));
        }
        value
    }
}

/// Outcome of registering a catalog with a tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterSummary {
    /// Sites added as zones.
    pub registered: usize,

    /// Sites skipped, with the reason.
    pub skipped: Vec<(String, String)>,
}

/// Sites loaded from a catalog file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteCatalog {
    /// Sites in file order.
    #[serde(default)]
    pub sites: Vec<Site>,
}

impl SiteCatalog {
    /// Load a catalog from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if two
    /// sites share an id.
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a catalog from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed or if two sites share
    /// an id.
    pub fn from_toml_str(content: &str) -> CatalogResult<Self> {
        let catalog: Self = toml::from_str(content)?;
        let mut seen = HashSet::new();
        for site in &catalog.sites {
            if !seen.insert(site.id.as_str()) {
                return Err(CatalogError::DuplicateSite(site.id.clone()));
            }
        }
        Ok(catalog)
    }

    /// Number of sites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Whether the catalog lists no sites.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Register every site as a zone.
    ///
    /// Sites the tracker rejects (bad coordinates, an id already present)
    /// are skipped and reported rather than aborting the load.
    pub fn register_all(&self, tracker: &ProximityTracker, default_radius: f64) -> RegisterSummary {
        let mut summary = RegisterSummary::default();
        for site in &self.sites {
            let result = tracker.add_zone(
                site.id.clone(),
                site.center(),
                site.radius_m.unwrap_or(default_radius),
                site.name.clone(),
                site.payload_json(),
            );
            match result {
                Ok(()) => summary.registered += 1,
                Err(err) => {
                    warn!(site = %site.id, error = %err, "Skipping catalog site");
                    summary.skipped.push((site.id.clone(), err.to_string()));
                }
            }
        }
        info!(
            registered = summary.registered,
            skipped = summary.skipped.len(),
            "Loaded site geofences"
        );
        summary
    }
}
