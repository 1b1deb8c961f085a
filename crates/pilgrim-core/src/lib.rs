//! # pilgrim-core
//!
//! Core proximity engine for the pilgrim monastery-visit companion.
//!
//! This crate provides:
//! - Zone entry/exit detection from a stream of position fixes
//! - Great-circle (haversine) distance on a spherical earth
//! - Site catalog loading and visit history persistence
//! - Layered configuration
//!
//! ## Architecture
//!
//! - [`tracker`] - The proximity tracker: session lifecycle, zones, events
//! - [`provider`] - Location provider trait and the push-driven provider
//! - [`geo`] - Coordinates and haversine distance
//! - [`types`] - Fixes, zones, events and snapshots
//! - [`catalog`] - Monastery sites loaded from TOML
//! - [`visits`] - Visit log and the recorder subscriber
//! - [`storage`] - JSON persistence for the visit log
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod geo;
pub mod provider;
pub mod storage;
pub mod tracker;
pub mod types;
pub mod visits;

// Re-export primary types for convenience
pub use catalog::{CatalogError, CatalogResult, RegisterSummary, Site, SiteCatalog};
pub use config::{
    default_config_path, ConfigError, ConfigResult, PilgrimConfig, ServerConfig, SitesConfig,
    TrackerConfig, VisitsConfig,
};
pub use error::{PilgrimError, Result};
pub use geo::{haversine_distance, offset_north, Coordinate, EARTH_RADIUS_M};
pub use provider::{
    ErrorCallback, FixCallback, LocationProvider, ProviderError, ProviderResult, PushProvider,
    WatchHandle,
};
pub use storage::{default_data_dir, default_visits_path, VisitStore};
pub use tracker::{
    is_valid_zone_id, HandlerError, HandlerResult, ProximityTracker, SubscriptionId, TrackerError,
    TrackerResult,
};
pub use types::{
    NearbyZone, PositionErrorKind, PositionFix, RawFix, SessionState, TrackerEvent,
    TrackerSnapshot, Zone,
};
pub use visits::{VisitError, VisitLog, VisitRecord, VisitRecorder, VisitResult};
