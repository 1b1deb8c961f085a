//! Application state shared across handlers.

use std::sync::Arc;

use pilgrim_core::{
    PilgrimConfig, ProximityTracker, PushProvider, SiteCatalog, VisitLog, VisitRecorder,
    VisitStore,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::journal::EventJournal;

/// State handle passed to every handler.
pub type SharedState = Arc<RwLock<AppState>>;

/// Everything the API operates on.
///
/// The tracker, recorder and journal synchronise internally, so handlers
/// only need a read guard.
#[derive(Debug)]
pub struct AppState {
    /// Loaded configuration.
    pub config: PilgrimConfig,

    /// Location source fed by `POST /api/fixes`.
    pub provider: Arc<PushProvider>,

    /// The geofence engine.
    pub tracker: Arc<ProximityTracker>,

    /// Visit history subscriber.
    pub recorder: VisitRecorder,

    /// Recent tracker events.
    pub journal: EventJournal,
}

impl AppState {
    /// Build state from configuration: load the visit log from the data
    /// directory and register the site catalog if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the visit log or the site catalog cannot be read.
    pub fn new(config: PilgrimConfig) -> pilgrim_core::Result<Self> {
        let store = VisitStore::new(&config.data_dir());
        let log = store.load(config.visits.max_entries)?;
        info!(
            path = %store.path().display(),
            visits = log.len(),
            "Loaded visit history"
        );

        let state = Self::assemble(config, log, Some(store));

        match &state.config.sites.catalog_path {
            Some(path) => {
                let catalog = SiteCatalog::load(path)?;
                catalog.register_all(&state.tracker, state.config.tracker.default_zone_radius_m);
            }
            None => warn!("No site catalog configured; zones must be added through the API"),
        }

        Ok(state)
    }

    /// State with an empty, unpersisted visit log and no zones.
    #[must_use]
    pub fn in_memory(config: PilgrimConfig) -> Self {
        let log = VisitLog::new(config.visits.max_entries);
        Self::assemble(config, log, None)
    }

    /// Wrap into the handle handlers receive.
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    fn assemble(config: PilgrimConfig, log: VisitLog, store: Option<VisitStore>) -> Self {
        let provider = Arc::new(PushProvider::new());
        let tracker = Arc::new(ProximityTracker::new(config.tracker, provider.clone()));

        let journal = EventJournal::default();
        journal.attach(&tracker);

        let recorder = VisitRecorder::new(log, store);
        recorder.attach(&tracker);

        Self {
            config,
            provider,
            tracker,
            recorder,
            journal,
        }
    }
}
