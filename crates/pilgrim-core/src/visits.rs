//! Visit history.
//!
//! A visit is recorded each time a zone is entered. The log keeps the most
//! recent records (100 by default) and is persisted through a
//! [`VisitStore`]. [`VisitRecorder`] is the tracker subscriber that feeds it.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::storage::VisitStore;
use crate::tracker::{ProximityTracker, SubscriptionId};
use crate::types::TrackerEvent;

/// Errors that can occur when persisting visit history.
#[derive(Debug, Error)]
pub enum VisitError {
    /// Failed to read the visit log.
    #[error("Failed to read visit log {}: {source}", .path.display())]
    Read {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the visit log.
    #[error("Failed to write visit log {}: {source}", .path.display())]
    Write {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The visit log is not valid JSON.
    #[error("Failed to parse visit log {}: {source}", .path.display())]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The visit log could not be serialized.
    #[error("Failed to serialize visit log: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The data directory could not be created.
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        /// Directory being created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for visit history operations.
pub type VisitResult<T> = std::result::Result<T, VisitError>;

/// One recorded zone entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "01950a6e-4a3c-7d2e-9f1a-6b0c2d3e4f50",
    "zone_id": "rumtek",
    "zone_name": "Rumtek Monastery",
    "visited_at": "2025-03-02T06:15:00Z",
    "latitude": 27.3389,
    "longitude": 88.6065
}))]
pub struct VisitRecord {
    /// Unique, time-ordered record id.
    pub id: Uuid,

    /// Zone that was entered.
    pub zone_id: String,

    /// Zone display name at the time of the visit.
    pub zone_name: String,

    /// Timestamp of the fix that caused the entry.
    pub visited_at: DateTime<Utc>,

    /// Visitor latitude at entry.
    pub latitude: f64,

    /// Visitor longitude at entry.
    pub longitude: f64,
}

impl VisitRecord {
    /// Create a record with a fresh id.
    #[must_use]
    pub fn new(
        zone_id: impl Into<String>,
        zone_name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        visited_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            zone_id: zone_id.into(),
            zone_name: zone_name.into(),
            visited_at,
            latitude,
            longitude,
        }
    }
}

/// Bounded visit history, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitLog {
    records: Vec<VisitRecord>,
    max_entries: usize,
}

impl VisitLog {
    /// An empty log holding at most `max_entries` records (minimum 1).
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            records: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// A log seeded with existing records, trimmed to the cap.
    #[must_use]
    pub fn from_records(records: Vec<VisitRecord>, max_entries: usize) -> Self {
        let mut log = Self {
            records,
            max_entries: max_entries.max(1),
        };
        log.trim();
        log
    }

    /// Append a record, dropping the oldest ones beyond the cap.
    pub fn push(&mut self, record: VisitRecord) {
        self.records.push(record);
        self.trim();
    }

    /// Records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[VisitRecord] {
        &self.records
    }

    /// Records for one zone, oldest first.
    pub fn for_zone<'a>(&'a self, zone_id: &'a str) -> impl Iterator<Item = &'a VisitRecord> {
        self.records.iter().filter(move |r| r.zone_id == zone_id)
    }

    /// Most recent record.
    #[must_use]
    pub fn latest(&self) -> Option<&VisitRecord> {
        self.records.last()
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Capacity of the log.
    #[must_use]
    pub const fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Remove every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn trim(&mut self) {
        if self.records.len() > self.max_entries {
            let excess = self.records.len() - self.max_entries;
            self.records.drain(..excess);
        }
    }
}

#[derive(Debug)]
struct PendingEntry {
    zone_id: String,
    zone_name: String,
    entered_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct RecorderState {
    log: VisitLog,
    store: Option<VisitStore>,
    pending: Vec<PendingEntry>,
}

/// Tracker subscriber that records zone entries.
///
/// `Enter` events are held until the `PositionUpdated` of the same fix
/// arrives, which supplies the visitor's coordinates. The log is saved
/// after every recorded visit when a store is configured.
#[derive(Debug, Clone)]
pub struct VisitRecorder {
    inner: Arc<Mutex<RecorderState>>,
}

impl VisitRecorder {
    /// Recorder appending to `log`, persisting to `store` if given.
    #[must_use]
    pub fn new(log: VisitLog, store: Option<VisitStore>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RecorderState {
                log,
                store,
                pending: Vec::new(),
            })),
        }
    }

    /// Subscribe this recorder to a tracker.
    pub fn attach(&self, tracker: &ProximityTracker) -> SubscriptionId {
        let recorder = self.clone();
        tracker.on_event(move |event| recorder.handle(event).map_err(Into::into))
    }

    /// Process one tracker event.
    ///
    /// # Errors
    ///
    /// Returns an error if the log could not be saved; the record is kept
    /// in memory regardless.
    pub fn handle(&self, event: &TrackerEvent) -> VisitResult<()> {
        let mut state = self.state();
        match event {
            TrackerEvent::Enter { zone_id, zone, .. } => {
                state.pending.push(PendingEntry {
                    zone_id: zone_id.clone(),
                    zone_name: zone.name.clone(),
                    entered_at: zone.last_transition,
                });
                Ok(())
            }
            TrackerEvent::PositionUpdated { fix } => {
                let pending = std::mem::take(&mut state.pending);
                let mut recorded = 0usize;
                for entry in pending {
                    // Entries from an earlier, interrupted dispatch are stale.
                    if entry.entered_at != Some(fix.timestamp) {
                        debug!(zone = %entry.zone_id, "Discarding stale pending visit");
                        continue;
                    }
                    info!(zone = %entry.zone_id, "Recording visit");
                    state.log.push(VisitRecord::new(
                        entry.zone_id,
                        entry.zone_name,
                        fix.latitude,
                        fix.longitude,
                        fix.timestamp,
                    ));
                    recorded += 1;
                }
                if recorded == 0 {
                    return Ok(());
                }
                match &state.store {
                    Some(store) => store.save(&state.log),
                    None => Ok(()),
                }
            }
            TrackerEvent::Exit { .. } | TrackerEvent::PositionError { .. } => Ok(()),
        }
    }

    /// Copy of the visit history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<VisitRecord> {
        self.state().log.records().to_vec()
    }

    /// Number of recorded visits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().log.len()
    }

    /// Whether no visit has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().log.is_empty()
    }

    /// Erase the history, in memory and on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the emptied log could not be saved.
    pub fn clear(&self) -> VisitResult<()> {
        let mut state = self.state();
        state.log.clear();
        state.pending.clear();
        match &state.store {
            Some(store) => store.save(&state.log),
            None => Ok(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, RecorderState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
