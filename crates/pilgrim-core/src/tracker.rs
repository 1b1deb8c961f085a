//! Proximity tracking against named circular zones.
//!
//! A [`ProximityTracker`] owns a watch on a [`LocationProvider`], keeps a set
//! of zones in registration order and turns each accepted fix into ordered
//! `Enter`/`Exit` events followed by one `PositionUpdated`.
//!
//! Fixes reach the tracker only through the provider callbacks; releasing
//! the watch (`stop`, `pause`) is what stops ingestion.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pilgrim_core::{Coordinate, ProximityTracker, PushProvider, RawFix, TrackerConfig};
//!
//! let provider = Arc::new(PushProvider::new());
//! let tracker = ProximityTracker::new(TrackerConfig::default(), provider.clone());
//! let rumtek = Coordinate::new(27.3389, 88.6065);
//! tracker
//!     .add_zone("rumtek", rumtek, 100.0, "Rumtek", serde_json::Value::Null)
//!     .unwrap();
//! tracker.on_event(|event| {
//!     println!("{}", event.kind());
//!     Ok(())
//! });
//! tracker.start().unwrap();
//! provider.push_fix(RawFix::new(27.3389, 88.6065, 5.0));
//! assert_eq!(tracker.inside_zones().len(), 1);
//! ```

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::config::TrackerConfig;
use crate::geo::{haversine_distance, Coordinate};
use crate::provider::{ErrorCallback, FixCallback, LocationProvider, ProviderError, WatchHandle};
use crate::types::{
    NearbyZone, PositionErrorKind, PositionFix, RawFix, SessionState, TrackerEvent,
    TrackerSnapshot, Zone,
};

static ZONE_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]{0,63}$").expect("zone id regex is valid")
});

/// Returns `true` if `id` is usable as a zone identifier.
#[must_use]
pub fn is_valid_zone_id(id: &str) -> bool {
    ZONE_ID_REGEX.is_match(id)
}

/// Errors raised by tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A zone with this id is already registered.
    #[error("Zone '{id}' is already registered")]
    DuplicateZone {
        /// The conflicting id.
        id: String,
    },

    /// The zone definition is unusable.
    #[error("Invalid zone '{id}': {reason}")]
    InvalidZone {
        /// The zone id as given.
        id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A position report could not be interpreted.
    #[error("Invalid position fix: {reason}")]
    InvalidFix {
        /// What is wrong with it.
        reason: String,
    },

    /// The location provider refused to start a watch.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Result type for tracker operations.
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// Error type subscribers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a subscriber invocation.
pub type HandlerResult = std::result::Result<(), HandlerError>;

type EventHandler = Arc<dyn Fn(&TrackerEvent) -> HandlerResult + Send + Sync>;

/// Identifies a subscription for [`ProximityTracker::off_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Default)]
struct TrackerState {
    session: SessionState,
    tracking_granted: bool,
    watch: Option<WatchHandle>,
    // Bumped whenever a watch is established or released; callbacks from an
    // older watch compare unequal and are ignored.
    generation: u64,
    last_fix: Option<PositionFix>,
    zones: HashMap<String, Zone>,
    order: Vec<String>,
}

impl TrackerState {
    fn is_current(&self, generation: u64) -> bool {
        self.session == SessionState::Active && self.generation == generation
    }

    fn ordered_zones(&self) -> impl Iterator<Item = &Zone> {
        self.order.iter().filter_map(|id| self.zones.get(id))
    }

    /// Release the session, returning the watch to unwatch.
    fn release(&mut self, next: SessionState) -> Option<WatchHandle> {
        self.session = next;
        self.generation += 1;
        self.watch.take()
    }
}

struct Shared {
    config: TrackerConfig,
    provider: Arc<dyn LocationProvider>,
    state: Mutex<TrackerState>,
    subscribers: Mutex<Vec<(SubscriptionId, EventHandler)>>,
    next_subscription: AtomicU64,
    // Held from evaluation until the last event of a fix is delivered, and by
    // every mutating call, so fixes run to completion one at a time.
    turn: Mutex<()>,
    turn_owner: Mutex<Option<ThreadId>>,
}

/// Clears the turn owner before the turn lock itself is released.
struct TurnGuard<'a> {
    owner: &'a Mutex<Option<ThreadId>>,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Shared {
    // Subscribers and the provider never run under these locks.
    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, EventHandler)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` holding the tracker's turn. Re-entrant on the owning thread,
    /// so subscribers may call back into the tracker.
    fn serialized<R>(&self, f: impl FnOnce() -> R) -> R {
        let current = thread::current().id();
        if *self.turn_owner.lock().unwrap_or_else(PoisonError::into_inner) == Some(current) {
            return f();
        }

        let _turn = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        *self.turn_owner.lock().unwrap_or_else(PoisonError::into_inner) = Some(current);
        let _owner = TurnGuard {
            owner: &self.turn_owner,
        };
        f()
    }

    fn activate(self: &Arc<Self>, allowed_from: &[SessionState]) -> TrackerResult<bool> {
        let generation = {
            let mut state = self.state();
            if !allowed_from.contains(&state.session) {
                return Ok(false);
            }
            state.generation += 1;
            state.generation
        };

        let on_fix: FixCallback = {
            let weak = Arc::downgrade(self);
            Arc::new(move |raw: RawFix| {
                if let Some(shared) = Weak::upgrade(&weak) {
                    shared.serialized(|| shared.ingest(generation, raw));
                }
            })
        };
        let on_error: ErrorCallback = {
            let weak = Arc::downgrade(self);
            Arc::new(move |kind: PositionErrorKind| {
                if let Some(shared) = Weak::upgrade(&weak) {
                    shared.serialized(|| shared.provider_error(generation, kind));
                }
            })
        };

        let handle = self.provider.watch(on_fix, on_error)?;

        let mut state = self.state();
        if state.generation != generation {
            // Another lifecycle call won the race while the provider was busy.
            drop(state);
            self.provider.unwatch(handle);
            return Ok(false);
        }
        let previous = state.session;
        state.session = SessionState::Active;
        state.watch = Some(handle);
        state.tracking_granted = true;
        drop(state);

        info!(from = %previous, watch_id = handle.id(), "Tracking active");
        Ok(true)
    }

    fn stop(&self, revoke: bool) {
        let mut state = self.state();
        let previous = state.session;
        let handle = state.release(SessionState::Stopped);
        state.last_fix = None;
        if revoke {
            state.tracking_granted = false;
        }
        for zone in state.zones.values_mut() {
            zone.inside = false;
        }
        drop(state);

        if let Some(handle) = handle {
            self.provider.unwatch(handle);
        }
        if previous != SessionState::Stopped {
            info!(from = %previous, "Tracking stopped");
        }
    }

    fn pause(&self) {
        let mut state = self.state();
        if state.session != SessionState::Active {
            return;
        }
        let handle = state.release(SessionState::Paused);
        drop(state);

        if let Some(handle) = handle {
            self.provider.unwatch(handle);
        }
        info!("Tracking paused");
    }

    fn ingest(&self, generation: u64, raw: RawFix) {
        let fix = match PositionFix::try_from(raw) {
            Ok(fix) => fix,
            Err(err) => {
                warn!(error = %err, "Dropping malformed position report");
                return;
            }
        };

        let events = {
            let mut state = self.state();
            if !state.is_current(generation) {
                trace!("Ignoring fix from released watch");
                return;
            }
            match self.evaluate(&mut state, fix) {
                Some(events) => events,
                None => return,
            }
        };

        self.dispatch(Some(generation), &events);
    }

    /// Apply an accepted fix to the zone set. `None` means the fix was rejected.
    fn evaluate(&self, state: &mut TrackerState, fix: PositionFix) -> Option<Vec<TrackerEvent>> {
        let config = &self.config;

        if fix.accuracy > config.max_acceptable_accuracy_m {
            debug!(
                accuracy = fix.accuracy,
                max = config.max_acceptable_accuracy_m,
                "Rejecting low-accuracy fix"
            );
            return None;
        }

        if let Some(previous) = state.last_fix {
            let moved =
                haversine_distance(previous.coordinate(), fix.coordinate(), config.earth_radius_m);
            if moved < config.min_movement_threshold_m {
                trace!(moved, "Rejecting fix below movement threshold");
                return None;
            }
        }

        state.last_fix = Some(fix);

        let TrackerState { order, zones, .. } = state;
        let mut events = Vec::new();
        for id in order.iter() {
            let Some(zone) = zones.get_mut(id) else {
                continue;
            };
            let distance = haversine_distance(fix.coordinate(), zone.center, config.earth_radius_m);
            let inside = distance <= zone.radius;
            if inside == zone.inside {
                continue;
            }

            zone.inside = inside;
            zone.last_transition = Some(fix.timestamp);
            let snapshot = zone.clone();
            if inside {
                info!(zone = %id, name = %zone.name, distance = distance.round(), "Entered zone");
                events.push(TrackerEvent::Enter {
                    zone_id: id.clone(),
                    zone: snapshot,
                    distance,
                });
            } else {
                info!(zone = %id, name = %zone.name, "Exited zone");
                events.push(TrackerEvent::Exit {
                    zone_id: id.clone(),
                    zone: snapshot,
                    distance,
                });
            }
        }

        events.push(TrackerEvent::PositionUpdated { fix });
        Some(events)
    }

    fn provider_error(&self, generation: u64, kind: PositionErrorKind) {
        if !self.state().is_current(generation) {
            return;
        }
        warn!(?kind, "Location provider reported an error");

        if kind == PositionErrorKind::PermissionDenied {
            self.stop(true);
        }

        self.dispatch(
            None,
            &[TrackerEvent::PositionError {
                kind,
                message: kind.message().to_string(),
            }],
        );
    }

    /// Deliver events in order. With a generation, delivery halts as soon as
    /// that watch is no longer current.
    fn dispatch(&self, generation: Option<u64>, events: &[TrackerEvent]) {
        for event in events {
            if let Some(generation) = generation {
                if !self.state().is_current(generation) {
                    debug!(event = event.kind(), "Watch released during dispatch");
                    return;
                }
            }

            let handlers: Vec<(SubscriptionId, EventHandler)> = self.subscribers().clone();
            for (id, handler) in handlers {
                match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(
                        subscription = id.0,
                        event = event.kind(),
                        error = %err,
                        "Event handler failed"
                    ),
                    Err(_) => warn!(
                        subscription = id.0,
                        event = event.kind(),
                        "Event handler panicked"
                    ),
                }
            }
        }
    }
}

/// Detects zone entry and exit from a stream of position fixes.
///
/// Create one per location source and hand it to the collaborators that
/// need it. All methods take `&self`; the tracker may be shared behind an
/// `Arc`, and subscribers may call back into it.
pub struct ProximityTracker {
    shared: Arc<Shared>,
}

impl ProximityTracker {
    /// Create a stopped tracker with no zones.
    pub fn new(config: TrackerConfig, provider: Arc<dyn LocationProvider>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                provider,
                state: Mutex::new(TrackerState::default()),
                subscribers: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(0),
                turn: Mutex::new(()),
                turn_owner: Mutex::new(None),
            }),
        }
    }

    /// Thresholds this tracker was built with.
    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.shared.config
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Establish the location watch. No-op when already active.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Provider`] if the provider refuses the watch;
    /// the session state is left unchanged and `start` may be retried.
    pub fn start(&self) -> TrackerResult<()> {
        self.shared.serialized(|| {
            self.shared
                .activate(&[SessionState::Stopped, SessionState::Paused])
        })?;
        Ok(())
    }

    /// Release the watch and reset every zone to outside without emitting
    /// exit events. The last accepted fix is discarded.
    ///
    /// Called from another thread, this waits for any fix being delivered;
    /// no event reaches a subscriber after it returns.
    pub fn stop(&self) {
        self.shared.serialized(|| self.shared.stop(false));
    }

    /// Release the watch, keeping zone flags and the last accepted fix.
    /// No-op unless active.
    pub fn pause(&self) {
        self.shared.serialized(|| self.shared.pause());
    }

    /// Re-establish the watch after [`pause`](Self::pause). No-op unless
    /// paused after a successful [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Provider`] if the provider refuses the watch.
    pub fn resume(&self) -> TrackerResult<()> {
        self.shared.serialized(|| {
            if !self.shared.state().tracking_granted {
                return Ok(());
            }
            self.shared
                .activate(&[SessionState::Paused])
                .map(|_| ())
        })
    }

    /// Stop tracking and drop every zone and subscriber.
    pub fn dispose(self) {
        self.shared.serialized(|| {
            self.shared.stop(false);
            let mut state = self.shared.state();
            state.zones.clear();
            state.order.clear();
        });
        self.shared.subscribers().clear();
        debug!("Tracker disposed");
    }

    /// Current session state.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.shared.state().session
    }

    // =========================================================================
    // ZONES
    // =========================================================================

    /// Register a zone. It starts outside and is first evaluated by the next
    /// accepted fix; registration never emits events.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::DuplicateZone`] if the id is taken, or
    /// [`TrackerError::InvalidZone`] for a malformed id, centre or radius.
    pub fn add_zone(
        &self,
        id: impl Into<String>,
        center: Coordinate,
        radius: f64,
        name: impl Into<String>,
        payload: serde_json::Value,
    ) -> TrackerResult<()> {
        let id = id.into();
        if !is_valid_zone_id(&id) {
            return Err(TrackerError::InvalidZone {
                id,
                reason: "id must be 1-64 characters of letters, digits, '_', '.', ':' or '-'"
                    .to_string(),
            });
        }
        if !center.is_valid() {
            return Err(TrackerError::InvalidZone {
                id,
                reason: "centre coordinates out of range".to_string(),
            });
        }
        if !radius.is_finite() || radius <= 0.0 {
            return Err(TrackerError::InvalidZone {
                id,
                reason: format!("radius must be positive, got {radius}"),
            });
        }

        self.shared.serialized(|| {
            let mut state = self.shared.state();
            if state.zones.contains_key(&id) {
                return Err(TrackerError::DuplicateZone { id });
            }
            let zone = Zone {
                id: id.clone(),
                center,
                radius,
                name: name.into(),
                payload,
                inside: false,
                last_transition: None,
            };
            debug!(zone = %id, radius, "Zone registered");
            state.order.push(id.clone());
            state.zones.insert(id, zone);
            Ok(())
        })
    }

    /// Remove a zone without emitting an exit event. Returns whether it
    /// existed.
    pub fn remove_zone(&self, id: &str) -> bool {
        self.shared.serialized(|| {
            let mut state = self.shared.state();
            if state.zones.remove(id).is_none() {
                return false;
            }
            state.order.retain(|z| z != id);
            debug!(zone = %id, "Zone removed");
            true
        })
    }

    /// A copy of one zone.
    #[must_use]
    pub fn zone(&self, id: &str) -> Option<Zone> {
        self.shared.state().zones.get(id).cloned()
    }

    /// All zones in registration order.
    #[must_use]
    pub fn zones(&self) -> Vec<Zone> {
        self.shared.state().ordered_zones().cloned().collect()
    }

    /// Number of registered zones.
    #[must_use]
    pub fn zone_count(&self) -> usize {
        self.shared.state().zones.len()
    }

    /// Zones currently inside, in registration order.
    #[must_use]
    pub fn inside_zones(&self) -> Vec<Zone> {
        self.shared
            .state()
            .ordered_zones()
            .filter(|z| z.inside)
            .cloned()
            .collect()
    }

    /// The earliest-registered zone currently inside.
    #[must_use]
    pub fn first_inside(&self) -> Option<Zone> {
        self.shared
            .state()
            .ordered_zones()
            .find(|z| z.inside)
            .cloned()
    }

    // =========================================================================
    // POSITION
    // =========================================================================

    /// The most recent accepted fix.
    #[must_use]
    pub fn last_position(&self) -> Option<PositionFix> {
        self.shared.state().last_fix
    }

    /// Zones within `max_distance` metres of the last accepted fix, nearest
    /// first. Empty when no fix has been accepted.
    #[must_use]
    pub fn nearby(&self, max_distance: f64) -> Vec<NearbyZone> {
        let state = self.shared.state();
        let Some(fix) = state.last_fix else {
            return Vec::new();
        };
        let radius = self.shared.config.earth_radius_m;

        let mut nearby: Vec<NearbyZone> = state
            .ordered_zones()
            .map(|zone| NearbyZone {
                distance: haversine_distance(fix.coordinate(), zone.center, radius),
                zone: zone.clone(),
            })
            .filter(|n| n.distance <= max_distance)
            .collect();
        // Stable sort keeps registration order for equal distances.
        nearby.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        nearby
    }

    /// Export the session, last fix and zone set.
    #[must_use]
    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.shared.state();
        let zones: Vec<Zone> = state.ordered_zones().cloned().collect();
        let inside = zones
            .iter()
            .filter(|z| z.inside)
            .map(|z| z.id.clone())
            .collect();
        TrackerSnapshot {
            session: state.session,
            last_position: state.last_fix,
            zones,
            inside,
        }
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Subscribe to tracker events.
    ///
    /// Handlers run synchronously in subscription order. An `Err` or a panic
    /// is logged and does not affect other handlers or tracker state.
    pub fn on_event<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TrackerEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.shared.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.shared.subscribers().push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn off_event(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.shared.subscribers();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers().len()
    }
}

impl Drop for ProximityTracker {
    fn drop(&mut self) {
        let handle = self
            .shared
            .serialized(|| self.shared.state().release(SessionState::Stopped));
        if let Some(handle) = handle {
            self.shared.provider.unwatch(handle);
        }
    }
}

impl std::fmt::Debug for ProximityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("ProximityTracker")
            .field("session", &state.session)
            .field("zones", &state.zones.len())
            .field("last_fix", &state.last_fix)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{offset_north, EARTH_RADIUS_M};
    use crate::provider::{ProviderResult, PushProvider};
    use crate::visits::{VisitLog, VisitRecorder};
    use chrono::{Duration, Utc};
    use std::sync::mpsc;
    use std::time::Duration as StdDuration;

    const Z1_CENTER: Coordinate = Coordinate::new(27.3389, 88.6065);

    struct Harness {
        tracker: Arc<ProximityTracker>,
        provider: Arc<PushProvider>,
        events: Arc<Mutex<Vec<TrackerEvent>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(TrackerConfig::default())
        }

        fn with_config(config: TrackerConfig) -> Self {
            let provider = Arc::new(PushProvider::new());
            let tracker = Arc::new(ProximityTracker::new(config, provider.clone()));
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&events);
            tracker.on_event(move |event| {
                sink.lock().unwrap().push(event.clone());
                Ok(())
            });
            Self {
                tracker,
                provider,
                events,
            }
        }

        fn add_z1(&self) {
            self.tracker
                .add_zone("z1", Z1_CENTER, 100.0, "Rumtek", serde_json::json!({"id": 1}))
                .unwrap();
        }

        /// Push a fix `distance` metres north of the z1 centre.
        fn fix_at(&self, distance: f64) {
            let c = offset_north(Z1_CENTER, distance, EARTH_RADIUS_M);
            self.provider
                .push_fix(RawFix::new(c.latitude, c.longitude, 5.0));
        }

        fn take(&self) -> Vec<TrackerEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }

        fn kinds(&self) -> Vec<String> {
            self.take()
                .iter()
                .map(|e| match e.zone_id() {
                    Some(id) => format!("{} {id}", e.kind()),
                    None => e.kind().to_string(),
                })
                .collect()
        }
    }

    #[test]
    fn test_new_tracker_is_stopped() {
        let h = Harness::new();
        assert_eq!(h.tracker.session_state(), SessionState::Stopped);
        assert!(h.tracker.last_position().is_none());
        assert_eq!(h.provider.active_watches(), 0);
    }

    #[test]
    fn test_enter_exit_enter_scenario() {
        let h = Harness::new();
        h.add_z1();
        h.tracker.start().unwrap();

        h.fix_at(50.0);
        assert_eq!(h.kinds(), vec!["enter z1", "position_updated"]);

        h.fix_at(150.0);
        assert_eq!(h.kinds(), vec!["exit z1", "position_updated"]);

        h.fix_at(50.0);
        assert_eq!(h.kinds(), vec!["enter z1", "position_updated"]);
        assert!(h.tracker.zone("z1").unwrap().inside);
    }

    #[test]
    fn test_enter_event_carries_snapshot_and_distance() {
        let h = Harness::new();
        h.add_z1();
        h.tracker.start().unwrap();
        h.fix_at(50.0);

        match &h.take()[0] {
            TrackerEvent::Enter {
                zone_id,
                zone,
                distance,
            } => {
                assert_eq!(zone_id, "z1");
                assert!(zone.inside);
                assert!(zone.last_transition.is_some());
                assert_eq!(zone.payload["id"], 1);
                assert!((distance - 50.0).abs() < 1e-6);
            }
            other => panic!("expected enter, got {other:?}"),
        }
    }

    #[test]
    fn test_fix_at_center_is_inside_and_just_beyond_radius_is_outside() {
        let h = Harness::new();
        h.add_z1();
        h.tracker.start().unwrap();

        h.provider
            .push_fix(RawFix::new(Z1_CENTER.latitude, Z1_CENTER.longitude, 1.0));
        assert!(h.tracker.zone("z1").unwrap().inside);

        h.fix_at(100.001);
        assert!(!h.tracker.zone("z1").unwrap().inside);
    }

    #[test]
    fn test_last_transition_uses_fix_timestamp() {
        let h = Harness::new();
        h.add_z1();
        h.tracker.start().unwrap();

        let ts = Utc::now() - Duration::minutes(5);
        h.provider
            .push_fix(RawFix::new(Z1_CENTER.latitude, Z1_CENTER.longitude, 1.0).at(ts));
        assert_eq!(h.tracker.zone("z1").unwrap().last_transition, Some(ts));
    }

    #[test]
    fn test_registering_zone_never_emits() {
        let h = Harness::new();
        h.tracker.start().unwrap();
        h.fix_at(0.0);
        h.take();

        // The last fix sits at the centre, yet registration stays silent.
        h.add_z1();
        assert!(h.take().is_empty());
        assert!(!h.tracker.zone("z1").unwrap().inside);

        h.fix_at(20.0);
        assert_eq!(h.kinds(), vec!["enter z1", "position_updated"]);
    }

    #[test]
    fn test_duplicate_zone_is_rejected() {
        let h = Harness::new();
        h.add_z1();
        let err = h
            .tracker
            .add_zone("z1", Z1_CENTER, 50.0, "Again", serde_json::Value::Null)
            .unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateZone { id } if id == "z1"));
        assert_eq!(h.tracker.zone("z1").unwrap().radius, 100.0);
    }

    #[test]
    fn test_invalid_zone_definitions_are_rejected() {
        let h = Harness::new();
        let null = serde_json::Value::Null;
        assert!(h.tracker.add_zone("", Z1_CENTER, 10.0, "x", null.clone()).is_err());
        assert!(h.tracker.add_zone("has space", Z1_CENTER, 10.0, "x", null.clone()).is_err());
        assert!(h.tracker.add_zone("ok", Z1_CENTER, 0.0, "x", null.clone()).is_err());
        assert!(h.tracker.add_zone("ok", Z1_CENTER, f64::NAN, "x", null.clone()).is_err());
        assert!(h
            .tracker
            .add_zone("ok", Coordinate::new(95.0, 0.0), 10.0, "x", null)
            .is_err());
        assert_eq!(h.tracker.zone_count(), 0);
    }

    #[test]
    fn test_low_accuracy_fix_is_ignored() {
        let h = Harness::new();
        h.add_z1();
        h.tracker.start().unwrap();

        h.provider
            .push_fix(RawFix::new(Z1_CENTER.latitude, Z1_CENTER.longitude, 50.1));
        assert!(h.take().is_empty());
        assert!(!h.tracker.zone("z1").unwrap().inside);
        assert!(h.tracker.last_position().is_none());
    }

    #[test]
    fn test_accuracy_equal_to_threshold_is_accepted() {
        let h = Harness::new();
        h.add_z1();
        h.tracker.start().unwrap();

        h.provider
            .push_fix(RawFix::new(Z1_CENTER.latitude, Z1_CENTER.longitude, 50.0));
        assert_eq!(h.kinds(), vec!["enter z1", "position_updated"]);
    }

    #[test]
    fn test_small_movement_is_ignored() {
        let h = Harness::new();
        h.add_z1();
        h.tracker.start().unwrap();

        h.fix_at(95.0);
        h.take();
        let before = h.tracker.snapshot();

        // 9 m further out crosses the radius but is below the 10 m threshold.
        h.fix_at(104.0);
        assert!(h.take().is_empty());
        assert_eq!(h.tracker.snapshot(), before);
    }

    #[test]
    fn test_malformed_fix_is_dropped() {
        let h = Harness::new();
        h.add_z1();
        h.tracker.start().unwrap();

        h.provider.push_fix(RawFix {
            latitude: None,
            ..RawFix::new(0.0, Z1_CENTER.longitude, 1.0)
        });
        assert!(h.take().is_empty());
        assert!(h.tracker.last_position().is_none());
        assert_eq!(h.tracker.session_state(), SessionState::Active);
    }

    #[test]
    fn test_transitions_follow_registration_order() {
        let h = Harness::new();
        let null = serde_json::Value::Null;
        for id in ["zeta", "alpha", "mu"] {
            h.tracker.add_zone(id, Z1_CENTER, 100.0, id, null.clone()).unwrap();
        }
        h.tracker.start().unwrap();
        h.fix_at(10.0);

        assert_eq!(
            h.kinds(),
            vec!["enter zeta", "enter alpha", "enter mu", "position_updated"]
        );
    }

    #[test]
    fn test_stop_resets_flags_without_exit() {
        let h = Harness::new();
        h.add_z1();
        h.tracker.start().unwrap();
        h.fix_at(10.0);
        h.take();

        h.tracker.stop();
        assert!(h.take().is_empty());
        assert_eq!(h.tracker.session_state(), SessionState::Stopped);
        assert!(!h.tracker.zone("z1").unwrap().inside);
        assert!(h.tracker.last_position().is_none());
        assert_eq!(h.provider.active_watches(), 0);

        // A restart re-detects the zone from scratch.
        h.tracker.start().unwrap();
        h.fix_at(12.0);
        assert_eq!(h.kinds(), vec!["enter z1", "position_updated"]);
    }

    #[test]
    fn test_remove_missing_zone_is_noop() {
        let h = Harness::new();
        h.add_z1();
        let before = h.tracker.snapshot();
        assert!(!h.tracker.remove_zone("nope"));
        assert_eq!(h.tracker.snapshot(), before);
        assert!(h.take().is_empty());
    }

    #[test]
    fn test_remove_inside_zone_emits_nothing() {
        let h = Harness::new();
        h.add_z1();
        h.tracker.start().unwrap();
        h.fix_at(0.0);
        h.take();

        assert!(h.tracker.remove_zone("z1"));
        assert!(h.take().is_empty());
        assert_eq!(h.tracker.zone_count(), 0);
        assert!(h.tracker.zones().is_empty());
    }

    #[test]
    fn test_pause_releases_watch_and_keeps_state() {
        let h = Harness::new();
        h.add_z1();
        h.tracker.start().unwrap();
        h.fix_at(10.0);
        h.take();

        h.tracker.pause();
        assert_eq!(h.tracker.session_state(), SessionState::Paused);
        assert_eq!(h.provider.unwatch_calls(), 1);
        assert_eq!(h.provider.active_watches(), 0);

        // Nothing reaches the tracker any more.
        assert_eq!(h.provider.push_fix(RawFix::new(0.0, 0.0, 1.0)), 0);
        assert!(h.take().is_empty());
        assert!(h.tracker.zone("z1").unwrap().inside);
        assert!(h.tracker.last_position().is_some());
    }

    #[test]
    fn test_resume_after_pause() {
        let h = Harness::new();
        h.add_z1();
        h.tracker.start().unwrap();
        h.fix_at(10.0);
        h.tracker.pause();
        h.take();

        h.tracker.resume().unwrap();
        assert_eq!(h.tracker.session_state(), SessionState::Active);
        assert_eq!(h.provider.watch_calls(), 2);

        // Flag preserved across the pause: moving out produces an exit.
        h.fix_at(200.0);
        assert_eq!(h.kinds(), vec!["exit z1", "position_updated"]);
    }

    #[test]
    fn test_resume_without_start_is_noop() {
        let h = Harness::new();
        h.tracker.resume().unwrap();
        assert_eq!(h.tracker.session_state(), SessionState::Stopped);
        assert_eq!(h.provider.watch_calls(), 0);
    }

    #[test]
    fn test_pause_when_stopped_is_noop() {
        let h = Harness::new();
        h.tracker.pause();
        assert_eq!(h.tracker.session_state(), SessionState::Stopped);
        assert_eq!(h.provider.unwatch_calls(), 0);
    }

    #[test]
    fn test_start_twice_keeps_single_watch() {
        let h = Harness::new();
        h.tracker.start().unwrap();
        h.tracker.start().unwrap();
        assert_eq!(h.provider.watch_calls(), 1);
        assert_eq!(h.provider.active_watches(), 1);
    }

    #[test]
    fn test_start_from_paused() {
        let h = Harness::new();
        h.tracker.start().unwrap();
        h.tracker.pause();
        h.tracker.start().unwrap();
        assert_eq!(h.tracker.session_state(), SessionState::Active);
        assert_eq!(h.provider.active_watches(), 1);
    }

    #[test]
    fn test_permission_denied_stops_session() {
        let h = Harness::new();
        h.add_z1();
        h.tracker.start().unwrap();
        h.fix_at(0.0);
        h.take();

        h.provider.push_error(PositionErrorKind::PermissionDenied);
        let events = h.take();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            TrackerEvent::PositionError {
                kind: PositionErrorKind::PermissionDenied,
                ..
            }
        ));
        assert_eq!(h.tracker.session_state(), SessionState::Stopped);
        assert!(!h.tracker.zone("z1").unwrap().inside);
        assert_eq!(h.provider.active_watches(), 0);

        // Permission was revoked, so resume does nothing; start may retry.
        h.tracker.resume().unwrap();
        assert_eq!(h.tracker.session_state(), SessionState::Stopped);
        h.tracker.start().unwrap();
        assert_eq!(h.tracker.session_state(), SessionState::Active);
    }

    #[test]
    fn test_transient_errors_keep_session_active() {
        let h = Harness::new();
        h.tracker.start().unwrap();

        h.provider.push_error(PositionErrorKind::Timeout);
        h.provider.push_error(PositionErrorKind::PositionUnavailable);
        assert_eq!(h.kinds(), vec!["position_error", "position_error"]);
        assert_eq!(h.tracker.session_state(), SessionState::Active);
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let h = Harness::new();
        h.add_z1();
        // Registered after the harness sink, so it runs second.
        h.tracker.on_event(|_| Err("visit log unavailable".into()));
        h.tracker.on_event(|_| panic!("broken listener"));
        let late = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&late);
        h.tracker.on_event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        h.tracker.start().unwrap();
        h.fix_at(0.0);

        assert_eq!(late.load(Ordering::SeqCst), 2);
        assert_eq!(h.kinds(), vec!["enter z1", "position_updated"]);
        assert!(h.tracker.zone("z1").unwrap().inside);

        h.fix_at(300.0);
        assert_eq!(late.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_off_event_stops_delivery() {
        let h = Harness::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = h.tracker.on_event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        h.tracker.start().unwrap();
        h.fix_at(0.0);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(h.tracker.off_event(id));
        assert!(!h.tracker.off_event(id));
        h.fix_at(500.0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(h.tracker.subscriber_count(), 1);
    }

    #[test]
    fn test_stop_from_handler_halts_remaining_events() {
        let h = Harness::new();
        let null = serde_json::Value::Null;
        h.tracker.add_zone("a", Z1_CENTER, 100.0, "A", null.clone()).unwrap();
        h.tracker.add_zone("b", Z1_CENTER, 100.0, "B", null).unwrap();

        let weak = Arc::downgrade(&h.tracker);
        h.tracker.on_event(move |event| {
            if event.zone_id() == Some("a") {
                if let Some(tracker) = weak.upgrade() {
                    tracker.stop();
                }
            }
            Ok(())
        });

        h.tracker.start().unwrap();
        h.fix_at(0.0);

        // The sink saw "enter a" before the stopping handler ran; nothing after.
        assert_eq!(h.kinds(), vec!["enter a"]);
        assert_eq!(h.tracker.session_state(), SessionState::Stopped);
    }

    /// Blocks the first `Enter` of `zone` for a while, signalling once it has
    /// started.
    fn stall_on_enter(h: &Harness, zone: &'static str) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        h.tracker.on_event(move |event| {
            if matches!(event, TrackerEvent::Enter { zone_id, .. } if zone_id == zone) {
                tx.lock().unwrap().send(()).ok();
                thread::sleep(StdDuration::from_millis(50));
            }
            Ok(())
        });
        rx
    }

    #[test]
    fn test_concurrent_fixes_are_delivered_one_at_a_time() {
        let h = Harness::new();
        let null = serde_json::Value::Null;
        let far = offset_north(Z1_CENTER, 1_000.0, EARTH_RADIUS_M);
        h.tracker.add_zone("za", Z1_CENTER, 100.0, "A", null.clone()).unwrap();
        h.tracker.add_zone("zb", far, 100.0, "B", null).unwrap();
        let recorder = VisitRecorder::new(VisitLog::new(10), None);
        recorder.attach(&h.tracker);
        let entered = stall_on_enter(&h, "za");
        h.tracker.start().unwrap();

        let provider = Arc::clone(&h.provider);
        let first = thread::spawn(move || {
            provider.push_fix(RawFix::new(Z1_CENTER.latitude, Z1_CENTER.longitude, 5.0));
        });
        entered.recv().unwrap();
        let provider = Arc::clone(&h.provider);
        let second = thread::spawn(move || {
            provider.push_fix(RawFix::new(far.latitude, far.longitude, 5.0));
        });
        first.join().unwrap();
        second.join().unwrap();

        assert_eq!(
            h.kinds(),
            vec!["enter za", "position_updated", "exit za", "enter zb", "position_updated"]
        );
        let visited: Vec<String> = recorder.history().into_iter().map(|v| v.zone_id).collect();
        assert_eq!(visited, vec!["za", "zb"]);
    }

    #[test]
    fn test_stop_waits_for_delivery_in_progress() {
        let h = Harness::new();
        h.add_z1();
        let entered = stall_on_enter(&h, "z1");
        h.tracker.start().unwrap();

        let provider = Arc::clone(&h.provider);
        let pusher = thread::spawn(move || {
            provider.push_fix(RawFix::new(Z1_CENTER.latitude, Z1_CENTER.longitude, 5.0));
        });
        entered.recv().unwrap();
        h.tracker.stop();

        assert_eq!(h.kinds(), vec!["enter z1", "position_updated"]);
        pusher.join().unwrap();
        h.fix_at(500.0);
        assert!(h.take().is_empty());
        assert_eq!(h.tracker.session_state(), SessionState::Stopped);
    }

    #[test]
    fn test_nearby_sorted_by_distance() {
        let h = Harness::new();
        let null = serde_json::Value::Null;
        let far = offset_north(Z1_CENTER, 3_000.0, EARTH_RADIUS_M);
        let near = offset_north(Z1_CENTER, 400.0, EARTH_RADIUS_M);
        let out = offset_north(Z1_CENTER, 8_000.0, EARTH_RADIUS_M);
        h.tracker.add_zone("far", far, 100.0, "Far", null.clone()).unwrap();
        h.tracker.add_zone("out", out, 100.0, "Out", null.clone()).unwrap();
        h.tracker.add_zone("near", near, 100.0, "Near", null).unwrap();

        assert!(h.tracker.nearby(5_000.0).is_empty());

        h.tracker.start().unwrap();
        h.fix_at(0.0);
        let ids: Vec<String> = h
            .tracker
            .nearby(5_000.0)
            .into_iter()
            .map(|n| n.zone.id)
            .collect();
        assert_eq!(ids, vec!["near", "far"]);
    }

    #[test]
    fn test_inside_queries_and_snapshot() {
        let h = Harness::new();
        let null = serde_json::Value::Null;
        let away = offset_north(Z1_CENTER, 1_000.0, EARTH_RADIUS_M);
        h.tracker.add_zone("away", away, 100.0, "Away", null.clone()).unwrap();
        h.add_z1();
        h.tracker.add_zone("wide", Z1_CENTER, 500.0, "Wide", null).unwrap();

        h.tracker.start().unwrap();
        h.fix_at(0.0);

        let inside: Vec<String> = h.tracker.inside_zones().into_iter().map(|z| z.id).collect();
        assert_eq!(inside, vec!["z1", "wide"]);
        assert_eq!(h.tracker.first_inside().unwrap().id, "z1");

        let snapshot = h.tracker.snapshot();
        assert_eq!(snapshot.session, SessionState::Active);
        assert_eq!(snapshot.inside, vec!["z1", "wide"]);
        assert_eq!(snapshot.zones.len(), 3);
        assert!(snapshot.last_position.is_some());
    }

    #[test]
    fn test_custom_earth_radius() {
        let config = TrackerConfig {
            earth_radius_m: 1_000.0,
            min_movement_threshold_m: 0.0,
            ..TrackerConfig::default()
        };
        let h = Harness::with_config(config);
        h.tracker
            .add_zone("z1", Z1_CENTER, 1.0, "Tiny world", serde_json::Value::Null)
            .unwrap();
        h.tracker.start().unwrap();

        // 0.01 degrees on a 1 km sphere is about 0.17 m.
        h.provider
            .push_fix(RawFix::new(Z1_CENTER.latitude + 0.01, Z1_CENTER.longitude, 1.0));
        assert!(h.tracker.zone("z1").unwrap().inside);
    }

    #[test]
    fn test_dispose_releases_everything() {
        let provider = Arc::new(PushProvider::new());
        let tracker = ProximityTracker::new(TrackerConfig::default(), provider.clone());
        tracker
            .add_zone("z1", Z1_CENTER, 100.0, "Rumtek", serde_json::Value::Null)
            .unwrap();
        tracker.start().unwrap();
        tracker.dispose();
        assert_eq!(provider.active_watches(), 0);
    }

    #[test]
    fn test_drop_releases_watch() {
        let provider = Arc::new(PushProvider::new());
        {
            let tracker = ProximityTracker::new(TrackerConfig::default(), provider.clone());
            tracker.start().unwrap();
            assert_eq!(provider.active_watches(), 1);
        }
        assert_eq!(provider.active_watches(), 0);
    }

    struct RefusingProvider;

    impl LocationProvider for RefusingProvider {
        fn watch(&self, _: FixCallback, _: ErrorCallback) -> ProviderResult<WatchHandle> {
            Err(ProviderError::Unavailable {
                message: "geolocation not supported".to_string(),
            })
        }

        fn unwatch(&self, _: WatchHandle) {}
    }

    #[test]
    fn test_provider_refusal_leaves_tracker_stopped() {
        let tracker = ProximityTracker::new(TrackerConfig::default(), Arc::new(RefusingProvider));
        let err = tracker.start().unwrap_err();
        assert!(matches!(err, TrackerError::Provider(_)));
        assert_eq!(tracker.session_state(), SessionState::Stopped);
    }

    #[test]
    fn test_zone_id_validation() {
        assert!(is_valid_zone_id("rumtek"));
        assert!(is_valid_zone_id("site:42"));
        assert!(is_valid_zone_id("Pema-yang.tse_1"));
        assert!(!is_valid_zone_id(""));
        assert!(!is_valid_zone_id("-leading"));
        assert!(!is_valid_zone_id("with space"));
        assert!(!is_valid_zone_id(&"x".repeat(65)));
    }
}
