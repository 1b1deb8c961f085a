//! Location provider abstraction.
//!
//! A provider delivers position reports and failures through callbacks at
//! its own cadence once a watch is established, and stops delivering as
//! soon as the watch is released.
//!
//! [`PushProvider`] is the in-process implementation: the host pushes
//! reports into it (from an HTTP handler, a serial reader, a test) and it
//! forwards them to every live watch.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, trace};

use crate::types::{PositionErrorKind, RawFix};

/// Callback invoked with each position report.
pub type FixCallback = Arc<dyn Fn(RawFix) + Send + Sync>;

/// Callback invoked with each provider failure.
pub type ErrorCallback = Arc<dyn Fn(PositionErrorKind) + Send + Sync>;

/// Opaque handle identifying an established watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchHandle(u64);

impl WatchHandle {
    /// Wrap a provider-specific watch id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The provider-specific watch id.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Errors raised when establishing a watch.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// This provider cannot produce positions at all.
    #[error("Location provider unavailable: {message}")]
    Unavailable {
        /// Why the provider is unavailable.
        message: String,
    },
}

/// Result type for provider operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Source of position reports.
pub trait LocationProvider: Send + Sync {
    /// Begin delivering reports and failures to the given callbacks.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the watch cannot be established.
    fn watch(&self, on_fix: FixCallback, on_error: ErrorCallback) -> ProviderResult<WatchHandle>;

    /// Stop delivery for a watch. Unknown or already released handles are
    /// ignored.
    fn unwatch(&self, handle: WatchHandle);
}

impl<P: LocationProvider + ?Sized> LocationProvider for Arc<P> {
    fn watch(&self, on_fix: FixCallback, on_error: ErrorCallback) -> ProviderResult<WatchHandle> {
        (**self).watch(on_fix, on_error)
    }

    fn unwatch(&self, handle: WatchHandle) {
        (**self).unwatch(handle);
    }
}

struct Watcher {
    on_fix: FixCallback,
    on_error: ErrorCallback,
}

/// Provider whose reports are pushed in by the host.
#[derive(Default)]
pub struct PushProvider {
    watchers: Mutex<BTreeMap<u64, Watcher>>,
    next_id: AtomicU64,
    watch_calls: AtomicU64,
    unwatch_calls: AtomicU64,
}

impl PushProvider {
    /// Create a provider with no watches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a report to every live watch. Returns how many received it.
    pub fn push_fix(&self, fix: RawFix) -> usize {
        let targets: Vec<FixCallback> = self
            .lock()
            .values()
            .map(|w| Arc::clone(&w.on_fix))
            .collect();
        trace!(watches = targets.len(), "Pushing position report");
        for callback in &targets {
            callback(fix);
        }
        targets.len()
    }

    /// Deliver a failure to every live watch. Returns how many received it.
    pub fn push_error(&self, kind: PositionErrorKind) -> usize {
        let targets: Vec<ErrorCallback> = self
            .lock()
            .values()
            .map(|w| Arc::clone(&w.on_error))
            .collect();
        debug!(?kind, watches = targets.len(), "Pushing provider error");
        for callback in &targets {
            callback(kind);
        }
        targets.len()
    }

    /// Number of live watches.
    #[must_use]
    pub fn active_watches(&self) -> usize {
        self.lock().len()
    }

    /// Total number of `watch` calls served.
    #[must_use]
    pub fn watch_calls(&self) -> u64 {
        self.watch_calls.load(Ordering::Relaxed)
    }

    /// Total number of `unwatch` calls received, including redundant ones.
    #[must_use]
    pub fn unwatch_calls(&self) -> u64 {
        self.unwatch_calls.load(Ordering::Relaxed)
    }

    // Callbacks never run under this lock, so a poisoned map is still sound.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Watcher>> {
        self.watchers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl LocationProvider for PushProvider {
    fn watch(&self, on_fix: FixCallback, on_error: ErrorCallback) -> ProviderResult<WatchHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.watch_calls.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, Watcher { on_fix, on_error });
        debug!(watch_id = id, "Watch established");
        Ok(WatchHandle::new(id))
    }

    fn unwatch(&self, handle: WatchHandle) {
        self.unwatch_calls.fetch_add(1, Ordering::Relaxed);
        if self.lock().remove(&handle.id()).is_some() {
            debug!(watch_id = handle.id(), "Watch released");
        }
    }
}

impl std::fmt::Debug for PushProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushProvider")
            .field("active_watches", &self.active_watches())
            .field("watch_calls", &self.watch_calls())
            .field("unwatch_calls", &self.unwatch_calls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_callbacks() -> (Arc<AtomicUsize>, Arc<AtomicUsize>, FixCallback, ErrorCallback) {
        let fixes = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fixes);
        let e = Arc::clone(&errors);
        let on_fix: FixCallback = Arc::new(move |_: RawFix| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let on_error: ErrorCallback = Arc::new(move |_: PositionErrorKind| {
            e.fetch_add(1, Ordering::SeqCst);
        });
        (fixes, errors, on_fix, on_error)
    }

    #[test]
    fn test_push_without_watch_delivers_nothing() {
        let provider = PushProvider::new();
        assert_eq!(provider.push_fix(RawFix::new(1.0, 2.0, 3.0)), 0);
        assert_eq!(provider.push_error(PositionErrorKind::Timeout), 0);
    }

    #[test]
    fn test_push_reaches_live_watch() {
        let provider = PushProvider::new();
        let (fixes, errors, on_fix, on_error) = counting_callbacks();
        let handle = provider.watch(on_fix, on_error).unwrap();

        assert_eq!(provider.push_fix(RawFix::new(1.0, 2.0, 3.0)), 1);
        assert_eq!(provider.push_error(PositionErrorKind::Timeout), 1);
        assert_eq!(fixes.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        provider.unwatch(handle);
        assert_eq!(provider.push_fix(RawFix::new(1.0, 2.0, 3.0)), 0);
        assert_eq!(fixes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unwatch_is_idempotent() {
        let provider = PushProvider::new();
        let (_, _, on_fix, on_error) = counting_callbacks();
        let handle = provider.watch(on_fix, on_error).unwrap();

        provider.unwatch(handle);
        provider.unwatch(handle);
        provider.unwatch(WatchHandle::new(999));

        assert_eq!(provider.active_watches(), 0);
        assert_eq!(provider.watch_calls(), 1);
        assert_eq!(provider.unwatch_calls(), 3);
    }

    #[test]
    fn test_handles_are_unique() {
        let provider = PushProvider::new();
        let (_, _, on_fix, on_error) = counting_callbacks();
        let a = provider.watch(Arc::clone(&on_fix), Arc::clone(&on_error)).unwrap();
        let b = provider.watch(on_fix, on_error).unwrap();
        assert_ne!(a, b);
        assert_eq!(provider.active_watches(), 2);
    }
}
