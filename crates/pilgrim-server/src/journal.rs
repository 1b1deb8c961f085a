//! Bounded in-memory journal of tracker events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use pilgrim_core::{ProximityTracker, SubscriptionId, TrackerEvent};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Number of events the server keeps.
pub const JOURNAL_CAPACITY: usize = 200;

/// One journaled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JournalEntry {
    /// Position of the event in the stream since startup, starting at 1.
    #[schema(example = 42)]
    pub seq: u64,

    /// When the server received the event.
    pub recorded_at: DateTime<Utc>,

    /// The event itself.
    pub event: TrackerEvent,
}

#[derive(Debug)]
struct JournalInner {
    entries: VecDeque<JournalEntry>,
    capacity: usize,
    total: u64,
}

/// Ring buffer of the most recent tracker events.
#[derive(Debug, Clone)]
pub struct EventJournal {
    inner: Arc<Mutex<JournalInner>>,
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new(JOURNAL_CAPACITY)
    }
}

impl EventJournal {
    /// Journal keeping at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(JournalInner {
                entries: VecDeque::with_capacity(capacity),
                capacity,
                total: 0,
            })),
        }
    }

    /// Subscribe the journal to a tracker.
    pub fn attach(&self, tracker: &ProximityTracker) -> SubscriptionId {
        let journal = self.clone();
        tracker.on_event(move |event| {
            journal.record(event.clone());
            Ok(())
        })
    }

    /// Append an event, evicting the oldest when full.
    pub fn record(&self, event: TrackerEvent) {
        let mut inner = self.lock();
        inner.total += 1;
        let entry = JournalEntry {
            seq: inner.total,
            recorded_at: Utc::now(),
            event,
        };
        if inner.entries.len() == inner.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);
    }

    /// The last `limit` events, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<JournalEntry> {
        let inner = self.lock();
        let skip = inner.entries.len().saturating_sub(limit);
        inner.entries.iter().skip(skip).cloned().collect()
    }

    /// Number of events recorded since startup, including evicted ones.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.lock().total
    }

    /// Number of events currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no event is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, JournalInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilgrim_core::PositionErrorKind;

    fn error_event() -> TrackerEvent {
        TrackerEvent::PositionError {
            kind: PositionErrorKind::Timeout,
            message: PositionErrorKind::Timeout.message().to_string(),
        }
    }

    #[test]
    fn test_record_assigns_sequence_numbers() {
        let journal = EventJournal::new(10);
        journal.record(error_event());
        journal.record(error_event());
        let seqs: Vec<u64> = journal.recent(10).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let journal = EventJournal::new(3);
        for _ in 0..5 {
            journal.record(error_event());
        }
        assert_eq!(journal.len(), 3);
        assert_eq!(journal.total(), 5);
        let seqs: Vec<u64> = journal.recent(10).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[test]
    fn test_recent_limits_to_newest() {
        let journal = EventJournal::default();
        for _ in 0..4 {
            journal.record(error_event());
        }
        let seqs: Vec<u64> = journal.recent(2).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 4]);
        assert!(journal.recent(0).is_empty());
    }
}
