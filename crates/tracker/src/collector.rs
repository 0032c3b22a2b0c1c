use indexmap::IndexSet;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::Instant;
use tracenav_model::SourceChangeEvent;

/// What happened to a record call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Recorded,
    /// Collection is paused; only the arrival timestamp was updated.
    Paused,
    /// The buffer is at its hard limit; nothing was inserted. The caller is
    /// expected to open the overload valve.
    Overflowed,
}

/// Coalescing buffers between the editing hooks and the build pipeline.
///
/// Two buffers: a deduped, insertion-ordered set of changed-file uris and an
/// append-only raw-event list. Both are swapped wholesale by the flush loop
/// (`take_*`), never mutated piecemeal, so the captured snapshot can be
/// iterated without a lock.
///
/// Record calls are hook-path cheap: a timestamp store and one insert under
/// a short mutex. Arrival timestamps keep moving even while paused; the
/// quiescence wait reads them to know when an edit storm has settled.
pub struct ChangeCollector {
    max_pending: usize,
    paused: AtomicBool,
    changed_files: Mutex<IndexSet<String>>,
    raw_events: Mutex<Vec<SourceChangeEvent>>,
    last_file_at: Mutex<Option<Instant>>,
    last_event_at: Mutex<Option<Instant>>,
}

impl ChangeCollector {
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            max_pending,
            paused: AtomicBool::new(false),
            changed_files: Mutex::new(IndexSet::new()),
            raw_events: Mutex::new(Vec::new()),
            last_file_at: Mutex::new(None),
            last_event_at: Mutex::new(None),
        }
    }

    pub fn record_changed_file(&self, file_uri: impl Into<String>) -> Admission {
        *self.last_file_at.lock() = Some(Instant::now());
        if self.is_paused() {
            return Admission::Paused;
        }

        let mut files = self.changed_files.lock();
        if files.len() >= self.max_pending {
            return Admission::Overflowed;
        }
        files.insert(file_uri.into());
        Admission::Recorded
    }

    pub fn record_events(&self, events: &[SourceChangeEvent]) -> Admission {
        *self.last_event_at.lock() = Some(Instant::now());
        if self.is_paused() {
            return Admission::Paused;
        }

        let mut buffered = self.raw_events.lock();
        if buffered.len() >= self.max_pending {
            return Admission::Overflowed;
        }
        buffered.extend_from_slice(events);
        Admission::Recorded
    }

    /// Swaps the changed-file buffer for an empty one and returns the
    /// captured batch in first-seen order.
    #[must_use]
    pub fn take_changed_files(&self) -> Vec<String> {
        let captured = std::mem::take(&mut *self.changed_files.lock());
        captured.into_iter().collect()
    }

    /// Swaps the raw-event buffer for an empty one.
    #[must_use]
    pub fn take_raw_events(&self) -> Vec<SourceChangeEvent> {
        std::mem::take(&mut *self.raw_events.lock())
    }

    /// Discards both buffers without processing them.
    pub fn clear(&self) {
        self.changed_files.lock().clear();
        self.raw_events.lock().clear();
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn pending_files(&self) -> usize {
        self.changed_files.lock().len()
    }

    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.raw_events.lock().len()
    }

    #[must_use]
    pub fn last_file_arrival(&self) -> Option<Instant> {
        *self.last_file_at.lock()
    }

    #[must_use]
    pub fn last_event_arrival(&self) -> Option<Instant> {
        *self.last_event_at.lock()
    }

    /// True once both buffers have been idle for at least `window`.
    #[must_use]
    pub fn is_quiet(&self, now: Instant, window: std::time::Duration) -> bool {
        let settled = |arrival: Option<Instant>| match arrival {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= window,
        };
        settled(self.last_file_arrival()) && settled(self.last_event_arrival())
    }
}
