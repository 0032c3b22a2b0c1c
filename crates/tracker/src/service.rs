use crate::collector::Admission;
use crate::rebuild::{spawn_rebuild_loop, RebuildController};
use crate::scheduler::spawn_flush_loop;
use crate::worker::{spawn_event_worker, spawn_file_worker};
use crate::{ChangeCollector, Result, TrackerConfig, TrackerError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracenav_discovery::{DiscoveryIndex, DiscoveryProvider};
use tracenav_model::{EntityKind, EntityLocation, SourceChangeEvent, TrackerStats};

/// One tracking session: both discovery indexes plus the change-tracking
/// pipeline keeping them consistent with the live source tree.
///
/// Constructed once per session and injected into collaborators; cheap to
/// clone (all clones share the same state). `start` spawns the background
/// loops, `dispose` tears them down. Dropping the last handle cancels the
/// session token as well.
#[derive(Clone)]
pub struct TraceNav {
    inner: Arc<Inner>,
}

struct Inner {
    config: TrackerConfig,
    collector: Arc<ChangeCollector>,
    spans: Arc<DiscoveryIndex>,
    endpoints: Arc<DiscoveryIndex>,
    controller: Arc<RebuildController>,
    shutdown: CancellationToken,
    dropped_batches: Arc<AtomicU64>,
    pending: Mutex<Option<PendingChannels>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Queue endpoints held between construction and `start`.
struct PendingChannels {
    file_tx: mpsc::Sender<Vec<String>>,
    file_rx: mpsc::Receiver<Vec<String>>,
    event_tx: mpsc::Sender<Vec<SourceChangeEvent>>,
    event_rx: mpsc::Receiver<Vec<SourceChangeEvent>>,
    wake_rx: mpsc::Receiver<()>,
}

impl TraceNav {
    #[must_use]
    pub fn new(
        span_providers: Vec<Arc<dyn DiscoveryProvider>>,
        endpoint_providers: Vec<Arc<dyn DiscoveryProvider>>,
        config: TrackerConfig,
    ) -> Self {
        let collector = Arc::new(ChangeCollector::new(config.max_pending));
        let spans = Arc::new(DiscoveryIndex::new(
            EntityKind::Span,
            span_providers,
            config.retry,
        ));
        let endpoints = Arc::new(DiscoveryIndex::new(
            EntityKind::Endpoint,
            endpoint_providers,
            config.retry,
        ));

        let (file_tx, file_rx) = mpsc::channel(config.queue_depth);
        let (event_tx, event_rx) = mpsc::channel(config.queue_depth);
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let controller = Arc::new(RebuildController::new(collector.clone(), wake_tx));

        Self {
            inner: Arc::new(Inner {
                config,
                collector,
                spans,
                endpoints,
                controller,
                shutdown: CancellationToken::new(),
                dropped_batches: Arc::new(AtomicU64::new(0)),
                pending: Mutex::new(Some(PendingChannels {
                    file_tx,
                    file_rx,
                    event_tx,
                    event_rx,
                    wake_rx,
                })),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawns the flush loop, both batch workers, and the rebuild task.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let channels = self
            .inner
            .pending
            .lock()
            .take()
            .ok_or(TrackerError::AlreadyStarted)?;

        let indexes = vec![self.inner.spans.clone(), self.inner.endpoints.clone()];
        let mut tasks = self.inner.tasks.lock();
        tasks.push(spawn_flush_loop(
            self.inner.collector.clone(),
            self.inner.config.clone(),
            channels.file_tx,
            channels.event_tx,
            self.inner.dropped_batches.clone(),
            self.inner.shutdown.clone(),
        ));
        tasks.push(spawn_file_worker(
            channels.file_rx,
            indexes.clone(),
            self.inner.shutdown.clone(),
        ));
        tasks.push(spawn_event_worker(
            channels.event_rx,
            indexes.clone(),
            self.inner.shutdown.clone(),
        ));
        tasks.push(spawn_rebuild_loop(
            self.inner.controller.clone(),
            channels.wake_rx,
            indexes,
            self.inner.config.clone(),
            self.inner.shutdown.clone(),
        ));

        log::info!("tracking session started");
        Ok(())
    }

    /// Cancels the session token and waits for the background tasks.
    pub async fn dispose(&self) {
        self.inner.shutdown.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        log::info!("tracking session disposed");
    }

    /// Hook-path entry: a file's content changed. Returns immediately.
    pub fn record_changed_file(&self, file_uri: impl Into<String>) {
        if self.inner.collector.record_changed_file(file_uri) == Admission::Overflowed {
            self.inner.controller.trigger();
        }
    }

    /// Hook-path entry: raw file-system events from the host watcher.
    pub fn record_events(&self, events: &[SourceChangeEvent]) {
        if self.inner.collector.record_events(events) == Admission::Overflowed {
            self.inner.controller.trigger();
        }
    }

    /// Feeds one event through both buffers: the raw-event buffer always,
    /// the changed-file buffer for content changes.
    pub fn record_event(&self, event: SourceChangeEvent) {
        if event.is_content_change() {
            self.record_changed_file(event.path.clone());
        }
        self.record_events(std::slice::from_ref(&event));
    }

    /// Manual escape hatch: schedule a full rebuild through the same path
    /// as buffer overflow.
    pub fn trigger_rebuild(&self) {
        self.inner.controller.trigger();
    }

    /// Known locations for each requested id, merged across both indexes.
    #[must_use]
    pub fn locations<I, S>(&self, ids: I) -> HashMap<String, Vec<EntityLocation>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
        let mut found = self.inner.spans.locations(&ids);
        for (id, locations) in self.inner.endpoints.locations(&ids) {
            let entry = found.entry(id).or_default();
            entry.extend(locations);
            entry.sort();
            entry.dedup();
        }
        found
    }

    #[must_use]
    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            spans: self.inner.spans.counts(),
            endpoints: self.inner.endpoints.counts(),
            pending_files: self.inner.collector.pending_files(),
            pending_events: self.inner.collector.pending_events(),
            paused: self.inner.collector.is_paused(),
            rebuilds: self.inner.controller.rebuild_count(),
            dropped_triggers: self.inner.controller.dropped_trigger_count(),
            dropped_batches: self.inner.dropped_batches.load(Ordering::Relaxed),
        }
    }

    /// One-line diagnostic summary.
    #[must_use]
    pub fn status(&self) -> String {
        self.stats().summary()
    }

    #[must_use]
    pub fn span_index(&self) -> Arc<DiscoveryIndex> {
        self.inner.spans.clone()
    }

    #[must_use]
    pub fn endpoint_index(&self) -> Arc<DiscoveryIndex> {
        self.inner.endpoints.clone()
    }
}

impl Drop for TraceNav {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            self.inner.shutdown.cancel();
        }
    }
}
