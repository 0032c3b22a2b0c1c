use crate::{ChangeCollector, TrackerConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracenav_discovery::{DiscoveryIndex, ProcessContext, RebuildOutcome};

/// Lifecycle of the overload valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Collecting,
    Overloaded,
    Quiescing,
    Rebuilding,
}

/// Overload guard: pauses collection on buffer overflow and hands recovery
/// to a background full-rebuild cycle.
///
/// `trigger` is called from the latency-sensitive hook path, so it only
/// flips state, discards buffers, and pokes the background task over a
/// capacity-1 channel. A second trigger while a cycle is pending or running
/// is dropped under the phase lock rather than queued.
pub(crate) struct RebuildController {
    phase: Mutex<Phase>,
    collector: Arc<ChangeCollector>,
    wake_tx: mpsc::Sender<()>,
    rebuilds: AtomicU64,
    dropped_triggers: AtomicU64,
}

impl RebuildController {
    pub(crate) fn new(collector: Arc<ChangeCollector>, wake_tx: mpsc::Sender<()>) -> Self {
        Self {
            phase: Mutex::new(Phase::Collecting),
            collector,
            wake_tx,
            rebuilds: AtomicU64::new(0),
            dropped_triggers: AtomicU64::new(0),
        }
    }

    /// Opens the valve: pause, discard, schedule one rebuild cycle.
    pub(crate) fn trigger(&self) {
        {
            let mut phase = self.phase.lock();
            if *phase != Phase::Collecting {
                self.dropped_triggers.fetch_add(1, Ordering::Relaxed);
                log::debug!("overload trigger dropped: rebuild cycle already pending");
                return;
            }
            *phase = Phase::Overloaded;
        }

        self.collector.pause();
        self.collector.clear();
        // Capacity-1 wake channel: a failed send means the task is already
        // scheduled to wake up.
        let _ = self.wake_tx.try_send(());
        log::info!("change buffers overloaded: collection paused, full rebuild scheduled");
    }

    pub(crate) fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    pub(crate) fn dropped_trigger_count(&self) -> u64 {
        self.dropped_triggers.load(Ordering::Relaxed)
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }
}

/// Restores `paused = false` and the `Collecting` phase no matter how the
/// rebuild cycle ends: success, provider error, cancellation, or panic.
/// Leaving `paused` set would silently stop every future update.
struct ResumeGuard<'a> {
    controller: &'a RebuildController,
}

impl Drop for ResumeGuard<'_> {
    fn drop(&mut self) {
        // Phase first: records stay no-ops until `resume`, so no trigger
        // can sneak in between the two stores.
        self.controller.set_phase(Phase::Collecting);
        self.controller.collector.resume();
        log::info!("change collection resumed");
    }
}

/// Spawns the background task running full-rebuild cycles.
pub(crate) fn spawn_rebuild_loop(
    controller: Arc<RebuildController>,
    mut wake_rx: mpsc::Receiver<()>,
    indexes: Vec<Arc<DiscoveryIndex>>,
    config: TrackerConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                wake = wake_rx.recv() => {
                    if wake.is_none() {
                        break;
                    }
                }
            }
            run_rebuild_cycle(&controller, &indexes, &config, &shutdown).await;
        }
        log::debug!("rebuild loop stopped");
    })
}

async fn run_rebuild_cycle(
    controller: &RebuildController,
    indexes: &[Arc<DiscoveryIndex>],
    config: &TrackerConfig,
    shutdown: &CancellationToken,
) {
    let _resume = ResumeGuard { controller };

    controller.set_phase(Phase::Quiescing);
    wait_for_quiescence(&controller.collector, config, shutdown).await;
    if shutdown.is_cancelled() {
        return;
    }

    controller.set_phase(Phase::Rebuilding);
    let ctx = ProcessContext::new(shutdown.child_token());
    for index in indexes {
        rebuild_one(index, &ctx, config).await;
        if ctx.is_cancelled() {
            break;
        }
    }

    for recorded in ctx.errors() {
        log::warn!("full rebuild: {} failed: {}", recorded.source, recorded.error);
    }
    if !ctx.is_cancelled() {
        controller.rebuilds.fetch_add(1, Ordering::Relaxed);
    }
}

/// Polls until both buffers have settled or the wait bound is hit. Arrival
/// timestamps keep moving while paused, which is exactly what lets an edit
/// storm delay the rebuild up to the bound.
async fn wait_for_quiescence(
    collector: &ChangeCollector,
    config: &TrackerConfig,
    shutdown: &CancellationToken,
) {
    let deadline = Instant::now() + config.rebuild_max_wait;
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        let now = Instant::now();
        if collector.is_quiet(now, config.quiet_window) {
            return;
        }
        if now >= deadline {
            log::debug!("quiescence wait bound hit, rebuilding anyway");
            return;
        }
        let remaining = deadline.saturating_duration_since(now);
        time::sleep(config.rebuild_poll.min(remaining)).await;
    }
}

/// One index rebuild, retrying briefly when an incremental build still
/// holds the build lock.
async fn rebuild_one(index: &DiscoveryIndex, ctx: &ProcessContext, config: &TrackerConfig) {
    const MAX_BUSY_ATTEMPTS: u32 = 5;

    for attempt in 1..=MAX_BUSY_ATTEMPTS {
        match index.rebuild_full(ctx).await {
            RebuildOutcome::Completed | RebuildOutcome::Cancelled => return,
            RebuildOutcome::Busy => {
                log::debug!(
                    "{} index busy (attempt {attempt}/{MAX_BUSY_ATTEMPTS}), retrying",
                    index.kind()
                );
                time::sleep(config.rebuild_poll).await;
            }
        }
    }
    log::warn!(
        "{} index still busy after {MAX_BUSY_ATTEMPTS} attempts, rebuild skipped",
        index.kind()
    );
}
