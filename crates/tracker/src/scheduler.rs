use crate::{ChangeCollector, TrackerConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracenav_model::SourceChangeEvent;

/// Spawns the quiet-period flush loop.
///
/// Polls at `poll_interval`; a non-empty buffer that has been idle for at
/// least `quiet_window` is swapped for an empty one and the captured batch
/// is published to its worker queue. Publishing never blocks the timer
/// loop: a full queue drops the batch with a warning and a counter bump,
/// and the next flush or the overload valve restores consistency.
pub(crate) fn spawn_flush_loop(
    collector: Arc<ChangeCollector>,
    config: TrackerConfig,
    file_tx: mpsc::Sender<Vec<String>>,
    event_tx: mpsc::Sender<Vec<SourceChangeEvent>>,
    dropped_batches: Arc<AtomicU64>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(config.poll_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    flush_quiet_buffers(
                        &collector,
                        &config,
                        &file_tx,
                        &event_tx,
                        &dropped_batches,
                    );
                }
            }
        }
        log::debug!("flush loop stopped");
    })
}

fn flush_quiet_buffers(
    collector: &ChangeCollector,
    config: &TrackerConfig,
    file_tx: &mpsc::Sender<Vec<String>>,
    event_tx: &mpsc::Sender<Vec<SourceChangeEvent>>,
    dropped_batches: &AtomicU64,
) {
    let now = Instant::now();

    if collector.pending_files() > 0 && settled(collector.last_file_arrival(), now, config) {
        let batch = collector.take_changed_files();
        if !batch.is_empty() {
            log::debug!("flushing {} changed files", batch.len());
            if file_tx.try_send(batch).is_err() {
                dropped_batches.fetch_add(1, Ordering::Relaxed);
                log::warn!("changed-file queue full, batch dropped");
            }
        }
    }

    if collector.pending_events() > 0 && settled(collector.last_event_arrival(), now, config) {
        let batch = collector.take_raw_events();
        if !batch.is_empty() {
            log::debug!("flushing {} raw events", batch.len());
            if event_tx.try_send(batch).is_err() {
                dropped_batches.fetch_add(1, Ordering::Relaxed);
                log::warn!("raw-event queue full, batch dropped");
            }
        }
    }
}

fn settled(arrival: Option<Instant>, now: Instant, config: &TrackerConfig) -> bool {
    arrival.is_some_and(|at| now.saturating_duration_since(at) >= config.quiet_window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn test_config() -> TrackerConfig {
        TrackerConfig {
            poll_interval: Duration::from_millis(200),
            quiet_window: Duration::from_secs(5),
            ..TrackerConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_batch() {
        let collector = Arc::new(ChangeCollector::new(200));
        let (file_tx, mut file_rx) = mpsc::channel(4);
        let (event_tx, _event_rx) = mpsc::channel(4);
        let dropped = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();

        let handle = spawn_flush_loop(
            collector.clone(),
            test_config(),
            file_tx,
            event_tx,
            dropped,
            shutdown.clone(),
        );

        // Bursty edits within the quiet window.
        collector.record_changed_file("src/A.java");
        time::advance(Duration::from_millis(300)).await;
        collector.record_changed_file("src/B.java");
        time::advance(Duration::from_millis(300)).await;
        collector.record_changed_file("src/A.java");

        let batch = file_rx.recv().await.expect("flush");
        assert_eq!(batch, vec!["src/A.java".to_string(), "src/B.java".to_string()]);

        // Nothing further queued.
        assert!(file_rx.try_recv().is_err());
        shutdown.cancel();
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_flush_before_the_window_settles() {
        let collector = Arc::new(ChangeCollector::new(200));
        let (file_tx, mut file_rx) = mpsc::channel(4);
        let (event_tx, _event_rx) = mpsc::channel(4);
        let dropped = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();

        let handle = spawn_flush_loop(
            collector.clone(),
            test_config(),
            file_tx,
            event_tx,
            dropped,
            shutdown.clone(),
        );

        collector.record_changed_file("src/A.java");
        time::advance(Duration::from_secs(4)).await;
        assert!(file_rx.try_recv().is_err());

        // Keep-alive edits push the flush out.
        collector.record_changed_file("src/A.java");
        time::advance(Duration::from_secs(4)).await;
        assert!(file_rx.try_recv().is_err());

        time::advance(Duration::from_secs(2)).await;
        let batch = file_rx.recv().await.expect("flush");
        assert_eq!(batch, vec!["src/A.java".to_string()]);

        shutdown.cancel();
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_the_batch_and_counts_it() {
        let collector = Arc::new(ChangeCollector::new(200));
        // Zero-capacity is not allowed; use one and occupy it.
        let (file_tx, mut file_rx) = mpsc::channel(1);
        file_tx.try_send(vec!["occupied".to_string()]).unwrap();
        let (event_tx, _event_rx) = mpsc::channel(4);
        let dropped = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();

        let handle = spawn_flush_loop(
            collector.clone(),
            test_config(),
            file_tx,
            event_tx,
            dropped.clone(),
            shutdown.clone(),
        );

        collector.record_changed_file("src/A.java");
        time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert_eq!(dropped.load(Ordering::Relaxed), 1);
        assert_eq!(file_rx.try_recv().unwrap(), vec!["occupied".to_string()]);

        shutdown.cancel();
        let _ = handle.await;
    }
}
