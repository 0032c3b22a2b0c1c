use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracenav_discovery::{DiscoveryIndex, ProcessContext};
use tracenav_model::{ChangeKind, SourceChangeEvent};

/// Spawns the worker draining changed-file batches.
///
/// Each batch runs under a fresh [`ProcessContext`] derived from the
/// session token. Items are applied in first-seen order to every index; a
/// failure on one item never aborts the rest of the batch or the loop.
pub(crate) fn spawn_file_worker(
    mut rx: mpsc::Receiver<Vec<String>>,
    indexes: Vec<Arc<DiscoveryIndex>>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let batch = tokio::select! {
                () = shutdown.cancelled() => break,
                batch = rx.recv() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };

            let ctx = ProcessContext::new(shutdown.child_token());
            log::debug!("applying {} changed files", batch.len());
            for file_uri in &batch {
                if ctx.is_cancelled() {
                    break;
                }
                for index in &indexes {
                    index.update_for_file(&ctx, file_uri).await;
                }
            }
            report_recorded_errors("changed-file batch", &ctx);
        }
        log::debug!("file worker stopped");
    })
}

/// Spawns the worker draining raw-event batches.
pub(crate) fn spawn_event_worker(
    mut rx: mpsc::Receiver<Vec<SourceChangeEvent>>,
    indexes: Vec<Arc<DiscoveryIndex>>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let batch = tokio::select! {
                () = shutdown.cancelled() => break,
                batch = rx.recv() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };

            let ctx = ProcessContext::new(shutdown.child_token());
            log::debug!("applying {} raw events", batch.len());
            for event in &batch {
                if ctx.is_cancelled() {
                    break;
                }
                apply_event(&indexes, &ctx, event).await;
            }
            report_recorded_errors("raw-event batch", &ctx);
        }
        log::debug!("event worker stopped");
    })
}

/// Applies one file-system event to every index.
///
/// Deletes and moves are structural removals; renames surface as property
/// changes carrying the old path and re-discover the new identity. The same
/// real change may also arrive through the changed-file buffer, so every
/// branch here stays idempotent and commutative with the file worker.
pub(crate) async fn apply_event(
    indexes: &[Arc<DiscoveryIndex>],
    ctx: &ProcessContext,
    event: &SourceChangeEvent,
) {
    match event.kind {
        ChangeKind::Deleted => {
            for index in indexes {
                let removed = index.remove_for_file(&event.path);
                if removed > 0 {
                    log::debug!("{}: removed {removed} locations for deleted {}", index.kind(), event.path);
                }
            }
        }
        ChangeKind::Moved => {
            // The destination surfaces through its own change event; here
            // only the old identity is forgotten.
            let old = event.old_path.as_deref().unwrap_or(&event.path);
            for index in indexes {
                index.remove_for_path(old);
            }
        }
        ChangeKind::PropertyChanged => {
            if let Some(old) = event.old_path.as_deref() {
                for index in indexes {
                    index.remove_for_path(old);
                }
                for index in indexes {
                    index.update_for_file(ctx, &event.path).await;
                }
            }
        }
        ChangeKind::Modified | ChangeKind::Copied => {
            for index in indexes {
                index.update_for_file(ctx, &event.path).await;
            }
        }
    }
}

fn report_recorded_errors(what: &str, ctx: &ProcessContext) {
    for recorded in ctx.errors() {
        log::warn!("{what}: {} failed: {}", recorded.source, recorded.error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tracenav_discovery::{DiscoveryProvider, Result, RetryPolicy, SearchScope};
    use tracenav_model::{EntityKind, EntityLocation};

    struct TableProvider {
        table: Mutex<HashMap<String, Vec<EntityLocation>>>,
    }

    impl TableProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                table: Mutex::new(HashMap::new()),
            })
        }

        fn set_file(&self, uri: &str, locations: Vec<EntityLocation>) {
            self.table.lock().insert(uri.to_string(), locations);
        }
    }

    #[async_trait]
    impl DiscoveryProvider for TableProvider {
        fn name(&self) -> &str {
            "table"
        }

        async fn discover(
            &self,
            _ctx: &ProcessContext,
            scope: &SearchScope,
        ) -> Result<Vec<EntityLocation>> {
            let table = self.table.lock();
            Ok(match scope {
                SearchScope::Project => table.values().flatten().cloned().collect(),
                SearchScope::File(uri) => table.get(uri).cloned().unwrap_or_default(),
            })
        }
    }

    fn span_index(provider: Arc<TableProvider>) -> Arc<DiscoveryIndex> {
        Arc::new(DiscoveryIndex::new(
            EntityKind::Span,
            vec![provider],
            RetryPolicy::new(1, std::time::Duration::from_millis(1)),
        ))
    }

    #[tokio::test]
    async fn delete_event_removes_file_entries() {
        let provider = TableProvider::new();
        provider.set_file("src/A.java", vec![EntityLocation::new("S", "src/A.java", 1)]);
        let index = span_index(provider);
        let ctx = ProcessContext::detached();
        index.update_for_file(&ctx, "src/A.java").await;

        let indexes = vec![index.clone()];
        apply_event(&indexes, &ctx, &SourceChangeEvent::deleted("src/A.java")).await;
        assert!(index.is_empty());

        // Deleting again is a no-op, not an error.
        apply_event(&indexes, &ctx, &SourceChangeEvent::deleted("src/A.java")).await;
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn rename_moves_the_entity_to_the_new_file() {
        let provider = TableProvider::new();
        provider.set_file("src/A.java", vec![EntityLocation::new("S", "src/A.java", 3)]);
        let index = span_index(provider.clone());
        let ctx = ProcessContext::detached();
        index.update_for_file(&ctx, "src/A.java").await;

        // Host reports A.java -> B.java as a property change with old path.
        provider.set_file("src/A.java", vec![]);
        provider.set_file("src/B.java", vec![EntityLocation::new("S", "src/B.java", 3)]);
        let indexes = vec![index.clone()];
        apply_event(
            &indexes,
            &ctx,
            &SourceChangeEvent::property_changed("src/B.java", Some("src/A.java".to_string())),
        )
        .await;

        let found = index.locations(["S"]);
        assert_eq!(found["S"], vec![EntityLocation::new("S", "src/B.java", 3)]);
    }

    #[tokio::test]
    async fn move_event_forgets_only_the_old_identity() {
        let provider = TableProvider::new();
        provider.set_file("src/A.java", vec![EntityLocation::new("S", "src/A.java", 3)]);
        provider.set_file("src/C.java", vec![EntityLocation::new("T", "src/C.java", 8)]);
        let index = span_index(provider);
        let ctx = ProcessContext::detached();
        index.update_for_file(&ctx, "src/A.java").await;
        index.update_for_file(&ctx, "src/C.java").await;

        let indexes = vec![index.clone()];
        apply_event(
            &indexes,
            &ctx,
            &SourceChangeEvent::moved("src/B.java", "src/A.java"),
        )
        .await;

        assert!(index.locations(["S"]).is_empty());
        assert_eq!(index.locations(["T"]).len(), 1);
    }

    #[tokio::test]
    async fn modified_event_rediscovers_the_file() {
        let provider = TableProvider::new();
        provider.set_file("src/A.java", vec![EntityLocation::new("S", "src/A.java", 1)]);
        let index = span_index(provider.clone());
        let ctx = ProcessContext::detached();

        let indexes = vec![index.clone()];
        apply_event(&indexes, &ctx, &SourceChangeEvent::modified("src/A.java")).await;
        assert_eq!(index.entity_count(), 1);

        // Same update arriving through both buffers converges on one state.
        apply_event(&indexes, &ctx, &SourceChangeEvent::modified("src/A.java")).await;
        assert_eq!(index.counts().locations, 1);
    }
}
