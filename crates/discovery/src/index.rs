use crate::{retry, DiscoveryProvider, ProcessContext, RetryOutcome, RetryPolicy, SearchScope};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracenav_model::{EntityKind, EntityLocation, IndexCounts};

/// How a full rebuild ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    Completed,
    /// The token fired mid-build; partial merged results were kept.
    Cancelled,
    /// Another build already held the build lock; nothing ran.
    Busy,
}

/// Concurrently readable id → locations map for one entity kind.
///
/// Reads take a short read lock and never wait on builds. Mutating builds
/// (incremental file updates and full rebuilds) are serialized by a
/// per-index build lock; structural removals bypass it because they touch
/// only the map, never the providers.
pub struct DiscoveryIndex {
    kind: EntityKind,
    providers: Vec<Arc<dyn DiscoveryProvider>>,
    retry_policy: RetryPolicy,
    entries: RwLock<HashMap<String, BTreeSet<EntityLocation>>>,
    build_lock: TokioMutex<()>,
}

impl DiscoveryIndex {
    #[must_use]
    pub fn new(
        kind: EntityKind,
        providers: Vec<Arc<dyn DiscoveryProvider>>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            kind,
            providers,
            retry_policy,
            entries: RwLock::new(HashMap::new()),
            build_lock: TokioMutex::new(()),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Locations for each requested id that the index knows about. Ids with
    /// no entry are absent from the result.
    #[must_use]
    pub fn locations<I, S>(&self, ids: I) -> HashMap<String, Vec<EntityLocation>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = self.entries.read();
        let mut found = HashMap::new();
        for id in ids {
            let id = id.as_ref();
            if let Some(locations) = entries.get(id) {
                found.insert(id.to_string(), locations.iter().cloned().collect());
            }
        }
        found
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    #[must_use]
    pub fn counts(&self) -> IndexCounts {
        let entries = self.entries.read();
        IndexCounts {
            kind: self.kind,
            entities: entries.len(),
            locations: entries.values().map(BTreeSet::len).sum(),
        }
    }

    /// Re-discovers one file and replaces its entries with the result.
    ///
    /// Waits on the build lock, then runs every provider against the file
    /// scope through the retry combinator. Replacing (rather than purely
    /// merging) the file's previous entries means an entity deleted from the
    /// file disappears without a full rebuild. If the build is cancelled
    /// before any provider finished, the index is left untouched; a
    /// cancellation mid-build installs the partial result.
    pub async fn update_for_file(&self, ctx: &ProcessContext, file_uri: &str) {
        if ctx.is_cancelled() {
            return;
        }
        let _build = self.build_lock.lock().await;
        if ctx.is_cancelled() {
            return;
        }

        let scope = SearchScope::file(file_uri);
        let mut discovered: Vec<EntityLocation> = Vec::new();
        let mut completed_any = false;

        for provider in &self.providers {
            if ctx.is_cancelled() {
                break;
            }
            match retry(self.retry_policy, ctx, provider.name(), || {
                provider.discover(ctx, &scope)
            })
            .await
            {
                RetryOutcome::Success(found) => {
                    discovered.extend(found);
                    completed_any = true;
                }
                // Exhausted means "found nothing this round"; the error is
                // already on the context.
                RetryOutcome::Exhausted(_) => completed_any = true,
                RetryOutcome::Cancelled => break,
            }
        }

        if !completed_any {
            return;
        }

        let mut entries = self.entries.write();
        Self::remove_matching_locked(&mut entries, file_uri);
        Self::merge_locked(&mut entries, discovered);
        log::debug!(
            "{} index updated for {file_uri}: {} ids total",
            self.kind,
            entries.len()
        );
    }

    /// Structural removal of every location recorded for `file_uri`.
    /// Idempotent: removing a never-indexed file is a no-op. Returns the
    /// number of locations dropped.
    pub fn remove_for_file(&self, file_uri: &str) -> usize {
        let mut entries = self.entries.write();
        Self::remove_matching_locked(&mut entries, file_uri)
    }

    /// Structural removal keyed by a file's previous identity (moves and
    /// renames). No provider calls; the new location surfaces through the
    /// change event for the destination file.
    pub fn remove_for_path(&self, old_path: &str) -> usize {
        let mut entries = self.entries.write();
        Self::remove_matching_locked(&mut entries, old_path)
    }

    /// From-scratch re-scan of the whole scope by every provider.
    ///
    /// Returns [`RebuildOutcome::Busy`] without touching anything when
    /// another build holds the build lock. Otherwise the index is reset
    /// before discovery so no ghost entries survive, then provider results
    /// are merged as they arrive. Cancellation between providers keeps the
    /// partial merge.
    pub async fn rebuild_full(&self, ctx: &ProcessContext) -> RebuildOutcome {
        let Ok(_build) = self.build_lock.try_lock() else {
            return RebuildOutcome::Busy;
        };
        if ctx.is_cancelled() {
            return RebuildOutcome::Cancelled;
        }

        // Reset first: merging into the old map would keep entries from
        // files that vanished while collection was paused.
        self.entries.write().clear();

        let scope = SearchScope::project();
        for provider in &self.providers {
            if ctx.is_cancelled() {
                log::info!("{} rebuild cancelled, partial results kept", self.kind);
                return RebuildOutcome::Cancelled;
            }
            match retry(self.retry_policy, ctx, provider.name(), || {
                provider.discover(ctx, &scope)
            })
            .await
            {
                RetryOutcome::Success(found) => {
                    let mut entries = self.entries.write();
                    Self::merge_locked(&mut entries, found);
                }
                RetryOutcome::Exhausted(err) => {
                    log::warn!(
                        "{} rebuild: provider {} gave up: {err}",
                        self.kind,
                        provider.name()
                    );
                }
                RetryOutcome::Cancelled => {
                    log::info!("{} rebuild cancelled, partial results kept", self.kind);
                    return RebuildOutcome::Cancelled;
                }
            }
        }

        let counts = self.counts();
        log::info!(
            "{} rebuild complete: {} ids / {} locations",
            self.kind,
            counts.entities,
            counts.locations
        );
        RebuildOutcome::Completed
    }

    fn merge_locked(
        entries: &mut HashMap<String, BTreeSet<EntityLocation>>,
        locations: Vec<EntityLocation>,
    ) {
        for location in locations {
            entries
                .entry(location.entity_id.clone())
                .or_default()
                .insert(location);
        }
    }

    fn remove_matching_locked(
        entries: &mut HashMap<String, BTreeSet<EntityLocation>>,
        file_uri: &str,
    ) -> usize {
        let mut removed = 0;
        entries.retain(|_, locations| {
            let before = locations.len();
            locations.retain(|location| location.file_uri != file_uri);
            removed += before - locations.len();
            !locations.is_empty()
        });
        removed
    }
}
