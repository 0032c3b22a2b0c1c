use crate::EntityKind;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Size summary of one discovery index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct IndexCounts {
    pub kind: EntityKind,
    /// Distinct entity ids.
    pub entities: usize,
    /// Total locations across all ids.
    pub locations: usize,
}

/// Diagnostic snapshot of the whole tracking session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct TrackerStats {
    pub spans: IndexCounts,
    pub endpoints: IndexCounts,
    pub pending_files: usize,
    pub pending_events: usize,
    pub paused: bool,
    /// Completed full-rebuild cycles.
    pub rebuilds: u64,
    /// Overload triggers dropped because a rebuild was already pending.
    pub dropped_triggers: u64,
    /// Flushed batches dropped because a worker queue was full.
    pub dropped_batches: u64,
}

impl TrackerStats {
    /// One-line human summary for diagnostics surfaces.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "spans: {} ids / {} locations; endpoints: {} ids / {} locations; \
             pending: {} files, {} events; paused: {}; rebuilds: {}",
            self.spans.entities,
            self.spans.locations,
            self.endpoints.entities,
            self.endpoints.locations,
            self.pending_files,
            self.pending_events,
            self.paused,
            self.rebuilds,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn summary_mentions_counts_and_state() {
        let stats = TrackerStats {
            spans: IndexCounts {
                kind: EntityKind::Span,
                entities: 3,
                locations: 4,
            },
            endpoints: IndexCounts {
                kind: EntityKind::Endpoint,
                entities: 1,
                locations: 2,
            },
            pending_files: 5,
            pending_events: 0,
            paused: false,
            rebuilds: 1,
            dropped_triggers: 0,
            dropped_batches: 0,
        };
        assert_eq!(
            stats.summary(),
            "spans: 3 ids / 4 locations; endpoints: 1 ids / 2 locations; \
             pending: 5 files, 0 events; paused: false; rebuilds: 1"
        );
    }
}
