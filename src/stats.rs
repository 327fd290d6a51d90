use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::store::ObjectEntry;
use crate::strategy::ItemOutcome;

/// One recorded per-item failure. The error is kept as its rendered context
/// chain; the operation as a whole still completes.
#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub key: String,
    pub version_id: Option<String>,
    pub error: String,
}

/// Shared, lock-light aggregation of per-item outcomes. Workers update it
/// concurrently; the orchestrator snapshots it after the queue drains.
#[derive(Debug, Default)]
pub struct PurgeStats {
    processed: AtomicU64,
    versions_deleted: AtomicU64,
    markers_deleted: AtomicU64,
    skipped: AtomicU64,
    failures: Mutex<Vec<ItemFailure>>,
}

impl PurgeStats {
    pub fn record(&self, outcome: ItemOutcome) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            ItemOutcome::Removed(removed) => {
                self.versions_deleted
                    .fetch_add(removed.versions as u64, Ordering::Relaxed);
                self.markers_deleted
                    .fetch_add(removed.markers as u64, Ordering::Relaxed);
            }
            ItemOutcome::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_failure(&self, entry: &ObjectEntry, error: &anyhow::Error) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.failures.lock().unwrap().push(ItemFailure {
            key: entry.key.clone(),
            version_id: entry.version_id.clone(),
            error: format!("{error:#}"),
        });
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn versions_deleted(&self) -> u64 {
        self.versions_deleted.load(Ordering::Relaxed)
    }

    pub fn markers_deleted(&self) -> u64 {
        self.markers_deleted.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PurgeSummary {
        PurgeSummary {
            processed: self.processed.load(Ordering::Relaxed),
            versions_deleted: self.versions_deleted.load(Ordering::Relaxed),
            markers_deleted: self.markers_deleted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.lock().unwrap().clone(),
        }
    }
}

/// Final tally of one operation.
#[derive(Debug, Clone, Default)]
pub struct PurgeSummary {
    /// Entries popped from the queue (successes, skips, and failures).
    pub processed: u64,
    pub versions_deleted: u64,
    pub markers_deleted: u64,
    pub skipped: u64,
    pub failures: Vec<ItemFailure>,
}

impl PurgeSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
