//! Apply coordinator: executes the safe subset of a classified delta.
//!
//! Every `Safe` entry becomes one conditional write. Writes target
//! disjoint keys and run concurrently up to `max_concurrent_writes`; the
//! result is assembled only after all of them finished. A failing key
//! never aborts its siblings and nothing is rolled back.

use crate::conflict::{Classification, ClassifiedDelta, ClassifiedEntry};
use crate::diff::Change;
use crate::engine::SyncConfig;
use crate::error::SyncError;
use crate::outcome::{ApplyOutcome, OutcomeStatus, SyncResult};
use crate::store::{KvStore, WriteStatus};
use futures::StreamExt;
use futures::stream;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reason recorded for writes suppressed by cancellation.
pub const CANCELLED_REASON: &str = "cancelled before the write was issued";

/// Executes classified deltas against a store.
#[derive(Debug, Clone)]
pub struct ApplyCoordinator {
    max_concurrent_writes: usize,
    write_timeout: Duration,
}

impl ApplyCoordinator {
    /// Creates a coordinator from the sync configuration.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            max_concurrent_writes: config.max_concurrent_writes.max(1),
            write_timeout: config.request_timeout(),
        }
    }

    /// Applies `classified` to `store`.
    ///
    /// Always returns a complete result with one outcome per entry.
    /// Cancelling `cancel` suppresses writes that have not started yet;
    /// those entries are reported as failed.
    pub async fn apply(
        &self,
        classified: ClassifiedDelta,
        store: &dyn KvStore,
        cancel: &CancellationToken,
    ) -> SyncResult {
        let total = classified.len();
        let outcomes: Vec<ApplyOutcome> = stream::iter(classified)
            .map(|entry| self.apply_entry(entry, store, cancel))
            .buffer_unordered(self.max_concurrent_writes)
            .collect()
            .await;

        let result = SyncResult::from_outcomes(store.endpoint().clone(), outcomes);
        info!(
            "Sync to {}: {} applied, {} already in place, {} stale, {} deleted upstream, {} failed (of {})",
            store.endpoint().label(),
            result.counts.applied,
            result.counts.already_applied,
            result.counts.skipped_stale,
            result.counts.skipped_deleted_upstream,
            result.counts.failed,
            total
        );
        result
    }

    async fn apply_entry(
        &self,
        entry: ClassifiedEntry,
        store: &dyn KvStore,
        cancel: &CancellationToken,
    ) -> ApplyOutcome {
        let live = entry.live_value().map(str::to_string);

        let status = match entry.classification {
            Classification::Stale => {
                warn!("Skipping {}: changed concurrently", entry.path);
                OutcomeStatus::SkippedStale
            }
            Classification::DeletedUpstream => {
                warn!("Skipping {}: deleted concurrently", entry.path);
                OutcomeStatus::SkippedDeletedUpstream
            }
            Classification::AlreadySatisfied => {
                debug!("{} already in the intended state", entry.path);
                OutcomeStatus::AlreadyApplied
            }
            Classification::Safe if cancel.is_cancelled() => OutcomeStatus::Failed {
                reason: CANCELLED_REASON.to_string(),
            },
            Classification::Safe => self.write(&entry, store).await,
        };

        // A rejected conditional write means the live value we saw is gone.
        let live = match status {
            OutcomeStatus::SkippedStale if entry.is_safe() => None,
            _ => live,
        };

        ApplyOutcome {
            path: entry.path,
            change: entry.change,
            status,
            live,
        }
    }

    async fn write(&self, entry: &ClassifiedEntry, store: &dyn KvStore) -> OutcomeStatus {
        let result = match &entry.change {
            Change::Added { value } => {
                tokio::time::timeout(self.write_timeout, store.create(&entry.path, value)).await
            }
            Change::Modified { new, .. } => {
                let Some(token) = entry.live_version() else {
                    return missing_token(entry);
                };
                tokio::time::timeout(
                    self.write_timeout,
                    store.compare_and_swap(&entry.path, new, token),
                )
                .await
            }
            Change::Removed { .. } => {
                let Some(token) = entry.live_version() else {
                    return missing_token(entry);
                };
                tokio::time::timeout(
                    self.write_timeout,
                    store.compare_and_delete(&entry.path, token),
                )
                .await
            }
        };

        match result {
            Ok(Ok(WriteStatus::Committed)) => {
                debug!("Applied {} ({})", entry.path, entry.change.label());
                OutcomeStatus::Applied
            }
            Ok(Ok(WriteStatus::Rejected)) => {
                warn!("Conditional write to {} rejected: changed since read", entry.path);
                OutcomeStatus::SkippedStale
            }
            Ok(Err(e)) => {
                warn!("Write to {} failed: {}", entry.path, e);
                OutcomeStatus::Failed {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                warn!("Write to {} timed out after {:?}", entry.path, self.write_timeout);
                OutcomeStatus::Failed {
                    reason: SyncError::Timeout.to_string(),
                }
            }
        }
    }
}

fn missing_token(entry: &ClassifiedEntry) -> OutcomeStatus {
    warn!("No version token for live key {}", entry.path);
    OutcomeStatus::Failed {
        reason: format!("live entry for {} carries no version token", entry.path),
    }
}
