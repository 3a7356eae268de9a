//! Per-key apply outcomes and the aggregated sync result.

use crate::diff::Change;
use kvdesk_types::{ConsulClient, KeyPath};
use serde::{Deserialize, Serialize};

/// What happened to one delta entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The conditional write was accepted.
    Applied,
    /// The live tree already held the intended state; nothing was written.
    AlreadyApplied,
    /// Not written: the key changed concurrently.
    SkippedStale,
    /// Not written: the key was deleted concurrently.
    SkippedDeletedUpstream,
    /// The write was attempted (or suppressed) and did not succeed.
    Failed { reason: String },
}

impl OutcomeStatus {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Applied | OutcomeStatus::AlreadyApplied)
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            OutcomeStatus::SkippedStale | OutcomeStatus::SkippedDeletedUpstream
        )
    }
}

/// Result of applying one delta entry.
///
/// Carries enough to show old vs live vs intended values for manual
/// resolution: `change` holds the old and intended values, `live` the
/// value observed when the entry was classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub path: KeyPath,
    pub change: Change,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live: Option<String>,
}

/// Outcome counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub applied: usize,
    pub already_applied: usize,
    pub skipped_stale: usize,
    pub skipped_deleted_upstream: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    fn record(&mut self, status: &OutcomeStatus) {
        match status {
            OutcomeStatus::Applied => self.applied += 1,
            OutcomeStatus::AlreadyApplied => self.already_applied += 1,
            OutcomeStatus::SkippedStale => self.skipped_stale += 1,
            OutcomeStatus::SkippedDeletedUpstream => self.skipped_deleted_upstream += 1,
            OutcomeStatus::Failed { .. } => self.failed += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.applied
            + self.already_applied
            + self.skipped_stale
            + self.skipped_deleted_upstream
            + self.failed
    }
}

/// Aggregated result of one save: exactly one outcome per delta entry,
/// ordered by path.
///
/// Deserialization re-sorts the outcomes, rejects duplicate paths and
/// recomputes `counts` from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSyncResult")]
pub struct SyncResult {
    pub client: ConsulClient,
    pub counts: OutcomeCounts,
    pub outcomes: Vec<ApplyOutcome>,
}

#[derive(Deserialize)]
struct RawSyncResult {
    client: ConsulClient,
    outcomes: Vec<ApplyOutcome>,
}

impl TryFrom<RawSyncResult> for SyncResult {
    type Error = kvdesk_types::Error;

    fn try_from(raw: RawSyncResult) -> Result<Self, Self::Error> {
        let result = SyncResult::from_outcomes(raw.client, raw.outcomes);
        if let Some(dup) = result.outcomes.windows(2).find(|w| w[0].path == w[1].path) {
            return Err(kvdesk_types::Error::DuplicatePath(dup[0].path.to_string()));
        }
        Ok(result)
    }
}

impl SyncResult {
    /// Builds a result, ordering outcomes by path.
    pub fn from_outcomes(client: ConsulClient, mut outcomes: Vec<ApplyOutcome>) -> Self {
        outcomes.sort_by(|a, b| a.path.cmp(&b.path));
        let mut counts = OutcomeCounts::default();
        for outcome in &outcomes {
            counts.record(&outcome.status);
        }
        Self {
            client,
            counts,
            outcomes,
        }
    }

    /// A result for a save with nothing to do.
    pub fn empty(client: ConsulClient) -> Self {
        Self::from_outcomes(client, Vec::new())
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&ApplyOutcome> {
        self.outcomes
            .binary_search_by(|o| o.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.outcomes[i])
    }

    /// True when every entry was applied or already in place.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|o| o.status.is_success())
    }

    /// Entries skipped because of concurrent changes.
    pub fn conflicts(&self) -> impl Iterator<Item = &ApplyOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_conflict())
    }

    /// Entries whose write failed.
    pub fn failures(&self) -> impl Iterator<Item = &ApplyOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Failed { .. }))
    }
}
