//! Conflict detector: classifies a delta against the live tree.
//!
//! Every entry is checked against one live snapshot, read once per save.
//! An entry is `Safe` only when the live value still equals the value the
//! edit session started from; otherwise the write is refused rather than
//! overwriting a concurrent change.

use crate::diff::{Change, Delta, DeltaEntry};
use kvdesk_types::{KeyEntry, KeyPath, TreeSnapshot, VersionToken};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Verdict for one delta entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// The live tree matches the edit's starting point; write it.
    Safe,
    /// The live value differs from the edit's starting point.
    Stale,
    /// The key the edit modified no longer exists.
    DeletedUpstream,
    /// The live tree already holds the intended state; nothing to write.
    AlreadySatisfied,
}

/// A delta entry tagged with its classification and the live state it
/// was judged against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEntry {
    pub path: KeyPath,
    pub change: Change,
    pub classification: Classification,
    /// Live entry at classification time, `None` if the key was absent.
    pub live: Option<KeyEntry>,
}

impl ClassifiedEntry {
    /// Live value at classification time.
    #[must_use]
    pub fn live_value(&self) -> Option<&str> {
        self.live.as_ref().map(|e| e.value.as_str())
    }

    /// Version token a conditional write must present.
    #[must_use]
    pub fn live_version(&self) -> Option<VersionToken> {
        self.live.as_ref().and_then(|e| e.version)
    }

    #[must_use]
    pub fn is_safe(&self) -> bool {
        self.classification == Classification::Safe
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self.classification,
            Classification::Stale | Classification::DeletedUpstream
        )
    }
}

/// A delta whose every entry has been classified, in ascending path order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawClassifiedDelta")]
pub struct ClassifiedDelta {
    entries: Vec<ClassifiedEntry>,
}

#[derive(Deserialize)]
struct RawClassifiedDelta {
    entries: Vec<ClassifiedEntry>,
}

impl TryFrom<RawClassifiedDelta> for ClassifiedDelta {
    type Error = kvdesk_types::Error;

    fn try_from(raw: RawClassifiedDelta) -> Result<Self, Self::Error> {
        let mut entries = raw.entries;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(dup) = entries.windows(2).find(|w| w[0].path == w[1].path) {
            return Err(kvdesk_types::Error::DuplicatePath(dup[0].path.to_string()));
        }
        Ok(Self { entries })
    }
}

impl ClassifiedDelta {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassifiedEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&ClassifiedEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Entries that will be written.
    pub fn safe(&self) -> impl Iterator<Item = &ClassifiedEntry> {
        self.entries.iter().filter(|e| e.is_safe())
    }

    /// Entries refused because of concurrent changes.
    pub fn conflicts(&self) -> impl Iterator<Item = &ClassifiedEntry> {
        self.entries.iter().filter(|e| e.is_conflict())
    }

    /// Number of entries with the given classification.
    #[must_use]
    pub fn count(&self, classification: Classification) -> usize {
        self.entries
            .iter()
            .filter(|e| e.classification == classification)
            .count()
    }

    /// True when nothing conflicts with the live tree.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts().next().is_none()
    }

    pub fn into_entries(self) -> Vec<ClassifiedEntry> {
        self.entries
    }
}

impl IntoIterator for ClassifiedDelta {
    type Item = ClassifiedEntry;
    type IntoIter = std::vec::IntoIter<ClassifiedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Classifies every entry of `delta` against the `live` snapshot.
#[must_use]
pub fn classify(delta: &Delta, live: &TreeSnapshot) -> ClassifiedDelta {
    let entries = delta
        .iter()
        .map(|entry| classify_entry(entry, live))
        .collect();
    ClassifiedDelta { entries }
}

fn classify_entry(entry: &DeltaEntry, live: &TreeSnapshot) -> ClassifiedEntry {
    let live_entry = live.get(entry.path.as_str());
    let live_value = live_entry.map(|e| e.value.as_str());

    let classification = match (&entry.change, live_value) {
        (Change::Added { .. }, None) => Classification::Safe,
        (Change::Added { value }, Some(current)) if current == value => {
            Classification::AlreadySatisfied
        }
        // Created concurrently by someone else.
        (Change::Added { .. }, Some(_)) => Classification::Stale,

        (Change::Modified { .. }, None) => Classification::DeletedUpstream,
        (Change::Modified { old, .. }, Some(current)) if current == old => Classification::Safe,
        (Change::Modified { .. }, Some(_)) => Classification::Stale,

        (Change::Removed { .. }, None) => Classification::AlreadySatisfied,
        (Change::Removed { old }, Some(current)) if current == old => Classification::Safe,
        (Change::Removed { .. }, Some(_)) => Classification::Stale,
    };

    debug!(
        "Classified {} ({}) as {:?}",
        entry.path,
        entry.change.label(),
        classification
    );

    ClassifiedEntry {
        path: entry.path.clone(),
        change: entry.change.clone(),
        classification,
        live: live_entry.cloned(),
    }
}
