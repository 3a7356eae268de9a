//! Diff engine: computes the per-key delta between two snapshots.
//!
//! Snapshots are path-ordered by construction, so the diff is a single
//! merge pass over both key sets. Value equality decides whether a key
//! changed; version tokens are ignored so that token churn without a value
//! change never produces a write.

use kvdesk_types::{KeyEntry, KeyPath, TreeSnapshot};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::iter::Peekable;

/// How one key differs between the base and the edited snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    /// Present only in the edited snapshot.
    Added { value: String },
    /// Present only in the base snapshot.
    Removed { old: String },
    /// Present in both with different values.
    Modified { old: String, new: String },
}

impl Change {
    /// The value the edit session started from, if the key existed.
    #[must_use]
    pub fn old_value(&self) -> Option<&str> {
        match self {
            Change::Added { .. } => None,
            Change::Removed { old } | Change::Modified { old, .. } => Some(old),
        }
    }

    /// The value the edit intends to leave behind, if any.
    #[must_use]
    pub fn new_value(&self) -> Option<&str> {
        match self {
            Change::Added { value } => Some(value),
            Change::Modified { new, .. } => Some(new),
            Change::Removed { .. } => None,
        }
    }

    /// The same change seen from the other side.
    #[must_use]
    pub fn inverted(&self) -> Change {
        match self {
            Change::Added { value } => Change::Removed { old: value.clone() },
            Change::Removed { old } => Change::Added { value: old.clone() },
            Change::Modified { old, new } => Change::Modified {
                old: new.clone(),
                new: old.clone(),
            },
        }
    }

    /// Short label for logs and listings.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Change::Added { .. } => "added",
            Change::Removed { .. } => "removed",
            Change::Modified { .. } => "modified",
        }
    }
}

/// One changed key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaEntry {
    pub path: KeyPath,
    #[serde(flatten)]
    pub change: Change,
}

/// Counts of each change kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

/// The set of per-key differences between two snapshots, in ascending
/// path order. Unchanged keys are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DeltaEntry>", into = "Vec<DeltaEntry>")]
pub struct Delta {
    entries: Vec<DeltaEntry>,
}

impl TryFrom<Vec<DeltaEntry>> for Delta {
    type Error = kvdesk_types::Error;

    fn try_from(entries: Vec<DeltaEntry>) -> Result<Self, Self::Error> {
        Delta::from_entries(entries)
    }
}

impl From<Delta> for Vec<DeltaEntry> {
    fn from(delta: Delta) -> Self {
        delta.entries
    }
}

impl Delta {
    /// Builds a delta from entries in any order. A path may appear once.
    pub fn from_entries(mut entries: Vec<DeltaEntry>) -> Result<Self, kvdesk_types::Error> {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(dup) = entries.windows(2).find(|w| w[0].path == w[1].path) {
            return Err(kvdesk_types::Error::DuplicatePath(dup[0].path.to_string()));
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeltaEntry> {
        self.entries.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &KeyPath> {
        self.entries.iter().map(|e| &e.path)
    }

    /// Looks up the change for a path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Change> {
        self.entries
            .binary_search_by(|e| e.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.entries[i].change)
    }

    #[must_use]
    pub fn summary(&self) -> DeltaSummary {
        let mut summary = DeltaSummary::default();
        for entry in &self.entries {
            match entry.change {
                Change::Added { .. } => summary.added += 1,
                Change::Removed { .. } => summary.removed += 1,
                Change::Modified { .. } => summary.modified += 1,
            }
        }
        summary
    }

    /// The delta that undoes this one: `diff(b, a)` for `diff(a, b)`.
    #[must_use]
    pub fn inverted(&self) -> Delta {
        Delta {
            entries: self
                .entries
                .iter()
                .map(|e| DeltaEntry {
                    path: e.path.clone(),
                    change: e.change.inverted(),
                })
                .collect(),
        }
    }

    /// Applies the delta to a snapshot, producing a new snapshot.
    ///
    /// Written keys carry no version token; the store assigns one.
    #[must_use]
    pub fn apply_to(&self, snapshot: &TreeSnapshot) -> TreeSnapshot {
        self.entries
            .iter()
            .fold(snapshot.clone(), |acc, entry| match &entry.change {
                Change::Removed { .. } => acc.without(&entry.path),
                Change::Added { value } | Change::Modified { new: value, .. } => {
                    acc.with_entry(KeyEntry::new(entry.path.clone(), value.clone()))
                }
            })
    }

    pub fn into_entries(self) -> Vec<DeltaEntry> {
        self.entries
    }
}

impl IntoIterator for Delta {
    type Item = DeltaEntry;
    type IntoIter = std::vec::IntoIter<DeltaEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Delta {
    type Item = &'a DeltaEntry;
    type IntoIter = std::slice::Iter<'a, DeltaEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Computes the delta that turns `base` into `edited`.
///
/// Pure and deterministic: entries come out in ascending path order.
#[must_use]
pub fn diff(base: &TreeSnapshot, edited: &TreeSnapshot) -> Delta {
    let mut entries = Vec::new();
    let mut left = base.iter().peekable();
    let mut right = edited.iter().peekable();

    loop {
        match next_pair(&mut left, &mut right) {
            Some((Some(b), None)) => entries.push(DeltaEntry {
                path: b.path.clone(),
                change: Change::Removed {
                    old: b.value.clone(),
                },
            }),
            Some((None, Some(e))) => entries.push(DeltaEntry {
                path: e.path.clone(),
                change: Change::Added {
                    value: e.value.clone(),
                },
            }),
            Some((Some(b), Some(e))) => {
                if !b.same_value(e) {
                    entries.push(DeltaEntry {
                        path: b.path.clone(),
                        change: Change::Modified {
                            old: b.value.clone(),
                            new: e.value.clone(),
                        },
                    });
                }
            }
            Some((None, None)) | None => break,
        }
    }

    Delta { entries }
}

/// Advances the merge by one path, yielding the entries present at it.
fn next_pair<'a, L, R>(
    left: &mut Peekable<L>,
    right: &mut Peekable<R>,
) -> Option<(Option<&'a KeyEntry>, Option<&'a KeyEntry>)>
where
    L: Iterator<Item = &'a KeyEntry>,
    R: Iterator<Item = &'a KeyEntry>,
{
    let ordering = match (left.peek(), right.peek()) {
        (None, None) => return None,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(l), Some(r)) => l.path.cmp(&r.path),
    };

    Some(match ordering {
        Ordering::Less => (left.next(), None),
        Ordering::Greater => (None, right.next()),
        Ordering::Equal => (left.next(), right.next()),
    })
}
