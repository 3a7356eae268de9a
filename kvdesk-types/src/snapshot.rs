//! Immutable tree snapshots.
//!
//! A snapshot is a point-in-time read of a key/value tree, stored flat as
//! a path-ordered map. It is never mutated after construction; the
//! `with_*`/`without` helpers consume the snapshot and return a new one.
//!
//! The UI edits trees as nested JSON objects (`{"a": {"b": "v"}}`), so the
//! snapshot converts to and from that shape. Conversion is the boundary's
//! validation step: arrays and non-string leaves are rejected there.

use crate::{ConsulClient, Error, KeyEntry, KeyPath, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// A point-in-time key/value tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotRepr", into = "SnapshotRepr")]
pub struct TreeSnapshot {
    source: Option<ConsulClient>,
    entries: BTreeMap<KeyPath, KeyEntry>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<ConsulClient>,
    #[serde(default)]
    entries: Vec<KeyEntry>,
}

impl TryFrom<SnapshotRepr> for TreeSnapshot {
    type Error = Error;

    fn try_from(repr: SnapshotRepr) -> Result<Self> {
        let snapshot = TreeSnapshot::from_entries(repr.entries)?;
        Ok(match repr.source {
            Some(source) => snapshot.with_source(source),
            None => snapshot,
        })
    }
}

impl From<TreeSnapshot> for SnapshotRepr {
    fn from(snapshot: TreeSnapshot) -> Self {
        SnapshotRepr {
            source: snapshot.source,
            entries: snapshot.entries.into_values().collect(),
        }
    }
}

impl TreeSnapshot {
    /// Creates an empty snapshot with no source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from entries. Fails if a path appears twice.
    pub fn from_entries(entries: impl IntoIterator<Item = KeyEntry>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            match map.entry(entry.path.clone()) {
                Entry::Occupied(_) => return Err(Error::DuplicatePath(entry.path.to_string())),
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
            }
        }
        Ok(Self {
            source: None,
            entries: map,
        })
    }

    /// Builds an unversioned snapshot from `(path, value)` pairs.
    pub fn from_values<P, V>(pairs: impl IntoIterator<Item = (P, V)>) -> Result<Self>
    where
        P: AsRef<str>,
        V: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(p, v)| Ok(KeyEntry::new(KeyPath::parse(p.as_ref())?, v)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_entries(entries)
    }

    /// Tags the snapshot with the endpoint it was read from.
    #[must_use]
    pub fn with_source(mut self, source: ConsulClient) -> Self {
        self.source = Some(source);
        self
    }

    /// Returns a snapshot with `entry` inserted, replacing any entry at the same path.
    #[must_use]
    pub fn with_entry(mut self, entry: KeyEntry) -> Self {
        self.entries.insert(entry.path.clone(), entry);
        self
    }

    /// Returns a snapshot without `path`.
    #[must_use]
    pub fn without(mut self, path: &KeyPath) -> Self {
        self.entries.remove(path);
        self
    }

    /// The endpoint this snapshot was read from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&ConsulClient> {
        self.source.as_ref()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&KeyEntry> {
        self.entries.get(path)
    }

    /// Returns the value at `path`, ignoring the version token.
    #[must_use]
    pub fn value(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(|e| e.value.as_str())
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending path order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyEntry> {
        self.entries.values()
    }

    /// Paths in ascending order.
    pub fn paths(&self) -> impl Iterator<Item = &KeyPath> {
        self.entries.keys()
    }

    /// Returns true if both snapshots hold the same paths with the same
    /// values. Sources and version tokens are ignored.
    #[must_use]
    pub fn same_values(&self, other: &TreeSnapshot) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((pa, a), (pb, b))| pa == pb && a.value == b.value)
    }

    // ── Nested JSON conversion ───────────────────────────────────

    /// Flattens a nested JSON object into a snapshot.
    ///
    /// Object keys are joined with `/`. Leaves must be strings; arrays are
    /// rejected anywhere in the tree. Empty objects contribute no keys.
    pub fn from_nested_json(json: &Map<String, Value>) -> Result<Self> {
        let mut entries = Vec::new();
        flatten_into(json, &mut Vec::new(), &mut entries)?;
        Self::from_entries(entries)
    }

    /// Parses a nested JSON value, which must be an object.
    pub fn from_nested_value(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::from_nested_json(map),
            other => Err(Error::InvalidTree(format!(
                "expected a JSON object at the root, got {}",
                json_kind(other)
            ))),
        }
    }

    /// Expands the snapshot into a nested JSON object.
    ///
    /// Fails when one path is both a value and a prefix of another path
    /// (`a` and `a/b`), which nested JSON cannot express.
    pub fn to_nested_json(&self) -> Result<Map<String, Value>> {
        let mut root = Map::new();
        for entry in self.entries.values() {
            insert_nested(&mut root, &entry.path, &entry.value)?;
        }
        Ok(root)
    }
}

fn flatten_into(
    json: &Map<String, Value>,
    prefix: &mut Vec<String>,
    out: &mut Vec<KeyEntry>,
) -> Result<()> {
    for (key, value) in json {
        prefix.push(key.clone());
        match value {
            Value::Object(child) => flatten_into(child, prefix, out)?,
            Value::String(s) => {
                let path = KeyPath::parse(prefix.join("/"))?;
                out.push(KeyEntry::new(path, s.clone()));
            }
            Value::Array(_) => {
                return Err(Error::InvalidTree(format!(
                    "array at {} (arrays are not supported)",
                    prefix.join("/")
                )));
            }
            other => {
                return Err(Error::InvalidTree(format!(
                    "value for key {} is not a string ({})",
                    prefix.join("/"),
                    json_kind(other)
                )));
            }
        }
        prefix.pop();
    }
    Ok(())
}

fn insert_nested(root: &mut Map<String, Value>, path: &KeyPath, value: &str) -> Result<()> {
    let segments: Vec<&str> = path.segments().collect();
    let (leaf, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Ok(()),
    };

    let mut current = root;
    for segment in parents {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match slot {
            Value::Object(map) => map,
            _ => {
                return Err(Error::InvalidTree(format!(
                    "{path} is nested under a key that already holds a value"
                )));
            }
        };
    }

    if current.contains_key(*leaf) {
        return Err(Error::InvalidTree(format!(
            "{path} holds a value and also has child keys"
        )));
    }
    current.insert(leaf.to_string(), Value::String(value.to_string()));
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
