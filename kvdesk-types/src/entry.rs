//! Key entries and version tokens.

use crate::KeyPath;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, store-assigned version of a key.
///
/// For Consul this is the key's `ModifyIndex`. It changes on every write
/// and is what conditional writes compare against. The engine never
/// interprets the number beyond equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(u64);

impl VersionToken {
    /// Wraps a store-assigned index.
    #[must_use]
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One key/value pair of a tree.
///
/// `version` is `None` for entries that did not come from the store (for
/// example a tree edited in the UI), and for keys that do not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub path: KeyPath,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionToken>,
}

impl KeyEntry {
    /// Creates an entry with no version token.
    pub fn new(path: KeyPath, value: impl Into<String>) -> Self {
        Self {
            path,
            value: value.into(),
            version: None,
        }
    }

    /// Creates an entry carrying the store's version token.
    pub fn versioned(path: KeyPath, value: impl Into<String>, version: VersionToken) -> Self {
        Self {
            path,
            value: value.into(),
            version: Some(version),
        }
    }

    /// Returns true if both entries hold the same value, ignoring tokens.
    #[must_use]
    pub fn same_value(&self, other: &KeyEntry) -> bool {
        self.value == other.value
    }
}
