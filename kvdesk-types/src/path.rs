//! Key paths.
//!
//! A key path addresses one value in the store's flat key space. Paths are
//! slash-delimited; the hierarchy is only a naming convention, so a path
//! is valid as long as every segment is non-empty.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Path separator used by the store.
pub const SEPARATOR: char = '/';

/// A validated, slash-delimited key path.
///
/// Ordering is plain string ordering, which is what the store uses when
/// listing keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyPath(String);

impl KeyPath {
    /// Parses and validates a key path.
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(Error::InvalidPath {
                path: s,
                reason: "path is empty",
            });
        }
        if s.starts_with(SEPARATOR) {
            return Err(Error::InvalidPath {
                path: s,
                reason: "path starts with '/'",
            });
        }
        if s.ends_with(SEPARATOR) {
            return Err(Error::InvalidPath {
                path: s,
                reason: "path ends with '/' (folder keys carry no value)",
            });
        }
        if s.split(SEPARATOR).any(str::is_empty) {
            return Err(Error::InvalidPath {
                path: s,
                reason: "path contains an empty segment",
            });
        }
        Ok(Self(s))
    }

    /// Joins already-validated segments into a path.
    pub fn from_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let joined = segments.into_iter().collect::<Vec<_>>().join("/");
        Self::parse(joined)
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// Returns the last segment.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or(&self.0)
    }

    /// Returns the parent path, or `None` for a top-level key.
    #[must_use]
    pub fn parent(&self) -> Option<KeyPath> {
        self.0
            .rsplit_once(SEPARATOR)
            .map(|(parent, _)| KeyPath(parent.to_string()))
    }

    /// Returns true if `self` lies strictly below `other` in the hierarchy.
    #[must_use]
    pub fn is_descendant_of(&self, other: &KeyPath) -> bool {
        self.0.len() > other.0.len()
            && self.0.starts_with(other.as_str())
            && self.0[other.0.len()..].starts_with(SEPARATOR)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for KeyPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for KeyPath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for KeyPath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<KeyPath> for String {
    fn from(path: KeyPath) -> Self {
        path.0
    }
}

impl AsRef<str> for KeyPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for KeyPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}
