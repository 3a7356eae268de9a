//! Core type definitions for kvdesk.
//!
//! This crate defines the validated types shared by the sync engine, the
//! client registry and the boundary layer:
//! - Key paths (slash-delimited, validated once at the boundary)
//! - Key entries carrying an opaque store-assigned version token
//! - Immutable tree snapshots, ordered by path
//! - Consul endpoints (`host`, `port`, `scheme`)
//!
//! Everything downstream of this crate operates on validated values only.

mod client;
mod entry;
mod path;
mod snapshot;

pub use client::{ConsulClient, Host, Port, Scheme};
pub use entry::{KeyEntry, VersionToken};
pub use path::KeyPath;
pub use snapshot::TreeSnapshot;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while validating or converting types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid key path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("invalid port {0}: must be between 1 and 65535")]
    InvalidPort(u32),

    #[error("invalid host {0:?}")]
    InvalidHost(String),

    #[error("invalid scheme {0:?}: expected HTTP or HTTPS")]
    InvalidScheme(String),

    #[error("duplicate key path: {0}")]
    DuplicatePath(String),

    #[error("invalid tree: {0}")]
    InvalidTree(String),
}
