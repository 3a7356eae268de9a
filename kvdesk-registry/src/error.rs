//! Error types for the client registry.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur while reading or writing the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Filesystem failure on the registry file or its directory.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The registry file is not a valid list of endpoints.
    #[error("malformed registry file {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An entry failed validation.
    #[error("invalid endpoint: {0}")]
    Invalid(#[from] kvdesk_types::Error),

    /// No home directory to derive the default location from.
    #[error("could not determine the home directory")]
    HomeDirUnavailable,
}

impl RegistryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
