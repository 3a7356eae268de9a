//! Error types for the sync layer.
//!
//! Only call-level failures are errors. Per-key conflicts and per-key
//! store rejections are data in [`crate::SyncResult`] and never surface here.

use thiserror::Error;

/// Result type for sync operations.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Errors that can occur in sync operations.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The store could not be reached (refused, DNS, TLS, reset).
    #[error("connection error: {0}")]
    Connection(String),

    /// The store rejected our credentials.
    #[error("authentication error: {0}")]
    Auth(String),

    /// A single store call exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The store rejected a well-formed request.
    #[error("store error ({status}): {message}")]
    Store { status: u16, message: String },

    /// The store answered with something we could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The run was cancelled before any write was issued.
    #[error("sync cancelled")]
    Cancelled,

    /// Input failed boundary validation.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] kvdesk_types::Error),
}

impl SyncError {
    /// Stable machine-readable code for the boundary layer.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Connection(_) => "connection_error",
            SyncError::Auth(_) => "auth_error",
            SyncError::Timeout => "timeout_error",
            SyncError::Store { .. } => "store_error",
            SyncError::Protocol(_) => "protocol_error",
            SyncError::Cancelled => "cancelled",
            SyncError::InvalidInput(_) => "invalid_input",
        }
    }

    /// Returns true for failures that mean the store was never reached
    /// or refused us outright.
    #[must_use]
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            SyncError::Connection(_) | SyncError::Auth(_) | SyncError::Timeout
        )
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::Timeout
        } else if e.is_connect() {
            SyncError::Connection(e.to_string())
        } else if e.is_decode() {
            SyncError::Protocol(e.to_string())
        } else {
            SyncError::Connection(e.to_string())
        }
    }
}
