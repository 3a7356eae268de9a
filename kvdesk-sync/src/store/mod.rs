//! Store abstraction.
//!
//! The engine talks to a key/value store through [`KvStore`], which only
//! needs a consistent whole-tree read and three conditional writes. The
//! conflict resolution itself is the store's conditional-write primitive.

pub mod consul;
pub mod memory;

pub use consul::{ConsulConnector, ConsulKvStore, ConsulStoreConfig};
pub use memory::{MemoryConnector, MemoryKvStore};

use crate::error::Result;
use async_trait::async_trait;
use kvdesk_types::{ConsulClient, KeyPath, TreeSnapshot, VersionToken};
use std::sync::Arc;

/// Outcome of a conditional write that reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The store accepted the write.
    Committed,
    /// The store's current state did not match the expectation.
    Rejected,
}

/// A key/value store supporting conditional writes.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// The endpoint this store addresses.
    fn endpoint(&self) -> &ConsulClient;

    /// Reads the whole tree in one consistent request.
    async fn read_tree(&self) -> Result<TreeSnapshot>;

    /// Writes `value` only if `path` does not exist.
    async fn create(&self, path: &KeyPath, value: &str) -> Result<WriteStatus>;

    /// Writes `value` only if the key's version is still `expected`.
    async fn compare_and_swap(
        &self,
        path: &KeyPath,
        value: &str,
        expected: VersionToken,
    ) -> Result<WriteStatus>;

    /// Deletes the key only if its version is still `expected`.
    async fn compare_and_delete(&self, path: &KeyPath, expected: VersionToken)
        -> Result<WriteStatus>;
}

/// Opens a store for a given endpoint.
pub trait StoreConnector: Send + Sync {
    fn connect(&self, client: &ConsulClient) -> Result<Arc<dyn KvStore>>;
}
