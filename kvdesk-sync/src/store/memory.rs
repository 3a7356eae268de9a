//! In-memory store for tests and offline runs.
//!
//! Behaves like Consul's KV endpoint: a single modify index shared by all
//! keys, bumped on every write, and `cas` semantics on every write. Tests
//! can make it slow, take it offline, or make writes to a path fail.

use super::{KvStore, StoreConnector, WriteStatus};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use kvdesk_types::{ConsulClient, KeyEntry, KeyPath, TreeSnapshot, VersionToken};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<KeyPath, (String, u64)>,
    index: u64,
    offline: bool,
    read_delay: Option<Duration>,
    write_delay: Option<Duration>,
    failing: HashMap<KeyPath, SyncError>,
    writes_attempted: usize,
}

impl MemoryState {
    fn bump(&mut self) -> u64 {
        self.index += 1;
        self.index
    }

    fn current_index(&self, path: &KeyPath) -> Option<u64> {
        self.entries.get(path).map(|(_, idx)| *idx)
    }
}

/// An in-process key/value store with Consul-style conditional writes.
#[derive(Debug)]
pub struct MemoryKvStore {
    endpoint: ConsulClient,
    state: Mutex<MemoryState>,
}

impl MemoryKvStore {
    /// Creates an empty store answering for `endpoint`.
    pub fn new(endpoint: ConsulClient) -> Self {
        Self {
            endpoint,
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unconditionally writes a key, as another client would.
    pub fn put(&self, path: &KeyPath, value: impl Into<String>) -> VersionToken {
        let mut state = self.state();
        let index = state.bump();
        state.entries.insert(path.clone(), (value.into(), index));
        VersionToken::new(index)
    }

    /// Unconditionally deletes a key, as another client would.
    pub fn remove(&self, path: &KeyPath) {
        let mut state = self.state();
        state.bump();
        state.entries.remove(path);
    }

    /// Current contents, with version tokens.
    pub fn snapshot(&self) -> TreeSnapshot {
        let state = self.state();
        state
            .entries
            .iter()
            .fold(TreeSnapshot::new(), |snap, (path, (value, idx))| {
                snap.with_entry(KeyEntry::versioned(
                    path.clone(),
                    value.clone(),
                    VersionToken::new(*idx),
                ))
            })
            .with_source(self.endpoint.clone())
    }

    /// Makes every call fail with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Delays every read by `delay`.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        self.state().read_delay = delay;
    }

    /// Delays every write by `delay`.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        self.state().write_delay = delay;
    }

    /// Makes every write to `path` fail with `error`.
    pub fn fail_writes_to(&self, path: &KeyPath, error: SyncError) {
        self.state().failing.insert(path.clone(), error);
    }

    /// Number of conditional writes that reached the store.
    pub fn writes_attempted(&self) -> usize {
        self.state().writes_attempted
    }

    /// Common preamble for writes: delay, connectivity, injected failures.
    async fn begin_write(&self, path: &KeyPath) -> Result<()> {
        let delay = self.state().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.offline {
            return Err(SyncError::Connection(format!(
                "{} is unreachable",
                self.endpoint.address()
            )));
        }
        state.writes_attempted += 1;
        match state.failing.get(path) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    fn endpoint(&self) -> &ConsulClient {
        &self.endpoint
    }

    async fn read_tree(&self) -> Result<TreeSnapshot> {
        let (delay, offline) = {
            let state = self.state();
            (state.read_delay, state.offline)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if offline {
            return Err(SyncError::Connection(format!(
                "{} is unreachable",
                self.endpoint.address()
            )));
        }
        Ok(self.snapshot())
    }

    async fn create(&self, path: &KeyPath, value: &str) -> Result<WriteStatus> {
        self.begin_write(path).await?;

        let mut state = self.state();
        if state.entries.contains_key(path) {
            return Ok(WriteStatus::Rejected);
        }
        let index = state.bump();
        state
            .entries
            .insert(path.clone(), (value.to_string(), index));
        Ok(WriteStatus::Committed)
    }

    async fn compare_and_swap(
        &self,
        path: &KeyPath,
        value: &str,
        expected: VersionToken,
    ) -> Result<WriteStatus> {
        self.begin_write(path).await?;

        let mut state = self.state();
        if state.current_index(path) != Some(expected.index()) {
            return Ok(WriteStatus::Rejected);
        }
        let index = state.bump();
        state
            .entries
            .insert(path.clone(), (value.to_string(), index));
        Ok(WriteStatus::Committed)
    }

    async fn compare_and_delete(
        &self,
        path: &KeyPath,
        expected: VersionToken,
    ) -> Result<WriteStatus> {
        self.begin_write(path).await?;

        let mut state = self.state();
        if state.current_index(path) != Some(expected.index()) {
            return Ok(WriteStatus::Rejected);
        }
        state.bump();
        state.entries.remove(path);
        Ok(WriteStatus::Committed)
    }
}

/// Hands out one shared [`MemoryKvStore`] per endpoint identity.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    stores: Mutex<HashMap<ConsulClient, Arc<MemoryKvStore>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store for `client`, created empty on first use.
    pub fn store(&self, client: &ConsulClient) -> Arc<MemoryKvStore> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        stores
            .entry(client.clone())
            .or_insert_with(|| Arc::new(MemoryKvStore::new(client.clone())))
            .clone()
    }
}

impl StoreConnector for MemoryConnector {
    fn connect(&self, client: &ConsulClient) -> Result<Arc<dyn KvStore>> {
        Ok(self.store(client))
    }
}
