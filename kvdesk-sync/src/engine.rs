//! Sync engine: reads, diffs, classifies and applies.
//!
//! The engine holds no per-server state. Each call opens a store through
//! its connector, so runs against different servers never share anything.

use crate::apply::ApplyCoordinator;
use crate::conflict::{ClassifiedDelta, classify};
use crate::diff::diff;
use crate::error::{Result, SyncError};
use crate::outcome::SyncResult;
use crate::store::{ConsulConnector, ConsulStoreConfig, KvStore, StoreConnector};
use kvdesk_types::{ConsulClient, TreeSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Deadline for each store call (ms).
    pub request_timeout_ms: u64,
    /// Upper bound on writes in flight at once.
    pub max_concurrent_writes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            max_concurrent_writes: 8,
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Orchestrates one read or save against a chosen server.
pub struct SyncEngine {
    connector: Arc<dyn StoreConnector>,
    config: SyncConfig,
    coordinator: ApplyCoordinator,
}

impl SyncEngine {
    /// Creates an engine over an arbitrary store connector.
    pub fn new(connector: Arc<dyn StoreConnector>, config: SyncConfig) -> Self {
        let coordinator = ApplyCoordinator::new(&config);
        Self {
            connector,
            config,
            coordinator,
        }
    }

    /// Creates an engine talking to Consul over HTTP.
    ///
    /// The HTTP client deadline follows `config.request_timeout_ms`; the
    /// value in `store_config` is overridden.
    pub fn with_consul(mut store_config: ConsulStoreConfig, config: SyncConfig) -> Self {
        store_config.request_timeout_ms = config.request_timeout_ms;
        Self::new(Arc::new(ConsulConnector::new(store_config)), config)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Reads the full tree of `client`.
    pub async fn get_values(&self, client: &ConsulClient) -> Result<TreeSnapshot> {
        let store = self.connector.connect(client)?;
        self.read_live(store.as_ref()).await
    }

    /// Classifies the edits against the live tree without writing anything.
    pub async fn preview(
        &self,
        client: &ConsulClient,
        initial: &TreeSnapshot,
        edited: &TreeSnapshot,
    ) -> Result<ClassifiedDelta> {
        warn_on_foreign_source(client, initial);
        let delta = diff(initial, edited);
        if delta.is_empty() {
            return Ok(ClassifiedDelta::default());
        }
        let store = self.connector.connect(client)?;
        let live = self.read_live(store.as_ref()).await?;
        Ok(classify(&delta, &live))
    }

    /// Pushes the edits made between `initial` and `edited` to `client`.
    pub async fn save_values(
        &self,
        client: &ConsulClient,
        initial: &TreeSnapshot,
        edited: &TreeSnapshot,
    ) -> Result<SyncResult> {
        self.save_values_cancellable(client, initial, edited, &CancellationToken::new())
            .await
    }

    /// Like [`save_values`](Self::save_values), stoppable through `cancel`.
    ///
    /// Cancelling before the first write returns [`SyncError::Cancelled`];
    /// cancelling later yields a result in which unstarted writes failed.
    pub async fn save_values_cancellable(
        &self,
        client: &ConsulClient,
        initial: &TreeSnapshot,
        edited: &TreeSnapshot,
        cancel: &CancellationToken,
    ) -> Result<SyncResult> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        warn_on_foreign_source(client, initial);

        let delta = diff(initial, edited);
        if delta.is_empty() {
            debug!("Nothing to save to {}", client.label());
            return Ok(SyncResult::empty(client.clone()));
        }

        let summary = delta.summary();
        info!(
            "Saving to {}: {} added, {} modified, {} removed",
            client.label(),
            summary.added,
            summary.modified,
            summary.removed
        );

        let store = self.connector.connect(client)?;
        let live = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            live = self.read_live(store.as_ref()) => live?,
        };
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let classified = classify(&delta, &live);
        Ok(self
            .coordinator
            .apply(classified, store.as_ref(), cancel)
            .await)
    }

    async fn read_live(&self, store: &dyn KvStore) -> Result<TreeSnapshot> {
        match tokio::time::timeout(self.config.request_timeout(), store.read_tree()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Reading {} timed out after {:?}",
                    store.endpoint().label(),
                    self.config.request_timeout()
                );
                Err(SyncError::Timeout)
            }
        }
    }
}

fn warn_on_foreign_source(client: &ConsulClient, initial: &TreeSnapshot) {
    if let Some(source) = initial.source()
        && source != client
    {
        warn!(
            "Snapshot was read from {} but is being saved to {}",
            source.label(),
            client.label()
        );
    }
}
