//! Consul KV store over the HTTP API.
//!
//! Uses `/v1/kv` with `?recurse` for reads and `?cas=<ModifyIndex>` for
//! every write. `cas=0` means "only if the key does not exist".

use super::{KvStore, StoreConnector, WriteStatus};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use base64::prelude::*;
use kvdesk_types::{ConsulClient, KeyEntry, KeyPath, TreeSnapshot, VersionToken};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Consul specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsulStoreConfig {
    /// ACL token sent as `X-Consul-Token`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acl_token: Option<String>,
    /// Datacenter to address (`?dc=`); the agent's own when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    /// Deadline for a single HTTP call.
    pub request_timeout_ms: u64,
    /// Root of the tree to read. Empty reads the whole key space.
    pub kv_prefix: String,
}

impl Default for ConsulStoreConfig {
    fn default() -> Self {
        Self {
            acl_token: None,
            datacenter: None,
            request_timeout_ms: 10_000,
            kv_prefix: String::new(),
        }
    }
}

/// One element of a `GET /v1/kv/?recurse` response.
#[derive(Debug, Deserialize)]
struct KvPair {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: Option<String>,
    #[serde(rename = "ModifyIndex")]
    modify_index: u64,
}

/// Consul KV store implementation.
pub struct ConsulKvStore {
    endpoint: ConsulClient,
    config: ConsulStoreConfig,
    client: Client,
}

impl ConsulKvStore {
    /// Creates a store for `endpoint`.
    pub fn new(endpoint: ConsulClient, config: ConsulStoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SyncError::Connection(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            endpoint,
            config,
            client,
        })
    }

    fn key_url(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/v1/kv/{}", self.endpoint.address(), encoded.join("/"))
    }

    fn decorate(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.config.acl_token {
            request = request.header("X-Consul-Token", token);
        }
        if let Some(dc) = &self.config.datacenter {
            request = request.query(&[("dc", dc.as_str())]);
        }
        request
    }

    /// Maps non-success statuses onto the error taxonomy.
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                SyncError::Auth(format!("{status}: {}", body.trim()))
            }
            StatusCode::PAYLOAD_TOO_LARGE => SyncError::Store {
                status: status.as_u16(),
                message: format!("value too large: {}", body.trim()),
            },
            _ => SyncError::Store {
                status: status.as_u16(),
                message: body.trim().to_string(),
            },
        })
    }

    /// Consul answers conditional writes with a bare `true` or `false`.
    async fn write_status(response: Response) -> Result<WriteStatus> {
        let response = Self::check_status(response).await?;
        let body = response.text().await?;
        match body.trim() {
            "true" => Ok(WriteStatus::Committed),
            "false" => Ok(WriteStatus::Rejected),
            other => Err(SyncError::Protocol(format!(
                "unexpected conditional write response: {other:?}"
            ))),
        }
    }

    async fn put_cas(&self, path: &KeyPath, value: &str, cas: u64) -> Result<WriteStatus> {
        debug!("PUT {} (cas={}) on {}", path, cas, self.endpoint.label());
        let request = self
            .client
            .put(self.key_url(path.as_str()))
            .query(&[("cas", cas.to_string())])
            .body(value.to_string());

        let response = self.decorate(request).send().await?;
        Self::write_status(response).await
    }

    fn decode_pair(pair: KvPair) -> Result<Option<KeyEntry>> {
        if pair.key.ends_with('/') {
            return Ok(None);
        }

        let path = match KeyPath::parse(pair.key.as_str()) {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping unaddressable key {:?}: {}", pair.key, e);
                return Ok(None);
            }
        };

        let value = match pair.value {
            Some(encoded) => {
                let bytes = BASE64_STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                    SyncError::Protocol(format!("invalid base64 value for {path}: {e}"))
                })?;
                String::from_utf8(bytes).map_err(|_| {
                    SyncError::Protocol(format!("value for {path} is not valid UTF-8"))
                })?
            }
            None => String::new(),
        };

        Ok(Some(KeyEntry::versioned(
            path,
            value,
            VersionToken::new(pair.modify_index),
        )))
    }
}

#[async_trait]
impl KvStore for ConsulKvStore {
    fn endpoint(&self) -> &ConsulClient {
        &self.endpoint
    }

    async fn read_tree(&self) -> Result<TreeSnapshot> {
        let url = self.key_url(&self.config.kv_prefix);
        debug!("Reading tree from {}", url);

        let request = self.client.get(&url).query(&[("recurse", "true")]);
        let response = self.decorate(request).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(TreeSnapshot::new().with_source(self.endpoint.clone()));
        }

        let response = Self::check_status(response).await?;
        let pairs: Vec<KvPair> = response
            .json()
            .await
            .map_err(|e| SyncError::Protocol(format!("failed to parse KV listing: {e}")))?;

        let mut entries = Vec::with_capacity(pairs.len());
        for pair in pairs {
            if let Some(entry) = Self::decode_pair(pair)? {
                entries.push(entry);
            }
        }

        let snapshot = TreeSnapshot::from_entries(entries)?;
        debug!("Read {} keys from {}", snapshot.len(), self.endpoint.label());
        Ok(snapshot.with_source(self.endpoint.clone()))
    }

    async fn create(&self, path: &KeyPath, value: &str) -> Result<WriteStatus> {
        self.put_cas(path, value, 0).await
    }

    async fn compare_and_swap(
        &self,
        path: &KeyPath,
        value: &str,
        expected: VersionToken,
    ) -> Result<WriteStatus> {
        self.put_cas(path, value, expected.index()).await
    }

    async fn compare_and_delete(
        &self,
        path: &KeyPath,
        expected: VersionToken,
    ) -> Result<WriteStatus> {
        debug!("DELETE {} (cas={}) on {}", path, expected, self.endpoint.label());
        let request = self
            .client
            .delete(self.key_url(path.as_str()))
            .query(&[("cas", expected.index().to_string())]);

        let response = self.decorate(request).send().await?;
        Self::write_status(response).await
    }
}

/// Connects to Consul endpoints with a shared configuration.
#[derive(Debug, Clone, Default)]
pub struct ConsulConnector {
    config: ConsulStoreConfig,
}

impl ConsulConnector {
    pub fn new(config: ConsulStoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsulStoreConfig {
        &self.config
    }
}

impl StoreConnector for ConsulConnector {
    fn connect(&self, client: &ConsulClient) -> Result<Arc<dyn KvStore>> {
        Ok(Arc::new(ConsulKvStore::new(
            client.clone(),
            self.config.clone(),
        )?))
    }
}
