//! Client registry for kvdesk.
//!
//! The registry is the persisted list of Consul endpoints a user can pick
//! from, stored as a JSON array in `servers.json` under the application
//! directory. A missing file is an empty registry. Every mutation rewrites
//! the whole file through a temporary file and a rename, so readers never
//! see a half-written list.
//!
//! # Example
//!
//! ```no_run
//! use kvdesk_registry::{ClientRegistry, RegistryConfig};
//!
//! let registry = ClientRegistry::open(RegistryConfig::default()).unwrap();
//! for client in registry.list() {
//!     println!("{client}");
//! }
//! ```

mod error;

pub use error::{RegistryError, RegistryResult};

use kvdesk_types::ConsulClient;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory under the home directory used when none is configured.
pub const DEFAULT_APP_DIR: &str = ".kvdesk";

/// File name of the endpoint list.
pub const DEFAULT_FILE_NAME: &str = "servers.json";

/// Where the registry lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Application directory; `~/.kvdesk` when unset.
    pub app_dir: Option<PathBuf>,
    pub file_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            app_dir: None,
            file_name: DEFAULT_FILE_NAME.to_string(),
        }
    }
}

impl RegistryConfig {
    /// A config rooted at `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            app_dir: Some(dir.into()),
            ..Default::default()
        }
    }

    /// Resolves the full path of the registry file.
    pub fn resolve_path(&self) -> RegistryResult<PathBuf> {
        let dir = match &self.app_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .ok_or(RegistryError::HomeDirUnavailable)?
                .join(DEFAULT_APP_DIR),
        };
        Ok(dir.join(&self.file_name))
    }
}

/// The persisted list of known endpoints.
#[derive(Debug, Clone)]
pub struct ClientRegistry {
    path: PathBuf,
    clients: Vec<ConsulClient>,
}

impl ClientRegistry {
    /// Loads the registry described by `config`.
    pub fn open(config: RegistryConfig) -> RegistryResult<Self> {
        Self::open_path(config.resolve_path()?)
    }

    /// Loads the registry file at `path`.
    pub fn open_path(path: impl Into<PathBuf>) -> RegistryResult<Self> {
        let path = path.into();
        let clients = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| {
                RegistryError::Serialization {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No registry at {}, starting empty", path.display());
                Vec::new()
            }
            Err(e) => return Err(RegistryError::io(&path, e)),
        };

        debug!("Loaded {} endpoints from {}", clients.len(), path.display());
        Ok(Self { path, clients })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Known endpoints, in insertion order.
    pub fn list(&self) -> &[ConsulClient] {
        &self.clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Finds an endpoint by display name.
    pub fn find(&self, name: &str) -> Option<&ConsulClient> {
        self.clients.iter().find(|c| c.name == name)
    }

    /// Adds `client`, replacing an entry with the same identity, and saves.
    ///
    /// Returns `true` when an existing entry was replaced.
    pub fn upsert(&mut self, client: ConsulClient) -> RegistryResult<bool> {
        let replaced = match self.clients.iter_mut().find(|c| **c == client) {
            Some(existing) => {
                *existing = client;
                true
            }
            None => {
                self.clients.push(client);
                false
            }
        };
        self.save()?;
        Ok(replaced)
    }

    /// Removes the entry with `client`'s identity and saves.
    ///
    /// Returns `false` if no such entry existed; the file is then untouched.
    pub fn remove(&mut self, client: &ConsulClient) -> RegistryResult<bool> {
        let before = self.clients.len();
        self.clients.retain(|c| c != client);
        if self.clients.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    fn save(&self) -> RegistryResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| RegistryError::io(dir, e))?;
        }

        let json = serde_json::to_string_pretty(&self.clients).map_err(|source| {
            RegistryError::Serialization {
                path: self.path.clone(),
                source,
            }
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| RegistryError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| RegistryError::io(&self.path, e))?;

        info!("Saved {} endpoints to {}", self.clients.len(), self.path.display());
        Ok(())
    }
}
