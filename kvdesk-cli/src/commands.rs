//! Request/response command handlers.
//!
//! Each handler takes the raw JSON payload a front end sends, validates it,
//! runs the operation and wraps the answer in a [`CommandResponse`]. This is
//! the only place where untyped input becomes domain types.

use kvdesk_registry::{ClientRegistry, RegistryConfig, RegistryError};
use kvdesk_sync::{ClassifiedDelta, SyncEngine, SyncError, SyncResult};
use kvdesk_types::{ConsulClient, TreeSnapshot};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Error half of a command response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl CommandError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<SyncError> for CommandError {
    fn from(e: SyncError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<kvdesk_types::Error> for CommandError {
    fn from(e: kvdesk_types::Error) -> Self {
        let code = match e {
            kvdesk_types::Error::InvalidTree(_) => "invalid_tree",
            _ => "invalid_input",
        };
        Self::new(code, e.to_string())
    }
}

impl From<RegistryError> for CommandError {
    fn from(e: RegistryError) -> Self {
        Self::new("registry_error", e.to_string())
    }
}

/// Envelope returned by every command: `{ok: true, data}` or
/// `{ok: false, error: {code, message}}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandResponse<T> {
    Ok { ok: bool, data: T },
    Err { ok: bool, error: CommandError },
}

impl<T> CommandResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::Ok { ok: true, data }
    }

    pub fn err(error: impl Into<CommandError>) -> Self {
        Self::Err {
            ok: false,
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn into_result(self) -> Result<T, CommandError> {
        match self {
            Self::Ok { data, .. } => Ok(data),
            Self::Err { error, .. } => Err(error),
        }
    }
}

impl<T> From<Result<T, CommandError>> for CommandResponse<T> {
    fn from(result: Result<T, CommandError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetValuesRequest {
    pub consul_client: ConsulClient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveValuesRequest {
    pub consul_client: ConsulClient,
    pub initial_values: Value,
    pub new_values: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveValuesResponse {
    /// The edited tree as submitted.
    pub values: Map<String, Value>,
    pub result: SyncResult,
}

fn parse_payload<T: DeserializeOwned>(payload: Value) -> Result<T, CommandError> {
    serde_json::from_value(payload)
        .map_err(|e| CommandError::new("invalid_input", format!("malformed request: {e}")))
}

/// Reads the live tree of a server as nested JSON.
pub async fn get_values(engine: &SyncEngine, payload: Value) -> CommandResponse<Map<String, Value>> {
    run_get_values(engine, payload).await.into()
}

/// Pushes the user's edits to a server.
pub async fn save_values(engine: &SyncEngine, payload: Value) -> CommandResponse<SaveValuesResponse> {
    save_values_cancellable(engine, payload, &CancellationToken::new()).await
}

/// Like [`save_values`], stoppable through `cancel`.
pub async fn save_values_cancellable(
    engine: &SyncEngine,
    payload: Value,
    cancel: &CancellationToken,
) -> CommandResponse<SaveValuesResponse> {
    run_save_values(engine, payload, cancel).await.into()
}

/// Classifies the user's edits against the live tree without writing.
pub async fn preview_values(engine: &SyncEngine, payload: Value) -> CommandResponse<ClassifiedDelta> {
    run_preview_values(engine, payload).await.into()
}

async fn run_get_values(
    engine: &SyncEngine,
    payload: Value,
) -> Result<Map<String, Value>, CommandError> {
    let request: GetValuesRequest = parse_payload(payload)?;
    debug!("get_values for {}", request.consul_client.label());
    let snapshot = engine.get_values(&request.consul_client).await?;
    Ok(snapshot.to_nested_json()?)
}

async fn run_save_values(
    engine: &SyncEngine,
    payload: Value,
    cancel: &CancellationToken,
) -> Result<SaveValuesResponse, CommandError> {
    let request: SaveValuesRequest = parse_payload(payload)?;
    let (initial, edited) = parse_trees(&request.initial_values, &request.new_values)?;
    debug!(
        "save_values for {}: {} keys loaded, {} keys edited",
        request.consul_client.label(),
        initial.len(),
        edited.len()
    );

    let result = engine
        .save_values_cancellable(&request.consul_client, &initial, &edited, cancel)
        .await?;
    Ok(SaveValuesResponse {
        values: edited.to_nested_json()?,
        result,
    })
}

async fn run_preview_values(
    engine: &SyncEngine,
    payload: Value,
) -> Result<ClassifiedDelta, CommandError> {
    let request: SaveValuesRequest = parse_payload(payload)?;
    let (initial, edited) = parse_trees(&request.initial_values, &request.new_values)?;
    Ok(engine
        .preview(&request.consul_client, &initial, &edited)
        .await?)
}

/// Lists the endpoints known to the registry.
pub fn list_clients(config: &RegistryConfig) -> CommandResponse<Vec<ConsulClient>> {
    ClientRegistry::open(config.clone())
        .map(|registry| registry.list().to_vec())
        .map_err(CommandError::from)
        .into()
}

fn parse_trees(
    initial: &Value,
    edited: &Value,
) -> Result<(TreeSnapshot, TreeSnapshot), CommandError> {
    Ok((
        TreeSnapshot::from_nested_value(initial)?,
        TreeSnapshot::from_nested_value(edited)?,
    ))
}
