use kvdesk_cli::commands::{self, CommandResponse};
use kvdesk_registry::{ClientRegistry, RegistryConfig};
use kvdesk_sync::store::{ConsulStoreConfig, MemoryConnector};
use kvdesk_sync::{OutcomeStatus, SyncConfig, SyncEngine};
use kvdesk_types::{ConsulClient, Host, KeyPath, Port, Scheme};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn memory_engine() -> (SyncEngine, Arc<MemoryConnector>) {
    let connector = Arc::new(MemoryConnector::new());
    (
        SyncEngine::new(connector.clone(), SyncConfig::default()),
        connector,
    )
}

fn local_client() -> ConsulClient {
    ConsulClient::new(
        Host::new("localhost").unwrap(),
        Port::new(8500).unwrap(),
        Scheme::Http,
    )
    .with_name("local")
}

fn key(p: &str) -> KeyPath {
    KeyPath::parse(p).unwrap()
}

// ── Response envelope ────────────────────────────────────────────

#[test]
fn ok_envelope_shape() {
    let response = CommandResponse::ok(vec![1, 2]);
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({ "ok": true, "data": [1, 2] })
    );
}

#[test]
fn err_envelope_shape() {
    let response: CommandResponse<()> =
        CommandResponse::err(commands::CommandError::new("auth_error", "denied"));
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({ "ok": false, "error": { "code": "auth_error", "message": "denied" } })
    );
    assert!(!response.is_ok());
}

// ── get_values ───────────────────────────────────────────────────

#[tokio::test]
async fn get_values_returns_nested_tree() {
    let (engine, connector) = memory_engine();
    let store = connector.store(&local_client());
    store.put(&key("app/name"), "demo");
    store.put(&key("app/db/host"), "pg");

    let response = commands::get_values(&engine, json!({ "consul_client": local_client() })).await;
    let data = response.into_result().unwrap();

    assert_eq!(
        serde_json::Value::Object(data),
        json!({ "app": { "name": "demo", "db": { "host": "pg" } } })
    );
}

#[tokio::test]
async fn get_values_rejects_malformed_client() {
    let (engine, _) = memory_engine();
    let payload = json!({ "consul_client": { "host": "localhost", "port": 0, "scheme": "HTTP" } });

    let error = commands::get_values(&engine, payload)
        .await
        .into_result()
        .unwrap_err();
    assert_eq!(error.code, "invalid_input");
}

#[tokio::test]
async fn get_values_reports_unrepresentable_tree() {
    let (engine, connector) = memory_engine();
    let store = connector.store(&local_client());
    store.put(&key("a"), "leaf");
    store.put(&key("a/b"), "child");

    let error = commands::get_values(&engine, json!({ "consul_client": local_client() }))
        .await
        .into_result()
        .unwrap_err();
    assert_eq!(error.code, "invalid_tree");
}

#[tokio::test]
async fn get_values_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/"))
        .and(query_param("recurse", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "Key": "svc/port", "Value": "ODA4MA==", "ModifyIndex": 5 },
        ])))
        .mount(&server)
        .await;

    let client = ConsulClient::new(
        Host::new("127.0.0.1").unwrap(),
        Port::new(u32::from(server.address().port())).unwrap(),
        Scheme::Http,
    );
    let engine = SyncEngine::with_consul(ConsulStoreConfig::default(), SyncConfig::default());

    let data = commands::get_values(&engine, json!({ "consul_client": client }))
        .await
        .into_result()
        .unwrap();
    assert_eq!(serde_json::Value::Object(data), json!({ "svc": { "port": "8080" } }));
}

#[tokio::test]
async fn get_values_auth_failure_has_stable_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Permission denied"))
        .mount(&server)
        .await;

    let client = ConsulClient::new(
        Host::new("127.0.0.1").unwrap(),
        Port::new(u32::from(server.address().port())).unwrap(),
        Scheme::Http,
    );
    let engine = SyncEngine::with_consul(ConsulStoreConfig::default(), SyncConfig::default());

    let error = commands::get_values(&engine, json!({ "consul_client": client }))
        .await
        .into_result()
        .unwrap_err();
    assert_eq!(error.code, "auth_error");
}

// ── save_values ──────────────────────────────────────────────────

#[tokio::test]
async fn save_values_applies_and_reports_per_key() {
    let (engine, connector) = memory_engine();
    let store = connector.store(&local_client());
    store.put(&key("a"), "1");
    store.put(&key("b"), "9");

    let payload = json!({
        "consul_client": local_client(),
        "initial_values": { "a": "1", "b": "2" },
        "new_values": { "a": "1", "b": "3", "c": "4" },
    });
    let data = commands::save_values(&engine, payload)
        .await
        .into_result()
        .unwrap();

    assert_eq!(data.result.outcomes.len(), 2);
    assert_eq!(
        data.result.get("b").unwrap().status,
        OutcomeStatus::SkippedStale
    );
    assert_eq!(data.result.get("c").unwrap().status, OutcomeStatus::Applied);
    assert_eq!(
        serde_json::Value::Object(data.values),
        json!({ "a": "1", "b": "3", "c": "4" })
    );
    assert_eq!(store.snapshot().value("c"), Some("4"));
}

#[tokio::test]
async fn save_values_rejects_arrays() {
    let (engine, connector) = memory_engine();
    let payload = json!({
        "consul_client": local_client(),
        "initial_values": {},
        "new_values": { "list": ["x"] },
    });

    let error = commands::save_values(&engine, payload)
        .await
        .into_result()
        .unwrap_err();
    assert_eq!(error.code, "invalid_tree");
    assert_eq!(connector.store(&local_client()).writes_attempted(), 0);
}

#[tokio::test]
async fn save_values_rejects_non_object_root() {
    let (engine, _) = memory_engine();
    let payload = json!({
        "consul_client": local_client(),
        "initial_values": "not a tree",
        "new_values": {},
    });

    let response = commands::save_values(&engine, payload).await;
    assert!(!response.is_ok());
}

#[tokio::test]
async fn save_values_unreachable_is_error_envelope() {
    let (engine, connector) = memory_engine();
    connector.store(&local_client()).set_offline(true);

    let payload = json!({
        "consul_client": local_client(),
        "initial_values": {},
        "new_values": { "a": "1" },
    });
    let response = commands::save_values(&engine, payload).await;
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["ok"], json!(false));
    assert_eq!(json["error"]["code"], json!("connection_error"));
}

// ── preview_values ───────────────────────────────────────────────

#[tokio::test]
async fn preview_values_writes_nothing() {
    let (engine, connector) = memory_engine();
    connector.store(&local_client()).put(&key("a"), "1");

    let payload = json!({
        "consul_client": local_client(),
        "initial_values": { "a": "1" },
        "new_values": {},
    });
    let classified = commands::preview_values(&engine, payload)
        .await
        .into_result()
        .unwrap();

    assert_eq!(classified.len(), 1);
    assert!(classified.is_clean());
    assert_eq!(connector.store(&local_client()).snapshot().value("a"), Some("1"));
}

// ── list_clients ─────────────────────────────────────────────────

#[test]
fn list_clients_reads_registry() {
    let dir = TempDir::new().unwrap();
    let config = RegistryConfig::in_dir(dir.path());
    let mut registry = ClientRegistry::open(config.clone()).unwrap();
    registry.upsert(local_client()).unwrap();

    let clients = commands::list_clients(&config).into_result().unwrap();
    assert_eq!(clients, vec![local_client()]);
    assert_eq!(clients[0].name, "local");
}

#[test]
fn list_clients_without_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let clients = commands::list_clients(&RegistryConfig::in_dir(dir.path()))
        .into_result()
        .unwrap();
    assert!(clients.is_empty());
}

#[test]
fn list_clients_corrupt_file_is_registry_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("servers.json"), "[{").unwrap();

    let error = commands::list_clients(&RegistryConfig::in_dir(dir.path()))
        .into_result()
        .unwrap_err();
    assert_eq!(error.code, "registry_error");
}
