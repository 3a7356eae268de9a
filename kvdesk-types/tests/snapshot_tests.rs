use kvdesk_types::{
    ConsulClient, Error, Host, KeyEntry, KeyPath, Port, Scheme, TreeSnapshot, VersionToken,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn path(p: &str) -> KeyPath {
    KeyPath::parse(p).unwrap()
}

// ── Construction ──────────────────────────────────────────────────

#[test]
fn empty_snapshot() {
    let snap = TreeSnapshot::new();
    assert!(snap.is_empty());
    assert_eq!(snap.len(), 0);
    assert!(snap.source().is_none());
}

#[test]
fn from_values_orders_by_path() {
    let snap = TreeSnapshot::from_values([("b", "2"), ("a/x", "1"), ("a", "0")]).unwrap();
    let paths: Vec<&str> = snap.paths().map(KeyPath::as_str).collect();
    assert_eq!(paths, vec!["a", "a/x", "b"]);
}

#[test]
fn from_entries_rejects_duplicate_path() {
    let result = TreeSnapshot::from_entries([
        KeyEntry::new(path("a"), "1"),
        KeyEntry::new(path("a"), "2"),
    ]);
    assert_eq!(result, Err(Error::DuplicatePath("a".to_string())));
}

#[test]
fn from_values_rejects_invalid_path() {
    assert!(TreeSnapshot::from_values([("a/", "1")]).is_err());
}

#[test]
fn lookup_by_str() {
    let snap = TreeSnapshot::from_entries([KeyEntry::versioned(path("a/b"), "v", VersionToken::new(7))])
        .unwrap();
    assert_eq!(snap.value("a/b"), Some("v"));
    assert_eq!(snap.get("a/b").unwrap().version, Some(VersionToken::new(7)));
    assert!(snap.contains("a/b"));
    assert!(!snap.contains("a"));
}

#[test]
fn with_and_without_produce_new_snapshots() {
    let base = TreeSnapshot::from_values([("a", "1")]).unwrap();
    let grown = base.clone().with_entry(KeyEntry::new(path("b"), "2"));
    let shrunk = grown.clone().without(&path("a"));

    assert_eq!(base.len(), 1);
    assert_eq!(grown.len(), 2);
    assert_eq!(shrunk.len(), 1);
    assert_eq!(shrunk.value("b"), Some("2"));
}

#[test]
fn source_tagging() {
    let client = ConsulClient::new(
        Host::new("localhost").unwrap(),
        Port::new(8500).unwrap(),
        Scheme::Http,
    );
    let snap = TreeSnapshot::new().with_source(client.clone());
    assert_eq!(snap.source(), Some(&client));
}

#[test]
fn same_values_ignores_tokens() {
    let a = TreeSnapshot::from_entries([KeyEntry::versioned(path("k"), "v", VersionToken::new(1))])
        .unwrap();
    let b = TreeSnapshot::from_entries([KeyEntry::versioned(path("k"), "v", VersionToken::new(9))])
        .unwrap();
    let c = TreeSnapshot::from_values([("k", "other")]).unwrap();

    assert!(a.same_values(&b));
    assert!(!a.same_values(&c));
}

// ── Nested JSON ───────────────────────────────────────────────────

#[test]
fn flatten_nested_json() {
    let json = json!({
        "key1": "value1",
        "key2": { "key3": "value3", "deeper": { "key4": "value4" } }
    });
    let snap = TreeSnapshot::from_nested_value(&json).unwrap();

    assert_eq!(snap.len(), 3);
    assert_eq!(snap.value("key1"), Some("value1"));
    assert_eq!(snap.value("key2/key3"), Some("value3"));
    assert_eq!(snap.value("key2/deeper/key4"), Some("value4"));
}

#[test]
fn flatten_ignores_empty_objects() {
    let json = json!({ "empty": {}, "a": "1" });
    let snap = TreeSnapshot::from_nested_value(&json).unwrap();
    assert_eq!(snap.len(), 1);
}

#[test]
fn flatten_rejects_arrays() {
    let json = json!({ "a": { "b": ["x"] } });
    let err = TreeSnapshot::from_nested_value(&json).unwrap_err();
    assert!(matches!(err, Error::InvalidTree(msg) if msg.contains("a/b")));
}

#[test]
fn flatten_rejects_non_string_leaves() {
    let json = json!({ "port": 8080 });
    let err = TreeSnapshot::from_nested_value(&json).unwrap_err();
    assert!(err.to_string().contains("not a string"));
}

#[test]
fn flatten_rejects_non_object_root() {
    assert!(TreeSnapshot::from_nested_value(&json!("x")).is_err());
}

#[test]
fn flatten_detects_duplicates_from_slashed_keys() {
    let json = json!({ "a/b": "1", "a": { "b": "2" } });
    assert!(matches!(
        TreeSnapshot::from_nested_value(&json),
        Err(Error::DuplicatePath(_))
    ));
}

#[test]
fn expand_to_nested_json() {
    let snap = TreeSnapshot::from_values([("a/b", "1"), ("a/c", "2"), ("d", "3")]).unwrap();
    let nested = snap.to_nested_json().unwrap();
    assert_eq!(
        serde_json::Value::Object(nested),
        json!({ "a": { "b": "1", "c": "2" }, "d": "3" })
    );
}

#[test]
fn expand_rejects_leaf_with_children() {
    let snap = TreeSnapshot::from_values([("a", "1"), ("a/b", "2")]).unwrap();
    assert!(matches!(snap.to_nested_json(), Err(Error::InvalidTree(_))));
}

#[test]
fn nested_json_roundtrip_preserves_values() {
    let json = json!({ "svc": { "web": { "port": "80", "host": "h" } }, "flag": "on" });
    let snap = TreeSnapshot::from_nested_value(&json).unwrap();
    let back = serde_json::Value::Object(snap.to_nested_json().unwrap());
    assert_eq!(back, json);
}

// ── Serde ─────────────────────────────────────────────────────────

#[test]
fn serde_rejects_duplicate_entries() {
    let json = r#"{"entries":[{"path":"a","value":"1"},{"path":"a","value":"2"}]}"#;
    assert!(serde_json::from_str::<TreeSnapshot>(json).is_err());
}

#[test]
fn serde_keeps_tokens() {
    let snap = TreeSnapshot::from_entries([KeyEntry::versioned(path("a"), "1", VersionToken::new(42))])
        .unwrap();
    let json = serde_json::to_string(&snap).unwrap();
    let back: TreeSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snap);
    assert_eq!(back.get("a").unwrap().version, Some(VersionToken::new(42)));
}
