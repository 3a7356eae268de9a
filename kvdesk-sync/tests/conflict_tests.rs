use kvdesk_sync::{Classification, ClassifiedDelta, classify, diff};
use kvdesk_types::{KeyEntry, KeyPath, TreeSnapshot, VersionToken};
use pretty_assertions::assert_eq;

fn tree(pairs: &[(&str, &str)]) -> TreeSnapshot {
    TreeSnapshot::from_values(pairs.iter().copied()).unwrap()
}

fn classification_of(
    initial: &[(&str, &str)],
    edited: &[(&str, &str)],
    live: &[(&str, &str)],
    key: &str,
) -> Classification {
    let delta = diff(&tree(initial), &tree(edited));
    let classified = classify(&delta, &tree(live));
    classified.get(key).unwrap().classification
}

// ── Added ────────────────────────────────────────────────────────

#[test]
fn added_absent_live_is_safe() {
    assert_eq!(
        classification_of(&[], &[("a", "1")], &[], "a"),
        Classification::Safe
    );
}

#[test]
fn added_same_live_value_is_already_satisfied() {
    assert_eq!(
        classification_of(&[], &[("a", "1")], &[("a", "1")], "a"),
        Classification::AlreadySatisfied
    );
}

#[test]
fn added_different_live_value_is_stale() {
    assert_eq!(
        classification_of(&[], &[("a", "1")], &[("a", "other")], "a"),
        Classification::Stale
    );
}

// ── Modified ─────────────────────────────────────────────────────

#[test]
fn modified_unchanged_live_is_safe() {
    assert_eq!(
        classification_of(&[("a", "1")], &[("a", "2")], &[("a", "1")], "a"),
        Classification::Safe
    );
}

#[test]
fn modified_concurrently_changed_is_stale() {
    assert_eq!(
        classification_of(&[("a", "1")], &[("a", "2")], &[("a", "3")], "a"),
        Classification::Stale
    );
}

#[test]
fn modified_deleted_upstream() {
    assert_eq!(
        classification_of(&[("a", "1")], &[("a", "2")], &[], "a"),
        Classification::DeletedUpstream
    );
}

// ── Removed ──────────────────────────────────────────────────────

#[test]
fn removed_unchanged_live_is_safe() {
    assert_eq!(
        classification_of(&[("a", "1")], &[], &[("a", "1")], "a"),
        Classification::Safe
    );
}

#[test]
fn removed_already_gone_is_already_satisfied() {
    assert_eq!(
        classification_of(&[("a", "1")], &[], &[], "a"),
        Classification::AlreadySatisfied
    );
}

#[test]
fn removed_concurrently_changed_is_stale() {
    assert_eq!(
        classification_of(&[("a", "1")], &[], &[("a", "2")], "a"),
        Classification::Stale
    );
}

// ── Aggregate ────────────────────────────────────────────────────

#[test]
fn classified_delta_keeps_order_and_live_entries() {
    let initial = tree(&[("a", "1"), ("b", "1"), ("c", "1")]);
    let edited = tree(&[("a", "2"), ("b", "2"), ("c", "2")]);
    let live = TreeSnapshot::from_entries([
        KeyEntry::versioned(KeyPath::parse("a").unwrap(), "1", VersionToken::new(10)),
        KeyEntry::versioned(KeyPath::parse("b").unwrap(), "x", VersionToken::new(11)),
    ])
    .unwrap();

    let classified = classify(&diff(&initial, &edited), &live);
    let paths: Vec<&str> = classified.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["a", "b", "c"]);

    let a = classified.get("a").unwrap();
    assert!(a.is_safe());
    assert_eq!(a.live_version(), Some(VersionToken::new(10)));

    let b = classified.get("b").unwrap();
    assert!(b.is_conflict());
    assert_eq!(b.live_value(), Some("x"));

    assert!(classified.get("c").unwrap().live.is_none());
    assert_eq!(classified.safe().count(), 1);
    assert_eq!(classified.conflicts().count(), 2);
    assert_eq!(classified.count(Classification::DeletedUpstream), 1);
    assert!(!classified.is_clean());
}

#[test]
fn every_delta_entry_gets_exactly_one_classification() {
    let initial = tree(&[("a", "1"), ("b", "1")]);
    let edited = tree(&[("b", "2"), ("c", "3")]);
    let delta = diff(&initial, &edited);

    let classified = classify(&delta, &tree(&[("a", "1"), ("b", "1"), ("c", "3")]));
    assert_eq!(classified.len(), delta.len());
    assert!(classified.is_clean());
}

// ── Serialization ────────────────────────────────────────────────

#[test]
fn deserialized_classified_delta_is_path_ordered() {
    let json = serde_json::json!({
        "entries": [
            { "path": "b", "change": { "kind": "added", "value": "2" }, "classification": "stale" },
            { "path": "a", "change": { "kind": "added", "value": "1" }, "classification": "safe" },
        ]
    });

    let classified: ClassifiedDelta = serde_json::from_value(json).unwrap();

    let paths: Vec<&str> = classified.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["a", "b"]);
    assert_eq!(classified.get("b").unwrap().classification, Classification::Stale);
    assert!(classified.get("a").unwrap().is_safe());
}

#[test]
fn deserialized_classified_delta_rejects_duplicate_paths() {
    let json = serde_json::json!({
        "entries": [
            { "path": "a", "change": { "kind": "added", "value": "1" }, "classification": "safe" },
            { "path": "a", "change": { "kind": "added", "value": "2" }, "classification": "safe" },
        ]
    });

    let err = serde_json::from_value::<ClassifiedDelta>(json).unwrap_err();
    assert!(err.to_string().contains("duplicate key path"));
}
