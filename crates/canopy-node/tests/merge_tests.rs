//! Copy, from and merge behavior across trees

use canopy_node::prelude::*;
use canopy_test_utils::{assert_content, sample_config, sample_tree, tree_from};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn merge_keeps_existing_values() {
    let target = tree_from(json!({"x": 1})).root();
    let source = tree_from(json!({"x": 2, "y": 3})).root();
    target.merge_from(&source).unwrap();
    assert_content(&target, &json!({"x": 1, "y": 3}));
}

#[test]
fn merge_ignores_null_entries() {
    let target = tree_from(json!({"x": 1})).root();
    let source = tree_from(json!({"x": null})).root();
    target.merge_from(&source).unwrap();
    assert_content(&target, &json!({"x": 1}));
}

#[test]
fn merge_with_self_is_idempotent() {
    let root = sample_tree().root();
    root.merge_from(&root.clone()).unwrap();
    assert_content(&root, &sample_config());
}

#[test]
fn merge_into_virtual_node_copies() {
    let tree = tree_from(json!({}));
    let defaults = tree_from(json!({"retries": 3, "backoff": [1, 2, 4]})).root();
    let policy = tree.root().node(["policy"]);
    policy.merge_from(&defaults).unwrap();

    assert!(!policy.is_virtual());
    assert_content(&tree.root(), &json!({"policy": {"retries": 3, "backoff": [1, 2, 4]}}));
}

#[test]
fn merge_from_virtual_node_is_noop() {
    let root = sample_tree().root();
    let ghost = tree_from(json!({})).root().node(["ghost"]);
    root.merge_from(&ghost).unwrap();
    assert_content(&root, &sample_config());
}

#[test]
fn scalar_merge_only_fills_empty_target() {
    let root = tree_from(json!({"a": "kept", "b": ""})).root();
    let other = tree_from(json!({"a": "lost", "b": "filled"})).root();
    root.node(["a"]).merge_from(&other.node(["a"])).unwrap();
    root.node(["b"]).merge_from(&other.node(["b"])).unwrap();
    assert_content(&root, &json!({"a": "kept", "b": "filled"}));
}

#[test]
fn merged_content_is_independent_of_source() {
    let target = tree_from(json!({"a": 1})).root();
    let source = tree_from(json!({"nested": {"k": "v"}})).root();
    target.merge_from(&source).unwrap();

    source.node(["nested", "k"]).set("changed").unwrap();
    assert_eq!(target.node(["nested", "k"]).get(), json!("v"));
}

#[test]
fn from_round_trips_content() {
    let source = sample_tree().root();
    let target = tree_from(json!({"old": true})).root();
    target.from(&source).unwrap();
    assert_eq!(target.get(), source.get());
    assert!(!target.has_child(["old"]));
}

#[test]
fn from_subtree_within_same_tree() {
    let tree = sample_tree();
    let root = tree.root();
    root.node(["backup"]).from(&root.node(["service"])).unwrap();
    assert_eq!(root.node(["backup"]).get(), root.node(["service"]).get());

    root.node(["service", "port"]).set(&9090).unwrap();
    assert_eq!(root.node(["backup", "port"]).get(), json!(8080));
}

#[test]
fn from_ancestor_into_descendant() {
    let root = tree_from(json!({"a": {"b": 1}})).root();
    root.node(["a", "b"]).from(&root).unwrap();
    assert_content(&root, &json!({"a": {"b": {"a": {"b": 1}}}}));
}

#[test]
fn from_empty_source_detaches() {
    let root = tree_from(json!({"a": 1, "b": 2})).root();
    let empty = tree_from(json!({})).root().node(["none"]);
    root.node(["a"]).from(&empty).unwrap();
    assert_content(&root, &json!({"b": 2}));
}

#[test]
fn copy_is_a_detached_deep_copy() {
    let tree = sample_tree();
    let service = tree.root().node(["service"]);
    let copy = service.copy();

    assert_eq!(copy.get(), service.get());
    assert_eq!(copy.key(), service.key());
    assert_eq!(copy, service);
    assert!(copy.parent().is_none());
    assert!(!copy.same_node(&service));

    copy.node(["name"]).set("copy").unwrap();
    assert_eq!(service.node(["name"]).get(), json!("api"));
    assert_eq!(copy.config().converter().name(), tree.config().converter().name());
}

#[test]
fn copy_can_be_placed_under_its_key() {
    let source = sample_tree();
    let copy = source.root().node(["service"]).copy();

    let target = Tree::new();
    let key = copy.key().unwrap();
    target.root().node([key]).from(&copy).unwrap();
    assert_eq!(target.root().get(), json!({"service": source.root().node(["service"]).get()}));

    // a copy root has no parent, so null clears it in place
    copy.set(&()).unwrap();
    assert!(copy.is_null());
    assert!(!copy.is_virtual());
    assert_eq!(copy.key(), Some(Key::from("service")));
}

#[test]
fn copy_preserves_strict_configuration() {
    let tree = Tree::with_config(TreeConfig::strict());
    tree.root().node(["n"]).set("1").unwrap();
    let copy = tree.root().copy();
    assert!(copy.node(["n"]).get_as::<u8>().is_err());
}
