//! Testing utilities for the Canopy workspace
//!
//! Shared fixtures and assertions for node tree integration tests.

#![allow(missing_docs)]

use std::sync::Once;

use canopy_node::prelude::*;
use serde_json::{json, Value as JsonValue};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test subscriber once; filter with `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn tree_from(value: JsonValue) -> Tree {
    init_tracing();
    Tree::from_json(value)
}

/// Small service configuration used across tests
pub fn sample_config() -> JsonValue {
    json!({
        "service": {
            "name": "api",
            "port": 8080,
            "tags": ["blue", "edge"],
        },
        "debug": false,
    })
}

pub fn sample_tree() -> Tree {
    tree_from(sample_config())
}

/// Assert that `node` holds exactly `expected`
#[track_caller]
pub fn assert_content(node: &Node, expected: &JsonValue) {
    let actual = node.get();
    assert_eq!(&actual, expected, "content mismatch at '{}'", node.path());
}

/// Assert that every prefix of `path` resolves to a real node
#[track_caller]
pub fn assert_materialized(root: &Node, path: &[&str]) {
    for depth in 1..=path.len() {
        let prefix = &path[..depth];
        assert!(root.has_child(prefix.iter().copied()), "'{}' is not materialized", prefix.join("."));
    }
}
