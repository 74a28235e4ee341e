//! Value-preserving merge
//!
//! Merging fills gaps: content already present in the target is kept, and
//! only keys the target lacks (or holds empty) are taken from the incoming
//! snapshot. Lists are never merged element-wise.

use crate::arena::{NodeCell, NodeId};
use crate::error::Result;
use crate::shape::Shape;
use crate::tree::TreeShared;
use crate::value::NodeValue;

/// Merge `incoming` into the node at `id`
///
/// The caller holds `cell`'s guard; child guards are taken on the way down.
pub(crate) fn merge_into(tree: &TreeShared, id: NodeId, cell: &NodeCell, incoming: &Shape) -> Result<()> {
    if matches!(incoming, Shape::Null) {
        return Ok(());
    }
    let current = cell.value();
    if current.is_empty() {
        let old = cell.swap_value(tree.variant_from_shape(id, incoming));
        tree.release(&old);
        return Ok(());
    }

    let (NodeValue::Map(_), Shape::Map(entries)) = (&*current, incoming) else {
        // scalars and lists already holding data win
        return Ok(());
    };

    for (key, shape) in entries {
        if matches!(shape, Shape::Null) {
            continue;
        }
        match current.child(key) {
            Some(child_id) => {
                let Some(child) = tree.arena().get(child_id) else {
                    continue;
                };
                let _guard = child.lock();
                merge_into(tree, child_id, &child, shape)?;
            }
            None => {
                let (child_id, child) = tree.build_shape(id, key.clone(), shape);
                if let Err(e) = current.insert(key, (child_id, &*child), false) {
                    tree.destroy(child_id);
                    return Err(e);
                }
                tracing::trace!(node = %child_id, parent = %id, key = %key, "merged new child");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::node::TreeNode;
    use crate::tree::Tree;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn merged(target: serde_json::Value, source: serde_json::Value) -> serde_json::Value {
        let target = Tree::from_json(target).root();
        let source = Tree::from_json(source).root();
        target.merge_from(&source).unwrap();
        target.get()
    }

    #[test]
    fn existing_values_take_precedence() {
        assert_eq!(merged(json!({"x": 1}), json!({"x": 2, "y": 3})), json!({"x": 1, "y": 3}));
    }

    #[test]
    fn nested_maps_fill_gaps() {
        assert_eq!(
            merged(
                json!({"db": {"host": "local"}}),
                json!({"db": {"host": "remote", "port": 5432}, "debug": false})
            ),
            json!({"db": {"host": "local", "port": 5432}, "debug": false})
        );
    }

    #[test]
    fn lists_are_not_merged() {
        assert_eq!(merged(json!({"l": [1]}), json!({"l": [2, 3]})), json!({"l": [1]}));
    }

    #[test]
    fn empty_existing_child_is_replaced() {
        assert_eq!(merged(json!({"a": "", "b": {}}), json!({"a": "set", "b": {"c": 1}})), json!({"a": "set", "b": {"c": 1}}));
    }

    #[test]
    fn mismatched_variants_keep_existing() {
        assert_eq!(merged(json!({"a": 1}), json!({"a": {"b": 2}})), json!({"a": 1}));
    }
}
