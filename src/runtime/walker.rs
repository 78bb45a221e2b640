//! The traversal family over a [`WanoTree`].
//!
//! Every walker classifies nodes as dict-like, list-like or leaf through
//! [`kind_of`], which looks through switches to their active alternative.

use crate::error::Result;
use crate::nodes::{Node, NodeData, NodeId, NodeKind};
use crate::runtime::tree::{child_path, WanoTree};
use serde_json::{Map, Value};

pub fn kind_of(tree: &WanoTree, id: NodeId) -> NodeKind {
    match &tree.node(id).data {
        NodeData::Dict(_) => NodeKind::Dict,
        NodeData::List(_) | NodeData::MultipleOf(_) => NodeKind::List,
        NodeData::Switch(s) => match s.active_node() {
            Some(active) => kind_of(tree, active),
            None => NodeKind::Leaf,
        },
        NodeData::Leaf(_) | NodeData::Choice(_) | NodeData::None => NodeKind::Leaf,
    }
}

/// Children in walk order, as `(segment, id)`. Display-only nodes are
/// skipped and a switch yields its active alternative's children.
fn walk_children(tree: &WanoTree, id: NodeId) -> Vec<(String, NodeId)> {
    match &tree.node(id).data {
        NodeData::Dict(map) => map
            .iter()
            .filter(|(_, child)| !matches!(tree.node(**child).data, NodeData::None))
            .map(|(name, child)| (name.clone(), *child))
            .collect(),
        NodeData::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, child)| (i.to_string(), *child))
            .collect(),
        NodeData::MultipleOf(m) => m
            .instances
            .iter()
            .enumerate()
            .map(|(i, child)| (i.to_string(), *child))
            .collect(),
        NodeData::Switch(s) => s
            .active_node()
            .map(|active| walk_children(tree, active))
            .unwrap_or_default(),
        NodeData::Leaf(_) | NodeData::Choice(_) | NodeData::None => Vec::new(),
    }
}

/// The leaf a node stands for when classified as [`NodeKind::Leaf`].
fn leaf_target(tree: &WanoTree, id: NodeId) -> NodeId {
    match &tree.node(id).data {
        NodeData::Switch(s) => s
            .active_node()
            .map(|active| leaf_target(tree, active))
            .unwrap_or(id),
        _ => id,
    }
}

pub(crate) fn leaf_data(node: &Node) -> Value {
    match &node.data {
        NodeData::Leaf(leaf) => leaf.get_data(),
        NodeData::Choice(choice) => choice.get_data(),
        _ => Value::Null,
    }
}

/// Plain data for the whole tree.
pub fn plain_data(tree: &WanoTree) -> Value {
    plain_data_of(tree, tree.root())
}

/// Plain nested data isomorphic to the subtree at `id`.
pub fn plain_data_of(tree: &WanoTree, id: NodeId) -> Value {
    match kind_of(tree, id) {
        NodeKind::Leaf => leaf_data(tree.node(leaf_target(tree, id))),
        NodeKind::Dict => Value::Object(
            walk_children(tree, id)
                .into_iter()
                .map(|(name, child)| (name, plain_data_of(tree, child)))
                .collect::<Map<String, Value>>(),
        ),
        NodeKind::List => Value::Array(
            walk_children(tree, id)
                .into_iter()
                .map(|(_, child)| plain_data_of(tree, child))
                .collect(),
        ),
    }
}

/// Every reachable leaf with the dotted path built during the walk.
pub fn flat_leaves(tree: &WanoTree) -> Vec<(String, NodeId)> {
    let mut out = Vec::new();
    collect_leaves(tree, tree.root(), String::new(), &mut out);
    out
}

fn collect_leaves(tree: &WanoTree, id: NodeId, path: String, out: &mut Vec<(String, NodeId)>) {
    match kind_of(tree, id) {
        NodeKind::Leaf => out.push((path, leaf_target(tree, id))),
        NodeKind::Dict | NodeKind::List => {
            for (segment, child) in walk_children(tree, id) {
                collect_leaves(tree, child, child_path(&path, &segment), out);
            }
        }
    }
}

/// Per-leaf callback of [`walk_with`].
pub trait LeafVisitor {
    fn visit_leaf(&mut self, path: &str, node: &Node) -> Result<Value>;
}

/// Builds nested data like [`plain_data`], asking `visitor` for every leaf.
/// The first visitor error aborts the walk.
pub fn walk_with<V: LeafVisitor>(tree: &WanoTree, visitor: &mut V) -> Result<Value> {
    walk_node(tree, tree.root(), String::new(), visitor)
}

fn walk_node<V: LeafVisitor>(
    tree: &WanoTree,
    id: NodeId,
    path: String,
    visitor: &mut V,
) -> Result<Value> {
    match kind_of(tree, id) {
        NodeKind::Leaf => visitor.visit_leaf(&path, tree.node(leaf_target(tree, id))),
        NodeKind::Dict => {
            let mut map = Map::new();
            for (name, child) in walk_children(tree, id) {
                let value = walk_node(tree, child, child_path(&path, &name), visitor)?;
                map.insert(name, value);
            }
            Ok(Value::Object(map))
        }
        NodeKind::List => {
            let mut items = Vec::new();
            for (segment, child) in walk_children(tree, id) {
                items.push(walk_node(tree, child, child_path(&path, &segment), visitor)?);
            }
            Ok(Value::Array(items))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::core::Compiler;
    use crate::dsl::{builder, Element};
    use serde_json::json;

    #[test]
    fn test_flat_leaves_match_full_paths() {
        let root = builder::dict(
            "root",
            vec![
                builder::dict("Box", vec![builder::float("Lx", 1.0), builder::int("n", 2)]),
                builder::multiple_of("Atoms", vec![builder::string("el", "H")]),
            ],
        );
        let tree = Compiler::new().compile(&root).unwrap();
        let leaves = flat_leaves(&tree);
        let paths: Vec<&str> = leaves.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["Box.Lx", "Box.n", "Atoms.0.el"]);
        for (path, id) in &leaves {
            assert_eq!(tree.full_path(*id), path.as_str());
        }
    }

    #[test]
    fn test_none_nodes_contribute_nothing() {
        let root = builder::dict(
            "root",
            vec![
                Element::new("WaNoNone").with_attr("name", "label").with_text("Geometry"),
                builder::float("x", 0.5),
            ],
        );
        let tree = Compiler::new().compile(&root).unwrap();
        assert_eq!(plain_data(&tree), json!({"x": 0.5}));
    }
}
