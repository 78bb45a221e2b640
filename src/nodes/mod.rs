pub mod choice;
pub mod leaf;
pub mod multiple_of;
pub mod switch;
pub mod visibility;

use crate::dsl::Element;
use indexmap::IndexMap;

pub use choice::{Choice, DynamicSource};
pub use leaf::{FileRef, Leaf, LeafValue, Matrix};
pub use multiple_of::MultipleOf;
pub use switch::Switch;
pub use visibility::Visibility;

/// Handle into the tree arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Shape of a node as seen by the walkers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Dict,
    List,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub parent: Option<NodeId>,
    /// Dotted path from the root, fixed at construction.
    pub full_path: String,
    /// Tag and attributes of the source element. Children are regenerated
    /// from the tree on `update_xml`.
    pub element: Element,
    pub visibility: Option<Visibility>,
    pub data: NodeData,
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Leaf(Leaf),
    Dict(IndexMap<String, NodeId>),
    List(Vec<NodeId>),
    MultipleOf(MultipleOf),
    Choice(Choice),
    Switch(Switch),
    /// Display-only element without data.
    None,
}

impl NodeData {
    pub fn variant_name(&self) -> &'static str {
        match self {
            NodeData::Leaf(_) => "leaf",
            NodeData::Dict(_) => "dict",
            NodeData::List(_) => "list",
            NodeData::MultipleOf(_) => "multiple-of",
            NodeData::Choice(_) => "choice",
            NodeData::Switch(_) => "switch",
            NodeData::None => "none",
        }
    }

    /// Ordered children owned by this node. A switch owns every alternative.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeData::Dict(map) => map.values().copied().collect(),
            NodeData::List(items) => items.clone(),
            NodeData::MultipleOf(m) => m.instances.clone(),
            NodeData::Switch(s) => s.alternatives.clone(),
            NodeData::Leaf(_) | NodeData::Choice(_) | NodeData::None => Vec::new(),
        }
    }
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self.data, NodeData::Leaf(_) | NodeData::Choice(_))
    }

    pub fn type_str(&self) -> &'static str {
        match &self.data {
            NodeData::Leaf(leaf) => leaf.type_str(),
            NodeData::Choice(_) => "String",
            other => other.variant_name(),
        }
    }
}
