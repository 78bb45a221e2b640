use crate::compiler::core::build_node;
use crate::error::{Result, WanoError};
use crate::nodes::{MultipleOf, Node, NodeData, NodeId};
use crate::runtime::dependency::Observers;
use crate::runtime::walker;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Arena holding every node of one WaNo document.
///
/// Children are owned through `NodeId`s stored in their parent's data;
/// `parent` is a plain back-reference. Deleted subtrees stay in the arena
/// unreachable, so ids never shift. Slots are not reused: the arena grows
/// with every add/delete cycle until the document is reloaded.
#[derive(Debug, Clone, Default)]
pub struct WanoTree {
    nodes: Vec<Node>,
    root: NodeId,
    observers: Observers,
}

impl WanoTree {
    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub(crate) fn observers_mut(&mut self) -> &mut Observers {
        &mut self.observers
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn full_path(&self, id: NodeId) -> &str {
        &self.node(id).full_path
    }

    /// Walks `path` segment by segment. Dicts are addressed by name, lists
    /// and MultipleOf instances by index; a switch is transparent and
    /// forwards the segment to its active alternative.
    pub fn resolve(&self, path: &str) -> Option<NodeId> {
        self.resolve_from(self.root, path)
    }

    pub fn resolve_from(&self, start: NodeId, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return Some(start);
        }
        path.split('.')
            .try_fold(start, |current, segment| self.child_by_segment(current, segment))
    }

    fn child_by_segment(&self, id: NodeId, segment: &str) -> Option<NodeId> {
        match &self.node(id).data {
            NodeData::Dict(map) => map.get(segment).copied(),
            NodeData::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i).copied()),
            NodeData::MultipleOf(m) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| m.instances.get(i).copied()),
            NodeData::Switch(s) => self.child_by_segment(s.active_node()?, segment),
            NodeData::Leaf(_) | NodeData::Choice(_) | NodeData::None => None,
        }
    }

    pub fn lookup(&self, path: &str) -> Result<NodeId> {
        self.resolve(path)
            .ok_or_else(|| WanoError::UnknownPath(path.to_string()))
    }

    pub fn get(&self, path: &str) -> Result<&Node> {
        self.lookup(path).map(|id| self.node(id))
    }

    pub fn get_data(&self, path: &str) -> Result<Value> {
        self.lookup(path).map(|id| walker::plain_data_of(self, id))
    }

    /// Sets a leaf from its text form, or a dropdown by entry string.
    pub fn set_value(&mut self, path: &str, text: &str) -> Result<()> {
        let id = self.lookup(path)?;
        let full_path = self.node(id).full_path.clone();
        match &mut self.node_mut(id).data {
            NodeData::Leaf(leaf) => leaf.set_text(text, &full_path)?,
            NodeData::Choice(choice) => {
                if !choice.set_chosen_value(text) {
                    return Err(WanoError::InvalidValue {
                        path: full_path,
                        value: text.to_string(),
                        expected: "one of the dropdown entries",
                    });
                }
            }
            _ => {
                return Err(WanoError::UnsupportedOperation {
                    path: full_path,
                    operation: "set_value",
                });
            }
        }
        debug!(path = %full_path, value = text, "value changed");
        self.propagate(&full_path);
        Ok(())
    }

    pub fn set_chosen(&mut self, path: &str, index: usize) -> Result<()> {
        let id = self.lookup(path)?;
        let full_path = self.node(id).full_path.clone();
        match &mut self.node_mut(id).data {
            NodeData::Choice(choice) => {
                if !choice.set_chosen(index) {
                    return Err(WanoError::InvalidValue {
                        path: full_path,
                        value: index.to_string(),
                        expected: "an entry index",
                    });
                }
            }
            _ => {
                return Err(WanoError::UnsupportedOperation {
                    path: full_path,
                    operation: "set_chosen",
                });
            }
        }
        self.propagate(&full_path);
        Ok(())
    }

    /// Appends a new MultipleOf instance holding a copy of instance 0's
    /// current values. Saved and reloaded documents behave the same, since
    /// instance 0 is what the file keeps.
    pub fn add_item(&mut self, path: &str) -> Result<NodeId> {
        let id = self.lookup(path)?;
        let full_path = self.node(id).full_path.clone();
        let (first, index) = match &self.node(id).data {
            NodeData::MultipleOf(m) => match m.instances.first() {
                Some(&first) => (first, m.len()),
                None => return Err(WanoError::MissingElement(MultipleOf::INSTANCE_TAG.to_string())),
            },
            _ => {
                return Err(WanoError::UnsupportedOperation {
                    path: full_path,
                    operation: "add_item",
                });
            }
        };
        let mut element = self.to_element(first);
        element.set_attr("id", index.to_string());

        let instance = build_node(
            self,
            &element,
            Some(id),
            index.to_string(),
            child_path(&full_path, &index.to_string()),
        )?;
        if let NodeData::MultipleOf(m) = &mut self.node_mut(id).data {
            m.instances.push(instance);
        }
        info!(path = %full_path, index, "added instance");

        let new_nodes: HashSet<NodeId> = self.subtree(instance).into_iter().collect();
        self.refresh(|node| new_nodes.contains(&node));
        self.propagate(&full_path);
        Ok(instance)
    }

    /// Removes the last instance. With a single instance left this does
    /// nothing and returns `Ok(false)`. The removed nodes keep their arena
    /// slots.
    pub fn delete_item(&mut self, path: &str) -> Result<bool> {
        let id = self.lookup(path)?;
        let full_path = self.node(id).full_path.clone();
        let removed = match &mut self.node_mut(id).data {
            NodeData::MultipleOf(m) => {
                if !m.can_delete() {
                    debug!(path = %full_path, "refusing to delete the last instance");
                    return Ok(false);
                }
                m.instances.pop()
            }
            _ => {
                return Err(WanoError::UnsupportedOperation {
                    path: full_path,
                    operation: "delete_item",
                });
            }
        };

        if let Some(removed) = removed {
            let gone: HashSet<NodeId> = self.subtree(removed).into_iter().collect();
            self.observers.forget(&gone);
            info!(path = %full_path, "deleted last instance");
        }
        self.propagate(&full_path);
        Ok(true)
    }

    pub fn active_alternative(&self, path: &str) -> Result<Option<&str>> {
        let node = self.get(path)?;
        match &node.data {
            NodeData::Switch(s) => Ok(s.active_name()),
            _ => Err(WanoError::UnsupportedOperation {
                path: node.full_path.clone(),
                operation: "active_alternative",
            }),
        }
    }

    /// A node is visible when its own condition and every ancestor's hold.
    pub fn is_visible(&self, path: &str) -> Result<bool> {
        let mut current = Some(self.lookup(path)?);
        while let Some(id) = current {
            let node = self.node(id);
            if let Some(visibility) = &node.visibility {
                if let Some(target) = self.resolve(&visibility.var_path) {
                    if !visibility.evaluate(&walker::plain_data_of(self, target)) {
                        return Ok(false);
                    }
                }
            }
            current = node.parent;
        }
        Ok(true)
    }

    /// All nodes owned by `id`, including `id`, in pre-order.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            let mut children = self.node(current).data.children();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Re-evaluates every observer matching `filter`, then lets the changes
    /// settle. Used once after construction and for freshly added instances.
    pub(crate) fn refresh(&mut self, filter: impl Fn(NodeId) -> bool) {
        let mut changed = Vec::new();
        for id in self.observers.observers() {
            if filter(id) && self.reevaluate(id) {
                changed.push(self.node(id).full_path.clone());
            }
        }
        for path in changed {
            self.propagate(&path);
        }
    }

    /// Re-evaluates observers of `changed` until no observer changes state.
    fn propagate(&mut self, changed: &str) {
        let limit = self.observers.len() + 1;
        let mut pending = vec![changed.to_string()];
        let mut rounds = 0;

        while !pending.is_empty() && rounds < limit {
            rounds += 1;
            let mut affected: Vec<NodeId> = pending
                .iter()
                .flat_map(|path| self.observers.affected_by(path))
                .collect();
            affected.sort();
            affected.dedup();

            pending.clear();
            for id in affected {
                if self.reevaluate(id) {
                    pending.push(self.node(id).full_path.clone());
                }
            }
        }

        if !pending.is_empty() {
            warn!(path = changed, "change propagation did not settle, observers form a cycle");
        }
    }

    /// Returns whether the observer's state changed.
    fn reevaluate(&mut self, id: NodeId) -> bool {
        match &self.node(id).data {
            NodeData::Switch(s) => {
                let key = self
                    .resolve(&s.switch_path)
                    .and_then(|target| value_key(&walker::plain_data_of(self, target)));
                let Some(key) = key else {
                    debug!(switch_path = %s.switch_path, "switch path does not resolve to a value");
                    return false;
                };
                match &mut self.node_mut(id).data {
                    NodeData::Switch(s) => s.select(&key),
                    _ => false,
                }
            }
            NodeData::Choice(choice) => {
                let Some(source) = choice.dynamic.clone() else {
                    return false;
                };
                let entries = self.collect_entries(&source.collection_path, &source.subpath);
                match &mut self.node_mut(id).data {
                    NodeData::Choice(choice) => choice.replace_choices(entries),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn collect_entries(&self, collection_path: &str, subpath: &str) -> Vec<String> {
        let Some(NodeData::MultipleOf(m)) = self.resolve(collection_path).map(|id| &self.node(id).data)
        else {
            debug!(collection_path, "dynamic dropdown source is not a MultipleOf");
            return Vec::new();
        };
        m.instances
            .iter()
            .filter_map(|&instance| self.resolve_from(instance, subpath))
            .filter_map(|id| value_key(&walker::plain_data_of(self, id)))
            .collect()
    }
}

pub(crate) fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

/// String form of a scalar used to match name tables.
fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some((if *b { "True" } else { "False" }).to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
