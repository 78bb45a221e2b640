use crate::nodes::NodeId;
use std::collections::HashSet;

/// Observer edges: a node that must be re-evaluated when the data at a
/// watched path changes (switches, dynamic dropdowns).
#[derive(Debug, Clone, Default)]
pub struct Observers {
    edges: Vec<(String, NodeId)>,
}

impl Observers {
    pub fn watch(&mut self, watched: &str, observer: NodeId) {
        self.edges.push((watched.to_string(), observer));
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Observers whose watched path overlaps `changed`: equal, an ancestor
    /// of it, or below it. Sorted by id, without duplicates.
    pub fn affected_by(&self, changed: &str) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .edges
            .iter()
            .filter(|(watched, _)| overlaps(watched, changed))
            .map(|(_, id)| *id)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn observers(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.edges.iter().map(|(_, id)| *id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn forget(&mut self, removed: &HashSet<NodeId>) {
        self.edges.retain(|(_, id)| !removed.contains(id));
    }
}

fn overlaps(a: &str, b: &str) -> bool {
    a == b || a.is_empty() || b.is_empty() || is_below(a, b) || is_below(b, a)
}

fn is_below(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'.'
}
