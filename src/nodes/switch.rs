use crate::nodes::NodeId;
use tracing::debug;

/// Conditional subtree. Exactly one alternative is active; which one is
/// decided by the value found at `switch_path`.
#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub switch_path: String,
    pub names: Vec<String>,
    pub alternatives: Vec<NodeId>,
    pub active: usize,
}

impl Switch {
    pub fn active_node(&self) -> Option<NodeId> {
        self.alternatives.get(self.active).copied()
    }

    pub fn active_name(&self) -> Option<&str> {
        self.names.get(self.active).map(String::as_str)
    }

    /// Maps `value` through the name table. Unknown values leave the
    /// current alternative in place. Returns whether the selection changed.
    pub fn select(&mut self, value: &str) -> bool {
        match self.names.iter().position(|n| n == value) {
            Some(index) if index != self.active => {
                self.active = index;
                true
            }
            Some(_) => false,
            None => {
                debug!(switch_path = %self.switch_path, value, "switch value not in name table");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switch() -> Switch {
        Switch {
            switch_path: "Method".to_string(),
            names: vec!["DFT".to_string(), "MD".to_string()],
            alternatives: vec![NodeId(3), NodeId(7)],
            active: 0,
        }
    }

    #[test]
    fn test_select_known_value() {
        let mut s = switch();
        assert!(s.select("MD"));
        assert_eq!(s.active_node(), Some(NodeId(7)));
        assert!(!s.select("MD"));
    }

    #[test]
    fn test_unknown_value_keeps_selection() {
        let mut s = switch();
        s.select("MD");
        assert!(!s.select("QMMM"));
        assert_eq!(s.active_name(), Some("MD"));
    }
}
