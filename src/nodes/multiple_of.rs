use crate::nodes::NodeId;

/// Repeatable group. Instances are appended and removed at the end only;
/// a new instance copies the current values of instance 0.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipleOf {
    pub instances: Vec<NodeId>,
}

impl MultipleOf {
    pub const INSTANCE_TAG: &'static str = "Element";

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn can_delete(&self) -> bool {
        self.instances.len() > 1
    }
}
