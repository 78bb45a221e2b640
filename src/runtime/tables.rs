use serde::{Deserialize, Serialize};

/// Execution resources requested for one WaNo. Stored in `resources.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    pub resource_name: Option<String>,
    pub nodes: u32,
    pub cpus_per_node: u32,
    /// Memory per node in MB.
    pub memory: u64,
    /// Wall time in seconds.
    pub walltime: u64,
    pub queue: Option<String>,
    pub custom_requests: Option<String>,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            resource_name: None,
            nodes: 1,
            cpus_per_node: 1,
            memory: 4096,
            walltime: 3600,
            queue: None,
            custom_requests: None,
        }
    }
}

/// Binds a file produced elsewhere in the workflow to a logical input name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportEntry {
    pub name: String,
    /// Storage reference of the producing step's file.
    pub source: String,
    /// Logical filename inside `inputs/`.
    pub target: String,
}

/// A file this WaNo publishes to later workflow steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub name: String,
    pub source: String,
}

/// Template input file: rendered into `inputs/<logical_filename>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDecl {
    pub logical_filename: String,
    /// Path relative to the template directory.
    pub local: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resources_fill_missing_fields_with_defaults() {
        let resources: Resources = serde_yaml::from_str("nodes: 4\nqueue: short\n").unwrap();
        assert_eq!(resources.nodes, 4);
        assert_eq!(resources.queue.as_deref(), Some("short"));
        assert_eq!(resources.cpus_per_node, 1);
        assert_eq!(resources.walltime, 3600);
    }
}
