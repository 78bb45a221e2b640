use crate::error::{Result, WanoError};
use crate::runtime::render::DEFAULT_STORAGE_PREFIX;
use crate::runtime::tables::Resources;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Typed view of the settings the CLI and loader care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Used when a WaNo has no `resources.yml`.
    pub default_resources: Resources,
    pub submit_dir: PathBuf,
    pub storage_prefix: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_resources: Resources::default(),
            submit_dir: PathBuf::from("submit"),
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
        }
    }
}

/// Hierarchical key/value settings addressed by dotted paths, stored as YAML.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    root: Value,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: Value::Mapping(Mapping::new()),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// A missing file yields empty settings.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|e| WanoError::io(path, e))?;
        let root: Value = serde_yaml::from_str(&text)?;
        Ok(match root {
            Value::Null => Self::default(),
            root => Self { root },
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_yaml::to_string(&self.root)?;
        fs::write(path, text).map_err(|e| WanoError::io(path, e))
    }

    pub fn get(&self, dotted: &str) -> Option<&Value> {
        dotted
            .split('.')
            .try_fold(&self.root, |current, segment| current.get(segment))
    }

    /// Creates intermediate mappings as needed, replacing scalars in the way.
    pub fn set(&mut self, dotted: &str, value: Value) {
        let mut segments: Vec<&str> = dotted.split('.').collect();
        let Some(last) = segments.pop() else {
            return;
        };

        let mut current = &mut self.root;
        for segment in segments {
            if !current.is_mapping() {
                *current = Value::Mapping(Mapping::new());
            }
            current = match current {
                Value::Mapping(map) => map
                    .entry(Value::from(segment))
                    .or_insert_with(|| Value::Mapping(Mapping::new())),
                _ => return,
            };
        }

        if !current.is_mapping() {
            *current = Value::Mapping(Mapping::new());
        }
        if let Value::Mapping(map) = current {
            map.insert(Value::from(last), value);
        }
    }

    /// Returns whether a key was removed.
    pub fn delete(&mut self, dotted: &str) -> bool {
        let (parent, last) = match dotted.rsplit_once('.') {
            Some((parent, last)) => (Some(parent), last),
            None => (None, dotted),
        };

        let mut current = Some(&mut self.root);
        if let Some(parent) = parent {
            for segment in parent.split('.') {
                current = current.and_then(|value| value.get_mut(segment));
            }
        }

        current
            .and_then(Value::as_mapping_mut)
            .map(|map| map.remove(last).is_some())
            .unwrap_or(false)
    }

    pub fn app_config(&self) -> Result<AppConfig> {
        Ok(serde_yaml::from_value(self.root.clone())?)
    }
}
