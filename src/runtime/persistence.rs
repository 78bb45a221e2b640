use crate::dsl::Element;
use crate::error::{Result, WanoError};
use crate::nodes::{NodeData, NodeId};
use crate::runtime::model::{WanoModelRoot, ROOT_TAG};
use crate::runtime::tables::{ExportEntry, ImportEntry, Resources};
use crate::runtime::tree::WanoTree;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

pub const RESOURCES_FILE: &str = "resources.yml";
pub const IMPORTS_FILE: &str = "imports.yml";
pub const EXPORTS_FILE: &str = "exports.yml";

impl WanoModelRoot {
    /// Loads a WaNo document and its sidecar tables. Missing sidecars fall
    /// back to defaults.
    pub fn construct_from_wano(path: &Path) -> Result<Self> {
        Self::construct_from_wano_with(path, Resources::default())
    }

    /// Like [`construct_from_wano`](Self::construct_from_wano), with the
    /// resources to use when no `resources.yml` exists.
    pub fn construct_from_wano_with(path: &Path, default_resources: Resources) -> Result<Self> {
        let template = Element::parse_file(path)?;
        let dir = path.parent().map(Path::to_path_buf);
        let mut model = Self::from_element(template, dir.clone())?;

        if let Some(dir) = &dir {
            model.resources = read_sidecar(&dir.join(RESOURCES_FILE))?.unwrap_or(default_resources);
            model.import_model = read_sidecar::<Vec<ImportEntry>>(&dir.join(IMPORTS_FILE))?.unwrap_or_default();
            model.export_model = read_sidecar::<Vec<ExportEntry>>(&dir.join(EXPORTS_FILE))?.unwrap_or_default();
        } else {
            model.resources = default_resources;
        }

        info!(path = %path.display(), wano = %model.name, "loaded WaNo");
        Ok(model)
    }

    /// Regenerates the `WaNoRoot` subtree of the stored template from the
    /// current node values.
    pub fn update_xml(&mut self) -> Result<()> {
        let root = self.tree.to_element(self.tree.root());
        let slot = self
            .template
            .find_mut(ROOT_TAG)
            .ok_or_else(|| WanoError::MissingElement(ROOT_TAG.to_string()))?;
        *slot = root;
        Ok(())
    }

    /// Writes the template XML to `path` and the sidecar tables next to it.
    /// The four writes are independent; a failure can leave earlier files
    /// updated.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.update_xml()?;
        let xml = self.template.to_xml_string()?;
        fs::write(path, xml).map_err(|e| WanoError::io(path, e))?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        write_sidecar(&dir.join(RESOURCES_FILE), &self.resources)?;
        write_sidecar(&dir.join(IMPORTS_FILE), &self.import_model)?;
        write_sidecar(&dir.join(EXPORTS_FILE), &self.export_model)?;
        debug!(path = %path.display(), "saved WaNo");
        Ok(())
    }

    /// [`save`](Self::save) reporting success as a flag; the error is logged.
    pub fn save_xml(&mut self, path: &Path) -> bool {
        match self.save(path) {
            Ok(()) => true,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to save WaNo");
                false
            }
        }
    }
}

impl WanoTree {
    /// The element for `id` with the current values written back.
    pub(crate) fn to_element(&self, id: NodeId) -> Element {
        let node = self.node(id);
        let mut element = node.element.clone();
        match &node.data {
            NodeData::Leaf(leaf) => {
                let text = leaf.to_text();
                element.text = (!text.is_empty()).then_some(text);
                leaf.write_attributes(&mut element);
            }
            NodeData::Choice(choice) => choice.write_entries(&mut element),
            NodeData::Dict(map) => {
                element.children = map.values().map(|&child| self.to_element(child)).collect();
            }
            NodeData::List(items) => {
                element.children = items.iter().map(|&child| self.to_element(child)).collect();
            }
            NodeData::MultipleOf(m) => {
                element.children = m
                    .instances
                    .iter()
                    .enumerate()
                    .map(|(i, &instance)| {
                        let mut child = self.to_element(instance);
                        child.set_attr("id", i.to_string());
                        child
                    })
                    .collect();
            }
            NodeData::Switch(s) => {
                element.children = s
                    .alternatives
                    .iter()
                    .map(|&alt| self.to_element(alt))
                    .collect();
            }
            // The shell of a display-only node is the full source element.
            NodeData::None => {}
        }
        element
    }
}

fn read_sidecar<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|e| WanoError::io(path, e))?;
    Ok(Some(serde_yaml::from_str(&text)?))
}

fn write_sidecar<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_yaml::to_string(value)?;
    fs::write(path, text).map_err(|e| WanoError::io(path, e))
}
