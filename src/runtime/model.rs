use crate::compiler::core::Compiler;
use crate::dsl::Element;
use crate::error::{Result, WanoError};
use crate::nodes::NodeId;
use crate::runtime::tables::{ExportEntry, FileDecl, ImportEntry, Resources};
use crate::runtime::tree::WanoTree;
use crate::runtime::walker;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

pub const ROOT_TAG: &str = "WaNoRoot";
pub const EXEC_COMMAND_TAG: &str = "WaNoExecCommand";
pub const INPUT_FILES_TAG: &str = "WaNoInputFiles";
pub const INPUT_FILE_TAG: &str = "WaNoInputFile";
pub const OUTPUT_FILES_TAG: &str = "WaNoOutputFiles";
pub const OUTPUT_FILE_TAG: &str = "WaNoOutputFile";

/// One opened WaNo: the node tree plus the template-level metadata.
#[derive(Debug, Clone)]
pub struct WanoModelRoot {
    pub name: String,
    pub tree: WanoTree,
    pub exec_command: String,
    pub input_files: Vec<FileDecl>,
    pub output_files: Vec<String>,
    pub resources: Resources,
    pub import_model: Vec<ImportEntry>,
    pub export_model: Vec<ExportEntry>,
    /// The full template document. Authoritative on disk; refreshed from
    /// the tree by `update_xml`.
    pub(crate) template: Element,
    /// Directory the template was loaded from; local input files live here.
    pub template_dir: Option<PathBuf>,
}

impl WanoModelRoot {
    /// Builds the model from a parsed template document.
    pub fn from_element(template: Element, template_dir: Option<PathBuf>) -> Result<Self> {
        let root = template
            .find(ROOT_TAG)
            .ok_or_else(|| WanoError::MissingElement(ROOT_TAG.to_string()))?;
        let tree = Compiler::new().compile(root)?;
        let name = root.attr("name").unwrap_or(ROOT_TAG).to_string();

        let exec_command = template
            .find(EXEC_COMMAND_TAG)
            .map(|e| e.text_or_empty().trim().to_string())
            .unwrap_or_default();

        let mut input_files = Vec::new();
        if let Some(inputs) = template.find(INPUT_FILES_TAG) {
            for file in inputs.children_named(INPUT_FILE_TAG) {
                let logical_filename = file.required_attr("logical_filename")?.to_string();
                let local = file
                    .text
                    .as_deref()
                    .map(|t| t.trim().to_string())
                    .unwrap_or_else(|| logical_filename.clone());
                input_files.push(FileDecl {
                    logical_filename,
                    local,
                });
            }
        }

        let output_files = template
            .find(OUTPUT_FILES_TAG)
            .map(|outputs| {
                outputs
                    .children_named(OUTPUT_FILE_TAG)
                    .map(|f| f.text_or_empty().trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        info!(wano = %name, inputs = input_files.len(), "constructed WaNo model");
        Ok(Self {
            name,
            tree,
            exec_command,
            input_files,
            output_files,
            resources: Resources::default(),
            import_model: Vec::new(),
            export_model: Vec::new(),
            template,
            template_dir,
        })
    }

    pub fn from_xml_str(xml: &str) -> Result<Self> {
        Self::from_element(Element::parse_str(xml)?, None)
    }

    pub fn template(&self) -> &Element {
        &self.template
    }

    pub fn template_dir(&self) -> &Path {
        self.template_dir.as_deref().unwrap_or_else(|| Path::new("."))
    }

    pub fn get_data(&self, path: &str) -> Result<Value> {
        self.tree.get_data(path)
    }

    /// Plain nested data of the whole tree.
    pub fn plain_data(&self) -> Value {
        walker::plain_data(&self.tree)
    }

    pub fn set_value(&mut self, path: &str, text: &str) -> Result<()> {
        self.tree.set_value(path, text)
    }

    pub fn set_chosen(&mut self, path: &str, index: usize) -> Result<()> {
        self.tree.set_chosen(path, index)
    }

    pub fn add_item(&mut self, path: &str) -> Result<NodeId> {
        self.tree.add_item(path)
    }

    pub fn delete_item(&mut self, path: &str) -> Result<bool> {
        self.tree.delete_item(path)
    }

    pub fn active_alternative(&self, path: &str) -> Result<Option<&str>> {
        self.tree.active_alternative(path)
    }

    pub fn is_visible(&self, path: &str) -> Result<bool> {
        self.tree.is_visible(path)
    }
}
