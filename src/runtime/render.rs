use crate::error::{Result, WanoError};
use crate::nodes::{FileRef, LeafValue, Node, NodeData};
use crate::runtime::model::{WanoModelRoot, EXEC_COMMAND_TAG};
use crate::runtime::tables::{FileDecl, Resources};
use crate::runtime::walker::{self, LeafVisitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tera::Tera;
use tracing::{debug, info};

pub const DEFAULT_STORAGE_PREFIX: &str = "${STORAGE}/workflow_data";
pub const INPUTS_DIR: &str = "inputs";
pub const RENDERED_WANO_FILE: &str = "rendered_wano.yml";

/// Where rendered artifacts go.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub submit_dir: PathBuf,
    /// Prefix for non-local files, which are fetched from workflow storage.
    pub storage_prefix: String,
}

impl RenderContext {
    pub fn new(submit_dir: impl Into<PathBuf>) -> Self {
        Self {
            submit_dir: submit_dir.into(),
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
        }
    }

    pub fn with_storage_prefix(mut self, prefix: &str) -> Self {
        self.storage_prefix = prefix.to_string();
        self
    }

    pub fn inputs_dir(&self) -> PathBuf {
        self.submit_dir.join(INPUTS_DIR)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSource {
    /// Already rendered into the submit directory.
    Local(PathBuf),
    /// Fetched from workflow storage on the cluster side.
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageIn {
    pub logical_name: String,
    pub source: StageSource,
}

/// What the submission client needs to run one rendered WaNo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDescriptor {
    pub wano: String,
    pub command: String,
    pub resources: Resources,
    pub stage_in: Vec<StageIn>,
    pub stage_out: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub data: Value,
    pub descriptor: ExecutionDescriptor,
}

fn has_markup(text: &str) -> bool {
    text.contains("{{") || text.contains("{%")
}

/// Renders `template` with the tree data bound to `wano`.
pub fn render_template(template: &str, data: &Value, path: &str) -> Result<String> {
    if !has_markup(template) {
        return Ok(template.to_string());
    }
    let mut context = tera::Context::new();
    context.insert("wano", data);
    Tera::one_off(template, &context, false).map_err(|e| WanoError::Template {
        path: path.to_string(),
        message: error_chain(&e),
    })
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Joins a logical file name onto `base`. Absolute names, `..` and empty
/// names are rejected so nothing lands outside `base`.
pub fn confined_join(base: &Path, name: &str, path: &str) -> Result<PathBuf> {
    let mut joined = base.to_path_buf();
    let mut depth = 0;
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            _ => return Err(outside(name, path)),
        }
    }
    if depth == 0 {
        return Err(outside(name, path));
    }
    Ok(joined)
}

fn outside(name: &str, path: &str) -> WanoError {
    WanoError::InvalidValue {
        path: path.to_string(),
        value: name.to_string(),
        expected: "a relative file name below the target directory",
    }
}

fn ensure_resolved(path: &str, value: &str) -> Result<()> {
    if has_markup(value) {
        return Err(WanoError::UnresolvedPlaceholder {
            path: path.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// First pass: every string leaf rendered against the raw data.
struct MaterializePass<'a> {
    data: &'a Value,
}

impl LeafVisitor for MaterializePass<'_> {
    fn visit_leaf(&mut self, path: &str, node: &Node) -> Result<Value> {
        match &node.data {
            NodeData::Leaf(leaf) => match &leaf.value {
                LeafValue::String(s) => Ok(Value::String(render_template(s, self.data, path)?)),
                _ => Ok(leaf.get_data()),
            },
            _ => Ok(walker::leaf_data(node)),
        }
    }
}

/// Second pass: raw templates re-rendered against the materialized data,
/// files staged into the submit directory.
struct StagePass<'a> {
    data: &'a Value,
    ctx: &'a RenderContext,
    template_dir: &'a Path,
    stage_in: Vec<StageIn>,
}

impl StagePass<'_> {
    fn stage_file(&mut self, path: &str, file: &FileRef) -> Result<Value> {
        let logical = render_template(&file.logical_filename, self.data, path)?;
        ensure_resolved(path, &logical)?;
        let dest = confined_join(&self.ctx.inputs_dir(), &logical, path)?;

        if !file.local {
            let reference = format!(
                "{}/{}",
                self.ctx.storage_prefix.trim_end_matches('/'),
                file.path.trim_start_matches('/')
            );
            debug!(path, reference = %reference, "file staged from storage");
            self.stage_in.push(StageIn {
                logical_name: logical,
                source: StageSource::Storage(reference.clone()),
            });
            return Ok(Value::String(reference));
        }

        if file.path.trim().is_empty() {
            return Err(WanoError::InvalidValue {
                path: path.to_string(),
                value: String::new(),
                expected: "a local file path",
            });
        }
        let source = local_path(self.template_dir, &file.path);
        copy_file(&source, &dest)?;
        debug!(path, source = %source.display(), "copied local file");

        self.stage_in.push(StageIn {
            logical_name: logical.clone(),
            source: StageSource::Local(dest),
        });
        Ok(Value::String(logical))
    }
}

impl LeafVisitor for StagePass<'_> {
    fn visit_leaf(&mut self, path: &str, node: &Node) -> Result<Value> {
        match &node.data {
            NodeData::Leaf(leaf) => match &leaf.value {
                LeafValue::String(s) => {
                    let rendered = render_template(s, self.data, path)?;
                    ensure_resolved(path, &rendered)?;
                    Ok(Value::String(rendered))
                }
                LeafValue::File(file) => self.stage_file(path, file),
                _ => Ok(leaf.get_data()),
            },
            _ => Ok(walker::leaf_data(node)),
        }
    }
}

fn local_path(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| WanoError::io(parent, e))?;
    }
    fs::copy(source, dest).map_err(|e| WanoError::io(source, e))?;
    Ok(())
}

impl WanoModelRoot {
    /// Renders this WaNo into `ctx.submit_dir`.
    ///
    /// Two walks: the first materializes string values that reference other
    /// values, the second re-resolves every template against that result and
    /// stages files. Anything still holding template markup afterwards is an
    /// error. Filesystem errors abort the render; files already written stay.
    pub fn render(&self, ctx: &RenderContext) -> Result<RenderOutput> {
        let raw = walker::plain_data(&self.tree);
        let materialized = walker::walk_with(&self.tree, &mut MaterializePass { data: &raw })?;

        let inputs_dir = ctx.inputs_dir();
        fs::create_dir_all(&inputs_dir).map_err(|e| WanoError::io(&inputs_dir, e))?;

        let mut stage = StagePass {
            data: &materialized,
            ctx,
            template_dir: self.template_dir(),
            stage_in: Vec::new(),
        };
        let data = walker::walk_with(&self.tree, &mut stage)?;
        let mut stage_in = stage.stage_in;

        for decl in &self.input_files {
            stage_in.push(self.render_input_file(decl, &data, &inputs_dir)?);
        }

        for import in &self.import_model {
            confined_join(&inputs_dir, &import.target, &import.name)?;
            stage_in.push(StageIn {
                logical_name: import.target.clone(),
                source: StageSource::Storage(import.source.clone()),
            });
        }

        let rendered_path = inputs_dir.join(RENDERED_WANO_FILE);
        fs::write(&rendered_path, serde_yaml::to_string(&data)?)
            .map_err(|e| WanoError::io(&rendered_path, e))?;
        stage_in.push(StageIn {
            logical_name: RENDERED_WANO_FILE.to_string(),
            source: StageSource::Local(rendered_path),
        });

        let command = render_template(&self.exec_command, &data, EXEC_COMMAND_TAG)?;
        ensure_resolved(EXEC_COMMAND_TAG, &command)?;

        let mut stage_out = self.output_files.clone();
        for export in &self.export_model {
            if !stage_out.contains(&export.source) {
                stage_out.push(export.source.clone());
            }
        }

        info!(
            wano = %self.name,
            submit_dir = %ctx.submit_dir.display(),
            stage_in = stage_in.len(),
            "rendered WaNo"
        );
        Ok(RenderOutput {
            data,
            descriptor: ExecutionDescriptor {
                wano: self.name.clone(),
                command: command.trim().to_string(),
                resources: self.resources.clone(),
                stage_in,
                stage_out,
            },
        })
    }

    /// Text inputs are rendered as templates; anything that is not UTF-8 is
    /// copied unchanged.
    fn render_input_file(&self, decl: &FileDecl, data: &Value, inputs_dir: &Path) -> Result<StageIn> {
        let source = local_path(self.template_dir(), &decl.local);
        let dest = confined_join(inputs_dir, &decl.logical_filename, &decl.logical_filename)?;
        let bytes = fs::read(&source).map_err(|e| WanoError::io(&source, e))?;

        match String::from_utf8(bytes) {
            Ok(text) => {
                let rendered = render_template(&text, data, &decl.logical_filename)?;
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| WanoError::io(parent, e))?;
                }
                fs::write(&dest, rendered).map_err(|e| WanoError::io(&dest, e))?;
            }
            Err(_) => copy_file(&source, &dest)?,
        }

        Ok(StageIn {
            logical_name: decl.logical_filename.clone(),
            source: StageSource::Local(dest),
        })
    }
}
