use anyhow::{Context as AnyhowContext, Result};
use std::path::Path;
use crate::runtime::model::WanoModelRoot;
use crate::runtime::tables::Resources;

pub fn load_model(file_path: &Path) -> Result<WanoModelRoot> {
    load_model_with(file_path, Resources::default())
}

pub fn load_model_with(file_path: &Path, default_resources: Resources) -> Result<WanoModelRoot> {
    let model = WanoModelRoot::construct_from_wano_with(file_path, default_resources)
        .with_context(|| format!("Failed to load WaNo from {}", file_path.display()))?;
    Ok(model)
}

/// Applies `path=value` edits in order. The first rejected edit stops.
pub fn apply_edits(model: &mut WanoModelRoot, edits: &[(String, String)]) -> Result<()> {
    for (path, value) in edits {
        model
            .set_value(path, value)
            .with_context(|| format!("Failed to set {} to {:?}", path, value))?;
    }
    Ok(())
}
