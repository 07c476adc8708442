// src/project/loader.rs

use std::path::Path;

use tracing::debug;

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::project::model::ProjectDefinition;
use crate::project::validate::validate_project;

/// Read and deserialize a project file.
///
/// This only performs TOML deserialization; use [`load_and_validate`] to also
/// check target names, literal target references and dependency cycles.
pub fn load_from_path(fs: &dyn FileSystem, path: &Path) -> Result<ProjectDefinition> {
    let contents = fs.read_to_string(path)?;
    let definition: ProjectDefinition = toml::from_str(&contents)?;
    debug!(
        project = %path.display(),
        targets = definition.target.len(),
        using_tasks = definition.using_task.len(),
        "project file parsed"
    );
    Ok(definition)
}

pub fn load_and_validate(fs: &dyn FileSystem, path: &Path) -> Result<ProjectDefinition> {
    let definition = load_from_path(fs, path)?;
    validate_project(&definition, &path.display().to_string())?;
    Ok(definition)
}
