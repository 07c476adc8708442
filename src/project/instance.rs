// src/project/instance.rs

//! Evaluated projects.
//!
//! Evaluation runs in fixed passes:
//! 1. reserved and global properties are seeded (both read-only)
//! 2. property groups, then the property parts of choose blocks
//! 3. item groups, then the item parts of choose blocks
//! 4. the core tasks and every using-task declaration are registered
//!
//! The evaluated state is shared copy-on-write. Every build of the instance
//! works on a [`Lookup`] over it and commits back explicitly, so a fresh
//! instance of the same file never sees what targets did to an older one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::errors::{ElementLocation, Result};
use crate::evaluation::item::{escape, unescape};
use crate::evaluation::{Lookup, ProjectState};
use crate::fs::FileSystem;
use crate::intrinsic::{
    execute_choose, execute_item_group, execute_property_group, EvaluationPass, IntrinsicContext,
};
use crate::project::loader::load_and_validate;
use crate::project::model::{ProjectDefinition, TargetDefinition};
use crate::project::{
    DEFAULT_TOOLS_VERSION, PROJECT_DIRECTORY_PROPERTY, PROJECT_EXTENSION_PROPERTY,
    PROJECT_FILE_PROPERTY, PROJECT_FULL_PATH_PROPERTY, PROJECT_NAME_PROPERTY,
    TOOLS_VERSION_PROPERTY,
};
use crate::registry::TaskRegistry;

#[derive(Debug)]
pub struct ProjectInstance {
    full_path: PathBuf,
    directory: PathBuf,
    definition: Arc<ProjectDefinition>,
    global_properties: BTreeMap<String, String>,
    tools_version: String,
    state: RwLock<Arc<ProjectState>>,
    registry: Arc<TaskRegistry>,
    default_targets: Vec<String>,
    initial_targets: Vec<String>,
    file_system: Arc<dyn FileSystem>,
}

impl ProjectInstance {
    /// Read, validate and evaluate a project file.
    pub fn load(
        file_system: Arc<dyn FileSystem>,
        path: &Path,
        global_properties: BTreeMap<String, String>,
        tools_version: Option<&str>,
    ) -> Result<Self> {
        let definition = load_and_validate(file_system.as_ref(), path)?;
        Self::evaluate(file_system, path, Arc::new(definition), global_properties, tools_version)
    }

    /// Evaluate an already parsed project.
    ///
    /// `global_properties` hold unescaped values.
    pub fn evaluate(
        file_system: Arc<dyn FileSystem>,
        path: &Path,
        definition: Arc<ProjectDefinition>,
        global_properties: BTreeMap<String, String>,
        tools_version: Option<&str>,
    ) -> Result<Self> {
        let full_path = path.to_path_buf();
        let directory = full_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let file = full_path.display().to_string();
        let tools_version = tools_version
            .filter(|tv| !tv.trim().is_empty())
            .map(str::to_string)
            .or_else(|| definition.project.tools_version.clone())
            .unwrap_or_else(|| DEFAULT_TOOLS_VERSION.to_string());

        let mut seed = ProjectState::new();
        for (name, value) in reserved_properties(&full_path, &directory, &tools_version) {
            seed.set_read_only_property(name, escape(&value));
        }
        for (name, value) in global_properties.iter() {
            seed.set_read_only_property(name, escape(value));
        }

        let mut lookup = Lookup::new(Arc::new(seed));
        let ctx = IntrinsicContext::evaluation(file_system.as_ref(), &directory);
        let root = ElementLocation::new(file.clone(), "");

        for (idx, group) in definition.property_group.iter().enumerate() {
            execute_property_group(group, &mut lookup, &ctx, &root.child(format!("property_group #{}", idx + 1)))?;
        }
        for (idx, choose) in definition.choose.iter().enumerate() {
            let location = root.child(format!("choose #{}", idx + 1));
            execute_choose(choose, EvaluationPass::Properties, &mut lookup, &ctx, &location)?;
        }
        for (idx, group) in definition.item_group.iter().enumerate() {
            execute_item_group(group, &mut lookup, &ctx, &root.child(format!("item_group #{}", idx + 1)))?;
        }
        for (idx, choose) in definition.choose.iter().enumerate() {
            let location = root.child(format!("choose #{}", idx + 1));
            execute_choose(choose, EvaluationPass::Items, &mut lookup, &ctx, &location)?;
        }

        let mut registry = TaskRegistry::core(tools_version.clone());
        for (idx, using_task) in definition.using_task.iter().enumerate() {
            let location = root.child(format!("using_task #{} '{}'", idx + 1, using_task.task_name));
            let expander = ctx.expander(&lookup).without_metadata();
            registry.register_tasks_from_using_task(using_task, &expander, &location)?;
        }

        let default_targets = expand_target_list(&definition.project.default_targets, &lookup, &ctx, &root)?;
        let default_targets = if default_targets.is_empty() {
            definition.target.keys().take(1).cloned().collect()
        } else {
            default_targets
        };
        let initial_targets = expand_target_list(&definition.project.initial_targets, &lookup, &ctx, &root)?;

        info!(
            project = %file,
            %tools_version,
            targets = definition.target.len(),
            tasks = registry.get_deep_count_of_registered_tasks(),
            "project evaluated"
        );

        Ok(Self {
            full_path,
            directory,
            definition,
            global_properties,
            tools_version,
            state: RwLock::new(Arc::clone(lookup.project_state())),
            registry: Arc::new(registry),
            default_targets,
            initial_targets,
            file_system,
        })
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    pub fn file(&self) -> String {
        self.full_path.display().to_string()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn definition(&self) -> &Arc<ProjectDefinition> {
        &self.definition
    }

    pub fn global_properties(&self) -> &BTreeMap<String, String> {
        &self.global_properties
    }

    pub fn tools_version(&self) -> &str {
        &self.tools_version
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.file_system
    }

    pub fn default_targets(&self) -> &[String] {
        &self.default_targets
    }

    pub fn initial_targets(&self) -> &[String] {
        &self.initial_targets
    }

    /// Target definition by case-insensitive name, with its declared name.
    pub fn target(&self, name: &str) -> Option<(&str, &TargetDefinition)> {
        self.definition
            .target
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name.trim()))
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn targets(&self) -> &IndexMap<String, TargetDefinition> {
        &self.definition.target
    }

    /// When any target declares `returns`, targets without it return nothing.
    pub fn returns_enabled(&self) -> bool {
        self.definition
            .target
            .values()
            .any(|t| t.returns.is_some())
    }

    /// Current committed state.
    pub fn state(&self) -> Arc<ProjectState> {
        Arc::clone(&self.state.read())
    }

    /// A fresh lookup over the committed state.
    pub fn create_lookup(&self) -> Lookup {
        Lookup::new(self.state())
    }

    /// Make the project tier of a finished lookup the committed state.
    pub fn commit(&self, lookup: &Lookup) {
        debug!(project = %self.full_path.display(), "committing project state");
        *self.state.write() = Arc::clone(lookup.project_state());
    }

    /// Unescaped value of a property in the committed state.
    pub fn get_property(&self, name: &str) -> Option<String> {
        self.state.read().get_property(name).map(unescape)
    }

    /// Item specs of a type in the committed state.
    pub fn item_specs(&self, item_type: &str) -> Vec<String> {
        self.state
            .read()
            .items_of(item_type)
            .iter()
            .map(|i| i.include().to_string())
            .collect()
    }
}

fn reserved_properties(full_path: &Path, directory: &Path, tools_version: &str) -> Vec<(&'static str, String)> {
    let file_name = full_path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = full_path
        .file_stem()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = full_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    vec![
        (PROJECT_FILE_PROPERTY, file_name),
        (PROJECT_NAME_PROPERTY, stem),
        (PROJECT_DIRECTORY_PROPERTY, directory.display().to_string()),
        (PROJECT_FULL_PATH_PROPERTY, full_path.display().to_string()),
        (PROJECT_EXTENSION_PROPERTY, extension),
        (TOOLS_VERSION_PROPERTY, tools_version.to_string()),
    ]
}

fn expand_target_list(
    entries: &[String],
    lookup: &Lookup,
    ctx: &IntrinsicContext<'_>,
    root: &ElementLocation,
) -> Result<Vec<String>> {
    let expander = ctx.expander(lookup).without_metadata();
    let location = root.child("project");
    let mut out = Vec::new();
    for entry in entries {
        for name in expander.expand_into_strings(entry, &location)? {
            if !out.iter().any(|t: &String| t.eq_ignore_ascii_case(&name)) {
                out.push(name);
            }
        }
    }
    Ok(out)
}
