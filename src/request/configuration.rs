// src/request/configuration.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{verify_internal, Result};
use crate::fs::FileSystem;
use crate::project::ProjectInstance;

/// Structural identity of a configuration: the same project built with the
/// same global properties and tools version is the same configuration,
/// whatever id it was given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigurationMetadata {
    project_full_path: PathBuf,
    global_properties: BTreeMap<String, String>,
    tools_version: String,
}

impl ConfigurationMetadata {
    pub fn new(
        project_full_path: impl Into<PathBuf>,
        global_properties: BTreeMap<String, String>,
        tools_version: impl Into<String>,
    ) -> Self {
        Self {
            project_full_path: project_full_path.into(),
            global_properties,
            tools_version: tools_version.into(),
        }
    }

    pub fn project_full_path(&self) -> &Path {
        &self.project_full_path
    }

    pub fn global_properties(&self) -> &BTreeMap<String, String> {
        &self.global_properties
    }

    pub fn tools_version(&self) -> &str {
        &self.tools_version
    }
}

/// A project, its global properties and tools version, plus the evaluated
/// instance once something loaded it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequestConfiguration {
    id: i32,
    metadata: ConfigurationMetadata,
    default_targets: Option<Vec<String>>,
    initial_targets: Option<Vec<String>>,
    #[serde(skip)]
    project: Option<Arc<ProjectInstance>>,
}

impl PartialEq for BuildRequestConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.metadata == other.metadata
            && self.default_targets == other.default_targets
            && self.initial_targets == other.initial_targets
    }
}

impl BuildRequestConfiguration {
    pub fn new(id: i32, metadata: ConfigurationMetadata) -> Self {
        Self {
            id,
            metadata,
            default_targets: None,
            initial_targets: None,
            project: None,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn metadata(&self) -> &ConfigurationMetadata {
        &self.metadata
    }

    pub fn project_full_path(&self) -> &Path {
        self.metadata.project_full_path()
    }

    pub fn global_properties(&self) -> &BTreeMap<String, String> {
        self.metadata.global_properties()
    }

    pub fn tools_version(&self) -> &str {
        self.metadata.tools_version()
    }

    /// Known once the project was loaded at least once.
    pub fn default_targets(&self) -> Option<&[String]> {
        self.default_targets.as_deref()
    }

    pub fn initial_targets(&self) -> Option<&[String]> {
        self.initial_targets.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.project.is_some()
    }

    pub fn project(&self) -> Option<&Arc<ProjectInstance>> {
        self.project.as_ref()
    }

    pub fn set_project(&mut self, project: Arc<ProjectInstance>) {
        self.default_targets = Some(project.default_targets().to_vec());
        self.initial_targets = Some(project.initial_targets().to_vec());
        self.project = Some(project);
    }

    /// The evaluated project, loading it on first use.
    pub fn load(&mut self, file_system: Arc<dyn FileSystem>) -> Result<Arc<ProjectInstance>> {
        if let Some(project) = self.project.as_ref() {
            return Ok(Arc::clone(project));
        }
        debug!(
            configuration = self.id,
            project = %self.project_full_path().display(),
            "loading project for configuration"
        );
        let project = Arc::new(ProjectInstance::load(
            file_system,
            self.project_full_path(),
            self.global_properties().clone(),
            Some(self.tools_version()),
        )?);
        self.set_project(Arc::clone(&project));
        Ok(project)
    }

    /// Drop the evaluated instance; the target lists stay known.
    pub fn unload(&mut self) {
        if self.project.take().is_some() {
            debug!(configuration = self.id, "project unloaded");
        }
    }

    /// Same configuration under another id, sharing the loaded instance.
    pub fn share_with_new_id(&self, id: i32) -> Result<Self> {
        verify_internal(id >= 0, || format!("cannot give a configuration the invalid id {id}"))?;
        let mut shared = self.clone();
        shared.id = id;
        Ok(shared)
    }
}
