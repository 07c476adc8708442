// src/engine/state.rs

use std::sync::Arc;

use crate::errors::{BuildError, Result};
use crate::fs::FileSystem;
use crate::project::ProjectInstance;
use crate::request::{BuildRequestConfiguration, ConfigCache, ConfigurationMetadata, ResultsCache};

/// Everything a build shares across its requests.
#[derive(Debug)]
pub struct BuildState {
    configs: ConfigCache,
    results: ResultsCache,
    next_submission_id: i32,
    next_configuration_id: i32,
    next_global_request_id: i32,
}

impl Default for BuildState {
    fn default() -> Self {
        Self {
            configs: ConfigCache::new(),
            results: ResultsCache::new(),
            next_submission_id: 1,
            next_configuration_id: 1,
            next_global_request_id: 1,
        }
    }
}

impl BuildState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configs(&self) -> &ConfigCache {
        &self.configs
    }

    pub fn configs_mut(&mut self) -> &mut ConfigCache {
        &mut self.configs
    }

    pub fn results(&self) -> &ResultsCache {
        &self.results
    }

    pub fn results_mut(&mut self) -> &mut ResultsCache {
        &mut self.results
    }

    pub fn next_submission_id(&mut self) -> i32 {
        let id = self.next_submission_id;
        self.next_submission_id += 1;
        id
    }

    pub fn next_global_request_id(&mut self) -> i32 {
        let id = self.next_global_request_id;
        self.next_global_request_id += 1;
        id
    }

    /// Id of the configuration structurally equal to `metadata`, creating
    /// one if none exists yet.
    pub fn resolve_configuration(&mut self, metadata: ConfigurationMetadata) -> Result<i32> {
        if let Some(existing) = self.configs.get_matching_configuration(&metadata) {
            return Ok(existing.id());
        }
        let id = self.next_configuration_id;
        self.next_configuration_id += 1;
        self.configs.add(BuildRequestConfiguration::new(id, metadata))?;
        Ok(id)
    }

    /// The configuration's project, loading it on first use.
    pub fn load_project(
        &mut self,
        configuration_id: i32,
        file_system: Arc<dyn FileSystem>,
    ) -> Result<Arc<ProjectInstance>> {
        self.configs
            .get_mut(configuration_id)
            .ok_or_else(|| BuildError::internal(format!("unknown configuration {configuration_id}")))?
            .load(file_system)
    }

    /// Targets a request without explicit targets would build, if the
    /// configuration was loaded before.
    pub fn implicit_targets(&self, configuration_id: i32) -> Vec<String> {
        let Some(configuration) = self.configs.get(configuration_id) else {
            return Vec::new();
        };
        configuration
            .initial_targets()
            .unwrap_or_default()
            .iter()
            .chain(configuration.default_targets().unwrap_or_default())
            .cloned()
            .collect()
    }
}
