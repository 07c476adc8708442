// src/request/config_cache.rs

//! Configurations known to the build, by id and by structure.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::errors::{verify_internal, BuildError, Result};
use crate::request::configuration::{BuildRequestConfiguration, ConfigurationMetadata};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<BuildRequestConfiguration>", into = "Vec<BuildRequestConfiguration>")]
pub struct ConfigCache {
    configurations: BTreeMap<i32, BuildRequestConfiguration>,
    by_metadata: HashMap<ConfigurationMetadata, i32>,
}

impl PartialEq for ConfigCache {
    fn eq(&self, other: &Self) -> bool {
        self.configurations == other.configurations
    }
}

impl From<Vec<BuildRequestConfiguration>> for ConfigCache {
    fn from(configurations: Vec<BuildRequestConfiguration>) -> Self {
        let mut cache = ConfigCache::new();
        for configuration in configurations {
            cache.insert(configuration);
        }
        cache
    }
}

impl From<ConfigCache> for Vec<BuildRequestConfiguration> {
    fn from(cache: ConfigCache) -> Self {
        cache.configurations.into_values().collect()
    }
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration under its own id.
    pub fn add(&mut self, configuration: BuildRequestConfiguration) -> Result<()> {
        let id = configuration.id();
        verify_internal(id >= 0, || format!("cannot cache a configuration with the invalid id {id}"))?;
        verify_internal(!self.configurations.contains_key(&id), || {
            format!("a configuration with id {id} is already cached")
        })?;
        trace!(configuration = id, project = %configuration.project_full_path().display(), "configuration cached");
        self.insert(configuration);
        Ok(())
    }

    fn insert(&mut self, configuration: BuildRequestConfiguration) {
        self.by_metadata
            .entry(configuration.metadata().clone())
            .or_insert(configuration.id());
        self.configurations.insert(configuration.id(), configuration);
    }

    pub fn get(&self, id: i32) -> Option<&BuildRequestConfiguration> {
        self.configurations.get(&id)
    }

    pub fn get_mut(&mut self, id: i32) -> Option<&mut BuildRequestConfiguration> {
        self.configurations.get_mut(&id)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.configurations.contains_key(&id)
    }

    /// The cached configuration structurally equal to `metadata`.
    pub fn get_matching_configuration(&self, metadata: &ConfigurationMetadata) -> Option<&BuildRequestConfiguration> {
        self.by_metadata
            .get(metadata)
            .and_then(|id| self.configurations.get(id))
    }

    pub fn get_smallest_config_id(&self) -> Result<i32> {
        self.configurations
            .keys()
            .next()
            .copied()
            .ok_or_else(|| BuildError::internal("the configuration cache is empty"))
    }

    pub fn remove(&mut self, id: i32) -> Option<BuildRequestConfiguration> {
        let removed = self.configurations.remove(&id)?;
        if self.by_metadata.get(removed.metadata()) == Some(&id) {
            self.by_metadata.remove(removed.metadata());
            // Another id with the same structure takes over the index entry.
            if let Some(other) = self
                .configurations
                .values()
                .find(|c| c.metadata() == removed.metadata())
            {
                self.by_metadata.insert(other.metadata().clone(), other.id());
            }
        }
        Some(removed)
    }

    /// Unload every project, keeping the configurations.
    pub fn unload_all(&mut self) {
        for configuration in self.configurations.values_mut() {
            configuration.unload();
        }
    }

    pub fn clear(&mut self) {
        self.configurations.clear();
        self.by_metadata.clear();
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Configurations in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &BuildRequestConfiguration> {
        self.configurations.values()
    }
}
