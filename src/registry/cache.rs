// src/registry/cache.rs

//! Memo of task lookups, including lookups that found nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::registry::identity::TaskFactoryParameters;
use crate::registry::record::RegisteredTaskRecord;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RetrievalKey {
    name: String,
    exact: bool,
    parameters: BTreeMap<String, String>,
}

impl RetrievalKey {
    pub fn new(name: &str, exact: bool, parameters: &TaskFactoryParameters) -> Self {
        Self {
            name: name.to_lowercase(),
            exact,
            parameters: parameters.normalized(),
        }
    }
}

type Resolution = Option<Arc<RegisteredTaskRecord>>;

#[derive(Debug, Default)]
pub struct TaskRetrievalCache {
    entries: RwLock<HashMap<RetrievalKey, Resolution>>,
}

impl TaskRetrievalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(resolution)` on a hit; the resolution itself may be "not found".
    pub fn get(&self, key: &RetrievalKey) -> Option<Resolution> {
        self.entries.read().get(key).cloned()
    }

    pub fn insert(&self, key: RetrievalKey, resolution: Resolution) {
        self.entries.write().insert(key, resolution);
    }

    /// Records previously resolved for a task name, oldest registration first.
    pub fn resolutions_for(&self, name: &str) -> Vec<Arc<RegisteredTaskRecord>> {
        let lower = name.to_lowercase();
        let entries = self.entries.read();
        let mut found: Vec<Arc<RegisteredTaskRecord>> = entries
            .iter()
            .filter(|(k, _)| k.name == lower)
            .filter_map(|(_, v)| v.clone())
            .collect();
        found.sort_by_key(|r| r.registration_order);
        found.dedup_by_key(|r| r.registration_order);
        found
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Clone for TaskRetrievalCache {
    fn clone(&self) -> Self {
        Self {
            entries: RwLock::new(self.entries.read().clone()),
        }
    }
}
