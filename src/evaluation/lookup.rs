// src/evaluation/lookup.rs

//! Layered item/property table used while targets execute.
//!
//! The bottom tier is the project state, shared copy-on-write between
//! lookups. Every scope pushed on top of it records a [`LookupDelta`]
//! (property sets, item adds, removes and metadata modifications). Reads walk
//! the project tier and then every scope bottom-up; leaving a scope folds its
//! delta into the scope below, or into the project tier when it was the last
//! one.
//!
//! Target batches get isolation by cloning the lookup, running in a fresh
//! scope, and handing the delta back with [`Lookup::take_scope`]. The caller
//! applies all bucket deltas once every bucket is done.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::errors::{BuildError, Result};
use crate::evaluation::item::{ItemId, ProjectItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    /// Escaped value, exactly as produced by expansion.
    pub value: String,
}

/// Evaluated project-level properties and items.
#[derive(Debug, Clone, Default)]
pub struct ProjectState {
    properties: IndexMap<String, Property>,
    read_only: HashSet<String>,
    items: IndexMap<String, Vec<ProjectItem>>,
}

impl ProjectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property; returns `false` if the name is read-only.
    pub fn set_property(&mut self, name: &str, value: impl Into<String>) -> bool {
        let key = name.to_lowercase();
        if self.read_only.contains(&key) {
            return false;
        }
        self.properties.insert(
            key,
            Property {
                name: name.to_string(),
                value: value.into(),
            },
        );
        true
    }

    /// Set a property and mark it read-only (global properties).
    pub fn set_read_only_property(&mut self, name: &str, value: impl Into<String>) {
        let key = name.to_lowercase();
        self.read_only.remove(&key);
        self.set_property(name, value);
        self.read_only.insert(key);
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        self.read_only.contains(&name.to_lowercase())
    }

    pub fn get_property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(&name.to_lowercase())
            .map(|p| p.value.as_str())
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    pub fn add_item(&mut self, item: ProjectItem) {
        self.items
            .entry(item.item_type().to_lowercase())
            .or_default()
            .push(item);
    }

    pub fn items_of(&self, item_type: &str) -> &[ProjectItem] {
        self.items
            .get(&item_type.to_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn remove_items_where(&mut self, mut predicate: impl FnMut(&ProjectItem) -> bool) {
        for list in self.items.values_mut() {
            list.retain(|i| !predicate(i));
        }
    }

    fn item_mut(&mut self, id: ItemId) -> Option<&mut ProjectItem> {
        self.items
            .values_mut()
            .flat_map(|v| v.iter_mut())
            .find(|i| i.id() == id)
    }

    fn commit(&mut self, delta: LookupDelta) {
        for (_, property) in delta.properties {
            if !self.set_property(&property.name, property.value) {
                debug!(property = %property.name, "ignoring write to read-only property");
            }
        }
        if !delta.removes.is_empty() {
            self.remove_items_where(|i| delta.removes.contains(&i.id()));
        }
        for (id, changes) in delta.modifies {
            if let Some(item) = self.item_mut(id) {
                apply_modifications(item, &changes);
            }
        }
        for (_, items) in delta.adds {
            for item in items {
                self.add_item(item);
            }
        }
    }
}

/// Metadata changes keyed by metadata name; `None` removes the metadatum.
pub type MetadataModifications = IndexMap<String, Option<String>>;

fn apply_modifications(item: &mut ProjectItem, changes: &MetadataModifications) {
    for (name, value) in changes {
        match value {
            Some(v) => item.set_metadata(name.clone(), v.clone()),
            None => item.remove_metadata(name),
        }
    }
}

fn merge_modifications(into: &mut MetadataModifications, from: &MetadataModifications) {
    for (name, value) in from {
        match into.keys().position(|k| k.eq_ignore_ascii_case(name)) {
            Some(idx) => {
                if let Some((_, existing)) = into.get_index_mut(idx) {
                    *existing = value.clone();
                }
            }
            None => {
                into.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Changes recorded by one lookup scope.
#[derive(Debug, Clone, Default)]
pub struct LookupDelta {
    properties: IndexMap<String, Property>,
    adds: IndexMap<String, Vec<ProjectItem>>,
    removes: HashSet<ItemId>,
    modifies: HashMap<ItemId, MetadataModifications>,
}

impl LookupDelta {
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
            && self.adds.is_empty()
            && self.removes.is_empty()
            && self.modifies.is_empty()
    }

    /// Items added in this delta, in insertion order.
    pub fn added_items(&self) -> impl Iterator<Item = &ProjectItem> {
        self.adds.values().flat_map(|v| v.iter())
    }

    fn added_mut(&mut self, id: ItemId) -> Option<&mut ProjectItem> {
        self.adds
            .values_mut()
            .flat_map(|v| v.iter_mut())
            .find(|i| i.id() == id)
    }

    fn drop_added(&mut self, id: ItemId) -> bool {
        for list in self.adds.values_mut() {
            if let Some(pos) = list.iter().position(|i| i.id() == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    fn record_remove(&mut self, id: ItemId) {
        if !self.drop_added(id) {
            self.removes.insert(id);
            self.modifies.remove(&id);
        }
    }

    fn record_modify(&mut self, id: ItemId, changes: &MetadataModifications) {
        match self.added_mut(id) {
            Some(item) => apply_modifications(item, changes),
            None => merge_modifications(self.modifies.entry(id).or_default(), changes),
        }
    }

    /// Fold `child` (recorded on top of `self`) into `self`.
    fn merge(&mut self, child: LookupDelta) {
        for (key, property) in child.properties {
            self.properties.insert(key, property);
        }
        for id in child.removes {
            self.record_remove(id);
        }
        for (id, changes) in child.modifies {
            self.record_modify(id, &changes);
        }
        for (key, items) in child.adds {
            self.adds.entry(key).or_default().extend(items);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lookup {
    project: Arc<ProjectState>,
    scopes: Vec<LookupDelta>,
}

impl Lookup {
    pub fn new(project: Arc<ProjectState>) -> Self {
        Self {
            project,
            scopes: Vec::new(),
        }
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn enter_scope(&mut self, description: &str) {
        trace!(scope = %description, depth = self.scopes.len() + 1, "entering lookup scope");
        self.scopes.push(LookupDelta::default());
    }

    /// Pop the top scope and fold its changes into the tier below.
    pub fn leave_scope(&mut self) -> Result<()> {
        let delta = self.take_scope()?;
        self.apply_delta(delta);
        Ok(())
    }

    /// Pop the top scope and return its changes without applying them.
    pub fn take_scope(&mut self) -> Result<LookupDelta> {
        self.scopes
            .pop()
            .ok_or_else(|| BuildError::internal("leaving a lookup scope that was never entered"))
    }

    /// Apply a delta taken from a clone of this lookup to the current top tier.
    pub fn apply_delta(&mut self, delta: LookupDelta) {
        match self.scopes.last_mut() {
            Some(top) => top.merge(delta),
            None => Arc::make_mut(&mut self.project).commit(delta),
        }
    }

    /// Snapshot of the project tier (scopes not included).
    pub fn project_state(&self) -> &Arc<ProjectState> {
        &self.project
    }

    pub fn get_property(&self, name: &str) -> Option<String> {
        let key = name.to_lowercase();
        if !self.project.read_only.contains(&key) {
            for scope in self.scopes.iter().rev() {
                if let Some(p) = scope.properties.get(&key) {
                    return Some(p.value.clone());
                }
            }
        }
        self.project.get_property(name).map(|s| s.to_string())
    }

    /// Set a property in the top scope; returns `false` for read-only names.
    pub fn set_property(&mut self, name: &str, value: impl Into<String>) -> bool {
        if self.project.is_read_only(name) {
            debug!(property = %name, "ignoring write to read-only property");
            return false;
        }
        let property = Property {
            name: name.to_string(),
            value: value.into(),
        };
        match self.scopes.last_mut() {
            Some(top) => {
                top.properties.insert(name.to_lowercase(), property);
            }
            None => {
                Arc::make_mut(&mut self.project).set_property(name, property.value);
            }
        }
        true
    }

    pub fn is_read_only_property(&self, name: &str) -> bool {
        self.project.is_read_only(name)
    }

    /// Current items of a type, in order.
    pub fn get_items(&self, item_type: &str) -> Vec<ProjectItem> {
        let key = item_type.to_lowercase();
        let mut items: Vec<ProjectItem> = self.project.items_of(item_type).to_vec();
        for scope in self.scopes.iter() {
            if !scope.removes.is_empty() {
                items.retain(|i| !scope.removes.contains(&i.id()));
            }
            if !scope.modifies.is_empty() {
                for item in items.iter_mut() {
                    if let Some(changes) = scope.modifies.get(&item.id()) {
                        apply_modifications(item, changes);
                    }
                }
            }
            if let Some(adds) = scope.adds.get(&key) {
                items.extend(adds.iter().cloned());
            }
        }
        items
    }

    pub fn add_new_item(&mut self, item: ProjectItem) {
        match self.scopes.last_mut() {
            Some(top) => top
                .adds
                .entry(item.item_type().to_lowercase())
                .or_default()
                .push(item),
            None => Arc::make_mut(&mut self.project).add_item(item),
        }
    }

    pub fn add_new_items(&mut self, items: impl IntoIterator<Item = ProjectItem>) {
        for item in items {
            self.add_new_item(item);
        }
    }

    pub fn remove_items(&mut self, items: &[ProjectItem]) {
        if items.is_empty() {
            return;
        }
        match self.scopes.last_mut() {
            Some(top) => {
                for item in items {
                    top.record_remove(item.id());
                }
            }
            None => {
                let ids: HashSet<ItemId> = items.iter().map(|i| i.id()).collect();
                Arc::make_mut(&mut self.project).remove_items_where(|i| ids.contains(&i.id()));
            }
        }
    }

    pub fn modify_items(&mut self, items: &[ProjectItem], changes: &MetadataModifications) {
        if items.is_empty() || changes.is_empty() {
            return;
        }
        match self.scopes.last_mut() {
            Some(top) => {
                for item in items {
                    top.record_modify(item.id(), changes);
                }
            }
            None => {
                let project = Arc::make_mut(&mut self.project);
                for item in items {
                    if let Some(existing) = project.item_mut(item.id()) {
                        apply_modifications(existing, changes);
                    }
                }
            }
        }
    }
}
