// src/intrinsic/mod.rs

//! Intrinsic tasks: property groups, item groups and choose blocks.
//!
//! The same executors run during project evaluation (against a lookup with
//! no scopes, so writes land in the project tier) and inside targets
//! (against the target's scope, with metadata batching enabled).

pub mod choose;
pub mod item_group;
pub mod property_group;

use std::path::Path;

use crate::errors::{ElementLocation, Result};
use crate::evaluation::{evaluate_condition, Expander, Lookup};
use crate::fs::FileSystem;

pub use choose::{execute_choose, EvaluationPass};
pub use item_group::execute_item_group;
pub use property_group::execute_property_group;

/// Environment shared by the intrinsic executors.
#[derive(Debug, Clone, Copy)]
pub struct IntrinsicContext<'a> {
    pub file_system: &'a dyn FileSystem,
    pub base_dir: &'a Path,
    /// Inside a target: metadata batching applies and bare item elements
    /// modify existing items.
    pub in_target: bool,
}

impl<'a> IntrinsicContext<'a> {
    pub fn evaluation(file_system: &'a dyn FileSystem, base_dir: &'a Path) -> Self {
        Self {
            file_system,
            base_dir,
            in_target: false,
        }
    }

    pub fn target(file_system: &'a dyn FileSystem, base_dir: &'a Path) -> Self {
        Self {
            file_system,
            base_dir,
            in_target: true,
        }
    }

    pub fn expander<'l>(&self, lookup: &'l Lookup) -> Expander<'l>
    where
        'a: 'l,
    {
        Expander::new(lookup).with_file_system(self.file_system, self.base_dir)
    }

    /// Evaluate a group-level condition, where metadata is never allowed.
    pub fn group_condition(
        &self,
        condition: Option<&str>,
        lookup: &Lookup,
        location: &ElementLocation,
    ) -> Result<bool> {
        match condition {
            None => Ok(true),
            Some(c) => {
                let expander = self.expander(lookup).without_metadata();
                evaluate_condition(c, &expander, &location.child("condition"))
            }
        }
    }
}
