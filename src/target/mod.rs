// src/target/mod.rs

//! Target execution.
//!
//! - [`entry::TargetEntry`]: per-target state machine
//! - [`builder::TargetBuilder`]: drives entries off an explicit stack
//! - [`task_builder::TaskBuilder`]: pluggable execution of a single task
//!
//! Everything here is synchronous. The request layer supplies the outside
//! world through [`RequestCallbacks`].

pub mod builder;
pub mod callbacks;
pub mod entry;
pub mod result;
pub mod task_builder;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ElementLocation;

pub use builder::TargetBuilder;
pub use callbacks::RequestCallbacks;
pub use entry::{TargetEntry, TargetEntryState};
pub use result::{
    TargetResult, TargetResultCode, TargetResults, WorkUnitActionCode, WorkUnitResult,
    WorkUnitResultCode,
};
pub use task_builder::{ContinueOnError, DefaultTaskBuilder, TaskBuilder, TaskContext};

/// A target name together with where it was referenced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpecification {
    pub name: String,
    pub location: ElementLocation,
}

impl TargetSpecification {
    pub fn new(name: impl Into<String>, location: ElementLocation) -> Self {
        Self {
            name: name.into(),
            location,
        }
    }
}

/// Why a target was put on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetBuiltReason {
    /// Requested directly, or an initial/default target.
    None,
    DependsOn,
    BeforeTargets,
    AfterTargets,
    OnError,
}

impl fmt::Display for TargetBuiltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetBuiltReason::None => "requested",
            TargetBuiltReason::DependsOn => "depends on",
            TargetBuiltReason::BeforeTargets => "before targets",
            TargetBuiltReason::AfterTargets => "after targets",
            TargetBuiltReason::OnError => "on error",
        };
        f.write_str(s)
    }
}
