// src/registry/record.rs

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::errors::ElementLocation;
use crate::registry::factory::TaskType;
use crate::registry::identity::{AssemblyLoadInfo, RegisteredTaskIdentity, TaskFactoryParameters};
use crate::registry::param_types::TaskParameterType;

/// Factory used when a declaration names none.
pub const DEFAULT_FACTORY: &str = "AssemblyTaskFactory";

/// One declared task parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPropertyInfo {
    pub name: String,
    pub parameter_type: TaskParameterType,
    pub output: bool,
    pub required: bool,
}

impl TaskPropertyInfo {
    pub fn input(name: impl Into<String>, parameter_type: TaskParameterType) -> Self {
        Self {
            name: name.into(),
            parameter_type,
            output: false,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn output(name: impl Into<String>, parameter_type: TaskParameterType) -> Self {
        Self {
            name: name.into(),
            parameter_type,
            output: true,
            required: false,
        }
    }
}

/// Inline parameter group and task body of a using-task declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterGroupAndTaskBody {
    pub parameters: Vec<TaskPropertyInfo>,
    pub body: Option<String>,
    pub body_evaluated: bool,
}

impl ParameterGroupAndTaskBody {
    pub fn parameter(&self, name: &str) -> Option<&TaskPropertyInfo> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// A single registration under a task-name bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredTaskRecord {
    pub identity: RegisteredTaskIdentity,
    pub assembly: AssemblyLoadInfo,
    /// Expanded factory name as declared; empty means [`DEFAULT_FACTORY`].
    pub factory_name: String,
    pub parameter_group_and_body: Option<ParameterGroupAndTaskBody>,
    pub location: ElementLocation,
    /// Position in declaration order across the whole registry.
    pub registration_order: usize,
    #[serde(skip)]
    task_type: OnceLock<TaskType>,
}

impl RegisteredTaskRecord {
    pub fn new(
        name: impl Into<String>,
        parameters: TaskFactoryParameters,
        assembly: AssemblyLoadInfo,
        factory_name: impl Into<String>,
        parameter_group_and_body: Option<ParameterGroupAndTaskBody>,
        location: ElementLocation,
    ) -> Self {
        Self {
            identity: RegisteredTaskIdentity::new(name, parameters),
            assembly,
            factory_name: factory_name.into(),
            parameter_group_and_body,
            location,
            registration_order: 0,
            task_type: OnceLock::new(),
        }
    }

    pub fn task_name(&self) -> &str {
        &self.identity.name
    }

    pub fn factory_parameters(&self) -> &TaskFactoryParameters {
        &self.identity.parameters
    }

    pub fn effective_factory_name(&self) -> &str {
        if self.factory_name.trim().is_empty() {
            DEFAULT_FACTORY
        } else {
            self.factory_name.trim()
        }
    }

    /// Task type resolved earlier through a factory, if any.
    pub fn cached_task_type(&self) -> Option<&TaskType> {
        self.task_type.get()
    }

    pub(crate) fn cache_task_type(&self, task_type: TaskType) -> TaskType {
        self.task_type.get_or_init(|| task_type).clone()
    }
}

impl PartialEq for RegisteredTaskRecord {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
            && self.assembly == other.assembly
            && self.factory_name == other.factory_name
            && self.parameter_group_and_body == other.parameter_group_and_body
            && self.location == other.location
            && self.registration_order == other.registration_order
    }
}
