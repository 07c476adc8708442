// src/registry/mod.rs

//! Task registry.
//!
//! Registrations are grouped into buckets by (case-insensitive) task name, in
//! declaration order. Lookups come in two modes:
//!
//! - exact: the record's factory parameters must equal the request's
//! - fuzzy: absent values and `*` match anything on either side
//!
//! Every lookup, including one that finds nothing, is memoized in a
//! [`TaskRetrievalCache`]. A fuzzy lookup prefers a record whose parameters
//! match the request exactly, then a record an earlier lookup already
//! resolved (if still eligible), then declaration order.

pub mod cache;
pub mod factory;
pub mod identity;
pub mod param_types;
pub mod record;

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::evaluation::{evaluate_condition, Expander};
use crate::project::model::UsingTaskDefinition;
use crate::registry::cache::{RetrievalKey, TaskRetrievalCache};
use crate::registry::factory::CORE_TASKS_LIBRARY;
use crate::registry::identity::RegisteredTaskIdentity;
use crate::registry::param_types::{check_parameter_type, ParameterTypeCheck, TaskParameterType};
use crate::registry::record::{ParameterGroupAndTaskBody, TaskPropertyInfo};
use crate::types::{parse_bool, TaskHostArchitecture, TaskHostRuntime};

pub use factory::{FactoryRegistry, TaskFactory, TaskLibrary, TaskLibraryCatalog, TaskType};
pub use identity::{AssemblyLoadInfo, TaskFactoryParameters};
pub use record::RegisteredTaskRecord;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRegistry {
    tools_version: String,
    registrations: IndexMap<String, Vec<Arc<RegisteredTaskRecord>>>,
    next_order: usize,
    #[serde(skip)]
    cache: TaskRetrievalCache,
}

impl PartialEq for TaskRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.tools_version == other.tools_version
            && self.next_order == other.next_order
            && self.registrations == other.registrations
    }
}

/// Result of [`TaskRegistry::get_task_registration_record`].
#[derive(Debug, Clone)]
pub struct TaskLookup {
    pub record: Option<Arc<RegisteredTaskRecord>>,
    pub retrieved_from_cache: bool,
}

impl TaskRegistry {
    pub fn new(tools_version: impl Into<String>) -> Self {
        Self {
            tools_version: tools_version.into(),
            ..Self::default()
        }
    }

    /// Registry pre-populated with every task of the given library, each
    /// registered by assembly name.
    pub fn with_library(tools_version: impl Into<String>, library: &TaskLibrary) -> Self {
        let mut registry = Self::new(tools_version);
        registry.register_library(library);
        registry
    }

    pub fn register_library(&mut self, library: &TaskLibrary) {
        for name in library.task_names() {
            self.register_task(RegisteredTaskRecord::new(
                name,
                TaskFactoryParameters::new(),
                AssemblyLoadInfo::Name(library.name().to_string()),
                "",
                None,
                ElementLocation::new(library.name(), "built-in"),
            ));
        }
    }

    /// Registry holding the core task library.
    pub fn core(tools_version: impl Into<String>) -> Self {
        Self::with_library(tools_version, &crate::tasks::builtin::core_library())
    }

    pub fn tools_version(&self) -> &str {
        &self.tools_version
    }

    /// Append a record to its name bucket.
    pub fn register_task(&mut self, mut record: RegisteredTaskRecord) -> Arc<RegisteredTaskRecord> {
        record.registration_order = self.next_order;
        self.next_order += 1;
        let record = Arc::new(record);
        trace!(
            task = %record.task_name(),
            parameters = %record.factory_parameters(),
            order = record.registration_order,
            "registered task"
        );
        self.registrations
            .entry(record.task_name().to_lowercase())
            .or_default()
            .push(Arc::clone(&record));
        self.cache.clear();
        record
    }

    /// Evaluate a using-task declaration and, if its condition holds, append
    /// a record for it.
    pub fn register_tasks_from_using_task(
        &mut self,
        declaration: &UsingTaskDefinition,
        expander: &Expander<'_>,
        location: &ElementLocation,
    ) -> Result<()> {
        if let Some(condition) = declaration.condition.as_deref() {
            if !evaluate_condition(condition, expander, location)? {
                debug!(task = %declaration.task_name, %condition, "using-task condition is false");
                return Ok(());
            }
        }

        if declaration.assembly_name.is_some() && declaration.assembly_file.is_some() {
            return Err(BuildError::invalid_project(
                codes::ASSEMBLY_NAME_AND_FILE,
                location,
                format!(
                    "the using-task for \"{}\" must not specify both an assembly name and an assembly file",
                    declaration.task_name
                ),
            ));
        }

        let expand = |value: Option<&String>| -> Result<Option<String>> {
            value
                .map(|v| expander.expand_unescaped(v, location))
                .transpose()
        };

        let task_name = expander.expand_unescaped(&declaration.task_name, location)?;
        let assembly_name = expand(declaration.assembly_name.as_ref())?;
        let assembly_file = expand(declaration.assembly_file.as_ref())?;
        let factory_name = expand(declaration.task_factory.as_ref())?.unwrap_or_default();

        let mut parameters = TaskFactoryParameters::new();
        if let Some(runtime) = expand(declaration.runtime.as_ref())? {
            if !runtime.is_empty() {
                runtime.parse::<TaskHostRuntime>().map_err(|e| {
                    BuildError::invalid_project(codes::INVALID_TASK_HOST_PARAMETER, location, e)
                })?;
                parameters.insert(identity::RUNTIME_PARAMETER, runtime);
            }
        }
        if let Some(architecture) = expand(declaration.architecture.as_ref())? {
            if !architecture.is_empty() {
                architecture.parse::<TaskHostArchitecture>().map_err(|e| {
                    BuildError::invalid_project(codes::INVALID_TASK_HOST_PARAMETER, location, e)
                })?;
                parameters.insert(identity::ARCHITECTURE_PARAMETER, architecture);
            }
        }

        let parameter_group_and_body =
            Self::evaluate_parameter_group(declaration, expander, location)?;

        let record = RegisteredTaskRecord::new(
            task_name,
            parameters,
            AssemblyLoadInfo::create(assembly_name, assembly_file),
            factory_name,
            parameter_group_and_body,
            location.clone(),
        );
        self.register_task(record);
        Ok(())
    }

    fn evaluate_parameter_group(
        declaration: &UsingTaskDefinition,
        expander: &Expander<'_>,
        location: &ElementLocation,
    ) -> Result<Option<ParameterGroupAndTaskBody>> {
        if declaration.parameter_group.is_none() && declaration.task.is_none() {
            return Ok(None);
        }

        let mut group = ParameterGroupAndTaskBody::default();
        for (name, definition) in declaration.parameter_group.iter().flatten() {
            let parameter_location = location.child(format!("parameter '{name}'"));
            let parse_flag = |attribute: &str, raw: Option<&String>| -> Result<bool> {
                let Some(raw) = raw else {
                    return Ok(false);
                };
                let value = expander.expand_unescaped(raw, &parameter_location)?;
                if value.trim().is_empty() {
                    return Ok(false);
                }
                parse_bool(&value).ok_or_else(|| {
                    BuildError::invalid_project(
                        codes::INVALID_BOOLEAN_ATTRIBUTE,
                        &parameter_location,
                        format!(
                            "the \"{attribute}\" attribute of parameter \"{name}\" has value \"{value}\", which is not a boolean"
                        ),
                    )
                })
            };
            let output = parse_flag("Output", definition.output.as_ref())?;
            let required = parse_flag("Required", definition.required.as_ref())?;

            let type_name = match definition.parameter_type.as_deref() {
                Some(raw) => expander.expand_unescaped(raw, &parameter_location)?,
                None => String::new(),
            };
            let parameter_type = if type_name.trim().is_empty() {
                TaskParameterType::STRING
            } else {
                match check_parameter_type(&type_name) {
                    ParameterTypeCheck::Valid(t) => t,
                    ParameterTypeCheck::Unsupported => {
                        return Err(BuildError::invalid_project(
                            codes::UNSUPPORTED_PARAMETER_TYPE,
                            &parameter_location,
                            format!(
                                "the type \"{type_name}\" of parameter \"{name}\" is not supported; only scalar values, strings and task items (and arrays of them) can be parameters"
                            ),
                        ));
                    }
                    ParameterTypeCheck::Unrecognized => {
                        return Err(BuildError::invalid_project(
                            codes::UNRECOGNIZED_PARAMETER_TYPE,
                            &parameter_location,
                            format!("the type \"{type_name}\" of parameter \"{name}\" was not recognized"),
                        ));
                    }
                }
            };
            group.parameters.push(TaskPropertyInfo {
                name: name.clone(),
                parameter_type,
                output,
                required,
            });
        }

        if let Some(body) = declaration.task.as_ref() {
            let body_location = location.child("task body");
            let evaluate = match body.evaluate.as_deref() {
                None => true,
                Some(raw) => {
                    let value = expander.expand_unescaped(raw, &body_location)?;
                    if value.trim().is_empty() {
                        true
                    } else {
                        parse_bool(&value).ok_or_else(|| {
                            BuildError::invalid_project(
                                codes::INVALID_BOOLEAN_ATTRIBUTE,
                                &body_location,
                                format!("the \"Evaluate\" attribute has value \"{value}\", which is not a boolean"),
                            )
                        })?
                    }
                }
            };
            let contents = if evaluate {
                expander.expand_unescaped(&body.contents, &body_location)?
            } else {
                body.contents.clone()
            };
            group.body = Some(contents);
            group.body_evaluated = evaluate;
        }

        Ok(Some(group))
    }

    /// Look up a registration by name and factory parameters.
    pub fn get_task_registration_record(
        &self,
        task_name: &str,
        parameters: Option<&TaskFactoryParameters>,
        exact_match_required: bool,
    ) -> TaskLookup {
        let empty = TaskFactoryParameters::new();
        let requested = parameters.unwrap_or(&empty);
        let key = RetrievalKey::new(task_name, exact_match_required, requested);

        if let Some(record) = self.cache.get(&key) {
            trace!(task = %task_name, found = record.is_some(), "task lookup served from cache");
            return TaskLookup {
                record,
                retrieved_from_cache: true,
            };
        }

        let candidates = self.candidates(task_name);
        let exact = candidates
            .iter()
            .find(|r| r.factory_parameters().matches_exactly(requested))
            .cloned();

        let record = if exact_match_required {
            exact
        } else {
            exact
                .or_else(|| {
                    self.cache
                        .resolutions_for(task_name)
                        .into_iter()
                        .find(|r| r.factory_parameters().matches_fuzzy(requested))
                })
                .or_else(|| {
                    candidates
                        .iter()
                        .find(|r| r.factory_parameters().matches_fuzzy(requested))
                        .cloned()
                })
        };

        debug!(
            task = %task_name,
            exact = exact_match_required,
            parameters = %requested,
            found = record.is_some(),
            "resolved task registration"
        );
        self.cache.insert(key, record.clone());
        TaskLookup {
            record,
            retrieved_from_cache: false,
        }
    }

    /// Records whose name matches, in declaration order. A short name also
    /// matches fully-qualified registrations.
    fn candidates(&self, task_name: &str) -> Vec<Arc<RegisteredTaskRecord>> {
        if let Some(bucket) = self.registrations.get(&task_name.to_lowercase()) {
            return bucket.clone();
        }
        let mut found: Vec<Arc<RegisteredTaskRecord>> = self
            .registrations
            .values()
            .flatten()
            .filter(|r| RegisteredTaskIdentity::name_matches(r.task_name(), task_name))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.registration_order);
        found
    }

    /// All buckets, keyed by lower-cased task name.
    pub fn task_registrations(&self) -> &IndexMap<String, Vec<Arc<RegisteredTaskRecord>>> {
        &self.registrations
    }

    pub fn records_for(&self, task_name: &str) -> &[Arc<RegisteredTaskRecord>] {
        self.registrations
            .get(&task_name.to_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Number of records across all buckets.
    pub fn get_deep_count_of_registered_tasks(&self) -> usize {
        self.registrations.values().map(|v| v.len()).sum()
    }

    pub fn cache(&self) -> &TaskRetrievalCache {
        &self.cache
    }

    /// Whether any registration exists for the core library.
    pub fn has_core_tasks(&self) -> bool {
        self.registrations
            .values()
            .flatten()
            .any(|r| r.assembly.library_name().as_deref() == Some(CORE_TASKS_LIBRARY))
    }
}
