// src/registry/factory.rs

//! Task factories.
//!
//! A registration names a factory; the factory turns the registration into a
//! [`TaskType`] (declared parameters plus a constructor). Factories are
//! looked up by name in a [`FactoryRegistry`]:
//!
//! - `AssemblyTaskFactory` resolves tasks from a [`TaskLibraryCatalog`]
//! - `TaskHostFactory` resolves the same way but always runs out of process
//! - `RoslynCodeTaskFactory` / `CodeTaskFactory` build inline tasks from the
//!   declaration's task body
//! - `XamlTaskFactory` builds command-line tasks from the task body

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::registry::identity::RegisteredTaskIdentity;
use crate::registry::record::{RegisteredTaskRecord, TaskPropertyInfo, DEFAULT_FACTORY};
use crate::tasks::builtin;
use crate::tasks::command_line::CommandLineTaskDefinition;
use crate::tasks::inline::InlineTaskDefinition;
use crate::tasks::Task;

/// Name of the library holding the built-in tasks.
pub const CORE_TASKS_LIBRARY: &str = "Microsoft.Build.Tasks.Core";

pub const TASK_HOST_FACTORY: &str = "TaskHostFactory";
pub const ROSLYN_CODE_TASK_FACTORY: &str = "RoslynCodeTaskFactory";
pub const CODE_TASK_FACTORY: &str = "CodeTaskFactory";
pub const XAML_TASK_FACTORY: &str = "XamlTaskFactory";

type TaskConstructor = dyn Fn() -> Box<dyn Task> + Send + Sync;

/// A loadable task: its declared parameters and a constructor.
#[derive(Clone)]
pub struct TaskType {
    name: String,
    parameters: Vec<TaskPropertyInfo>,
    constructor: Arc<TaskConstructor>,
}

impl TaskType {
    pub fn new<F>(name: impl Into<String>, parameters: Vec<TaskPropertyInfo>, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn Task> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parameters,
            constructor: Arc::new(constructor),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[TaskPropertyInfo] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&TaskPropertyInfo> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn create(&self) -> Box<dyn Task> {
        (self.constructor)()
    }
}

impl fmt::Debug for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskType")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// A named set of task types, standing in for a task assembly.
#[derive(Debug, Clone, Default)]
pub struct TaskLibrary {
    name: String,
    tasks: IndexMap<String, TaskType>,
}

impl TaskLibrary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: IndexMap::new(),
        }
    }

    pub fn with_task(mut self, task_type: TaskType) -> Self {
        self.add(task_type);
        self
    }

    pub fn add(&mut self, task_type: TaskType) {
        self.tasks.insert(task_type.name().to_lowercase(), task_type);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.values().map(|t| t.name())
    }

    /// Find a task by full or short name.
    pub fn find(&self, name: &str) -> Option<&TaskType> {
        if let Some(t) = self.tasks.get(&name.to_lowercase()) {
            return Some(t);
        }
        let short = name.rsplit('.').next().unwrap_or(name);
        self.tasks
            .values()
            .find(|t| RegisteredTaskIdentity::name_matches(t.name(), short))
    }
}

/// All task libraries known to the process.
#[derive(Debug, Clone, Default)]
pub struct TaskLibraryCatalog {
    libraries: IndexMap<String, TaskLibrary>,
}

impl TaskLibraryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding only the core task library.
    pub fn with_core_tasks() -> Self {
        let mut catalog = Self::new();
        catalog.add_library(builtin::core_library());
        catalog
    }

    pub fn add_library(&mut self, library: TaskLibrary) {
        self.libraries.insert(library.name().to_lowercase(), library);
    }

    pub fn library(&self, name: &str) -> Option<&TaskLibrary> {
        self.libraries.get(&name.to_lowercase())
    }
}

pub trait TaskFactory: Send + Sync + fmt::Debug {
    fn factory_name(&self) -> &str;

    /// Produce the task type for a registration. `Ok(None)` means the
    /// factory could not supply one.
    fn create_task_type(&self, record: &RegisteredTaskRecord) -> Result<Option<TaskType>>;

    /// Tasks from this factory always run in a task host.
    fn requires_task_host(&self) -> bool {
        false
    }
}

fn resolve_from_catalog(
    catalog: &TaskLibraryCatalog,
    record: &RegisteredTaskRecord,
) -> Result<Option<TaskType>> {
    let Some(library_name) = record.assembly.library_name() else {
        return Err(BuildError::invalid_project(
            codes::TASK_ASSEMBLY_NOT_FOUND,
            &record.location,
            format!(
                "the task \"{}\" could not be loaded because no assembly name or file was declared",
                record.task_name()
            ),
        ));
    };
    let Some(library) = catalog.library(&library_name) else {
        return Err(BuildError::invalid_project(
            codes::TASK_ASSEMBLY_NOT_FOUND,
            &record.location,
            format!(
                "the task \"{}\" could not be loaded from the assembly \"{}\"",
                record.task_name(),
                record.assembly
            ),
        ));
    };
    match library.find(record.task_name()) {
        Some(task_type) => Ok(Some(task_type.clone())),
        None => {
            debug!(task = %record.task_name(), library = %library_name, "task not present in library");
            Err(BuildError::invalid_project(
                codes::TASK_ASSEMBLY_NOT_FOUND,
                &record.location,
                format!(
                    "the task \"{}\" could not be found in the assembly \"{}\"",
                    record.task_name(),
                    record.assembly
                ),
            ))
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssemblyTaskFactory {
    catalog: Arc<TaskLibraryCatalog>,
}

impl AssemblyTaskFactory {
    pub fn new(catalog: Arc<TaskLibraryCatalog>) -> Self {
        Self { catalog }
    }
}

impl TaskFactory for AssemblyTaskFactory {
    fn factory_name(&self) -> &str {
        DEFAULT_FACTORY
    }

    fn create_task_type(&self, record: &RegisteredTaskRecord) -> Result<Option<TaskType>> {
        resolve_from_catalog(&self.catalog, record)
    }
}

#[derive(Debug, Clone)]
pub struct TaskHostFactory {
    catalog: Arc<TaskLibraryCatalog>,
}

impl TaskHostFactory {
    pub fn new(catalog: Arc<TaskLibraryCatalog>) -> Self {
        Self { catalog }
    }
}

impl TaskFactory for TaskHostFactory {
    fn factory_name(&self) -> &str {
        TASK_HOST_FACTORY
    }

    fn create_task_type(&self, record: &RegisteredTaskRecord) -> Result<Option<TaskType>> {
        resolve_from_catalog(&self.catalog, record)
    }

    fn requires_task_host(&self) -> bool {
        true
    }
}

/// Inline tasks defined by the declaration's task body.
#[derive(Debug, Clone)]
pub struct InlineTaskFactory {
    name: &'static str,
}

impl InlineTaskFactory {
    pub fn roslyn() -> Self {
        Self {
            name: ROSLYN_CODE_TASK_FACTORY,
        }
    }

    pub fn code() -> Self {
        Self {
            name: CODE_TASK_FACTORY,
        }
    }
}

impl TaskFactory for InlineTaskFactory {
    fn factory_name(&self) -> &str {
        self.name
    }

    fn create_task_type(&self, record: &RegisteredTaskRecord) -> Result<Option<TaskType>> {
        let Some(group) = record.parameter_group_and_body.as_ref() else {
            return Ok(None);
        };
        let Some(body) = group.body.as_deref() else {
            return Ok(None);
        };
        let definition = Arc::new(InlineTaskDefinition::parse(
            record.task_name(),
            body,
            &group.parameters,
            &record.location,
        )?);
        let ctor_definition = Arc::clone(&definition);
        Ok(Some(TaskType::new(
            record.task_name(),
            group.parameters.clone(),
            move || ctor_definition.instantiate(),
        )))
    }
}

/// Command-line tasks described by the declaration's task body.
#[derive(Debug, Clone, Default)]
pub struct XamlTaskFactory;

impl TaskFactory for XamlTaskFactory {
    fn factory_name(&self) -> &str {
        XAML_TASK_FACTORY
    }

    fn create_task_type(&self, record: &RegisteredTaskRecord) -> Result<Option<TaskType>> {
        let Some(group) = record.parameter_group_and_body.as_ref() else {
            return Ok(None);
        };
        let body = group.body.as_deref().unwrap_or("");
        if body.trim().is_empty() {
            return Ok(None);
        }
        let definition = Arc::new(CommandLineTaskDefinition::parse(
            record.task_name(),
            body,
            &group.parameters,
            &record.location,
        )?);
        let parameters = definition.parameters();
        let ctor_definition = Arc::clone(&definition);
        Ok(Some(TaskType::new(
            record.task_name(),
            parameters,
            move || ctor_definition.instantiate(),
        )))
    }
}

/// Factories available to the registry, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct FactoryRegistry {
    factories: IndexMap<String, Arc<dyn TaskFactory>>,
}

impl FactoryRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// All standard factories over the given library catalog.
    pub fn with_defaults(catalog: Arc<TaskLibraryCatalog>) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(AssemblyTaskFactory::new(Arc::clone(&catalog))));
        registry.register(Arc::new(TaskHostFactory::new(catalog)));
        registry.register(Arc::new(InlineTaskFactory::roslyn()));
        registry.register(Arc::new(InlineTaskFactory::code()));
        registry.register(Arc::new(XamlTaskFactory));
        registry
    }

    pub fn register(&mut self, factory: Arc<dyn TaskFactory>) {
        self.factories
            .insert(factory.factory_name().to_lowercase(), factory);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskFactory>> {
        let key = if name.trim().is_empty() {
            DEFAULT_FACTORY.to_lowercase()
        } else {
            name.trim().to_lowercase()
        };
        self.factories.get(&key).cloned()
    }

    pub fn factory_for(&self, record: &RegisteredTaskRecord) -> Result<Arc<dyn TaskFactory>> {
        self.get(record.effective_factory_name()).ok_or_else(|| {
            BuildError::invalid_project(
                codes::UNKNOWN_TASK_FACTORY,
                &record.location,
                format!(
                    "the task factory \"{}\" could not be found for the task \"{}\"",
                    record.effective_factory_name(),
                    record.task_name()
                ),
            )
        })
    }

    /// Task type for a registration, created once and cached on the record.
    pub fn task_type_for(
        &self,
        record: &RegisteredTaskRecord,
        location: &ElementLocation,
    ) -> Result<TaskType> {
        if let Some(task_type) = record.cached_task_type() {
            return Ok(task_type.clone());
        }
        let factory = self.factory_for(record)?;
        match factory.create_task_type(record)? {
            Some(task_type) => Ok(record.cache_task_type(task_type)),
            None => Err(BuildError::invalid_project(
                codes::TASK_FACTORY_NULL_TASK_TYPE,
                location,
                format!(
                    "the task factory \"{}\" did not supply a TaskType for the task \"{}\"; a factory must return a TaskType when asked",
                    factory.factory_name(),
                    record.task_name()
                ),
            )),
        }
    }
}
