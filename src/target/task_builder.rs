// src/target/task_builder.rs

//! Running one task invocation of a target.
//!
//! [`TaskBuilder`] is the seam between target execution and tasks; tests
//! swap in a scripted implementation. [`DefaultTaskBuilder`] does the real
//! work:
//! 1. batch the invocation over the metadata it references
//! 2. evaluate the condition and `ContinueOnError`
//! 3. resolve the task through the project's registry and a factory
//! 4. bind parameters against their declared types
//! 5. run the task in process or in a task host
//! 6. bind outputs to items and properties

use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::evaluation::item::escape;
use crate::evaluation::{bucketize, evaluate_condition, Bucket, Expander, Lookup, ProjectItem};
use crate::events::BuildEvent;
use crate::node::{NodeManager, NodeProvider, TaskHostProxy};
use crate::project::model::TaskInvocation;
use crate::project::{is_reserved_property, ProjectInstance, LAST_TASK_RESULT_PROPERTY};
use crate::registry::factory::TaskType;
use crate::registry::identity::{ARCHITECTURE_PARAMETER, RUNTIME_PARAMETER};
use crate::registry::param_types::TaskParameterValue;
use crate::registry::{FactoryRegistry, RegisteredTaskRecord, TaskFactoryParameters};
use crate::target::result::{WorkUnitActionCode, WorkUnitResult};
use crate::tasks::{BuildEngine, Task};
use crate::types::{TaskHostArchitecture, TaskHostRuntime};

/// What happens after a task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinueOnError {
    /// Log the failure and stop the target.
    #[default]
    ErrorAndStop,
    /// Downgrade the failure to a warning and keep going.
    WarnAndContinue,
    /// Keep going, but the target still fails.
    ErrorAndContinue,
}

impl FromStr for ContinueOnError {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "false" | "errorandstop" => Ok(ContinueOnError::ErrorAndStop),
            "true" | "warnandcontinue" => Ok(ContinueOnError::WarnAndContinue),
            "errorandcontinue" => Ok(ContinueOnError::ErrorAndContinue),
            other => Err(format!(
                "\"{other}\" is not a valid ContinueOnError value (expected true, false, WarnAndContinue, ErrorAndContinue or ErrorAndStop)"
            )),
        }
    }
}

/// Everything a task invocation runs against.
pub struct TaskContext<'a> {
    pub project: &'a ProjectInstance,
    pub target: &'a str,
    pub lookup: &'a mut Lookup,
    /// Bucket of the enclosing target batch; trivial when the target does
    /// not batch.
    pub target_bucket: &'a Bucket,
    pub location: ElementLocation,
    pub engine: &'a mut dyn BuildEngine,
}

pub trait TaskBuilder: Send + Sync {
    fn execute_task(&self, invocation: &TaskInvocation, ctx: &mut TaskContext<'_>) -> Result<WorkUnitResult>;
}

/// Where a task output goes.
#[derive(Debug, Clone)]
enum OutputBinding {
    Item(String),
    Property(String),
}

/// Parameters bound, outputs resolved, ready to instantiate.
struct PreparedTask {
    record: Arc<RegisteredTaskRecord>,
    task_type: TaskType,
    requested: TaskFactoryParameters,
    values: IndexMap<String, TaskParameterValue>,
    continue_on_error: ContinueOnError,
    outputs: Vec<(String, OutputBinding)>,
}

#[derive(Debug, Clone)]
pub struct DefaultTaskBuilder {
    factories: Arc<FactoryRegistry>,
    node_provider: Arc<NodeProvider>,
    node_manager: Arc<NodeManager>,
}

impl DefaultTaskBuilder {
    pub fn new(
        factories: Arc<FactoryRegistry>,
        node_provider: Arc<NodeProvider>,
        node_manager: Arc<NodeManager>,
    ) -> Self {
        Self {
            factories,
            node_provider,
            node_manager,
        }
    }

    pub fn node_provider(&self) -> &Arc<NodeProvider> {
        &self.node_provider
    }

    pub fn node_manager(&self) -> &Arc<NodeManager> {
        &self.node_manager
    }

    fn execute_bucket(
        &self,
        invocation: &TaskInvocation,
        ctx: &mut TaskContext<'_>,
        bucket: &Bucket,
    ) -> Result<WorkUnitResult> {
        let location = ctx.location.clone();
        let Some(prepared) = self.prepare(invocation, ctx, bucket, &location)? else {
            trace!(task = %invocation.name, target = %ctx.target, "task condition is false");
            return Ok(WorkUnitResult::skipped());
        };

        let mut task = self.instantiate(invocation, &prepared, ctx.project, &location)?;
        for (name, value) in prepared.values.iter() {
            task.set_parameter(name, value.clone()).map_err(|message| {
                BuildError::invalid_project(codes::INVALID_ATTRIBUTE_VALUE, &location, message)
            })?;
        }

        let project_file = ctx.project.file();
        ctx.engine.log(BuildEvent::TaskStarted {
            project_file: project_file.clone(),
            target: ctx.target.to_string(),
            task: invocation.name.clone(),
        });
        let succeeded = match task.execute(&mut *ctx.engine) {
            Ok(succeeded) => succeeded,
            Err(BuildError::Cancelled) => {
                debug!(task = %invocation.name, "task canceled");
                return Ok(WorkUnitResult::canceled());
            }
            Err(err @ BuildError::Internal(_)) => return Err(err),
            Err(err) if err.is_invalid_project() => {
                ctx.engine.log(BuildEvent::error(err.code(), err.to_string(), Some(project_file.as_str())));
                false
            }
            Err(err) => {
                ctx.engine.log(BuildEvent::error(
                    Some(codes::TASK_EXECUTION_FAILED),
                    format!("the \"{}\" task failed unexpectedly: {err}", invocation.name),
                    Some(project_file.as_str()),
                ));
                false
            }
        };
        ctx.engine.log(BuildEvent::TaskFinished {
            project_file,
            target: ctx.target.to_string(),
            task: invocation.name.clone(),
            succeeded,
        });

        if succeeded || prepared.continue_on_error != ContinueOnError::ErrorAndStop {
            bind_outputs(task.as_ref(), &prepared.outputs, ctx.lookup, &location)?;
        }
        ctx.lookup
            .set_property(LAST_TASK_RESULT_PROPERTY, if succeeded { "true" } else { "false" });

        if succeeded {
            return Ok(WorkUnitResult::success());
        }
        Ok(match prepared.continue_on_error {
            ContinueOnError::ErrorAndStop => WorkUnitResult::failed_and_stop(),
            ContinueOnError::ErrorAndContinue => WorkUnitResult::failed_and_continue(),
            ContinueOnError::WarnAndContinue => {
                ctx.engine.log_warning(
                    None,
                    &format!(
                        "the \"{}\" task failed; continuing because ContinueOnError is set",
                        invocation.name
                    ),
                );
                WorkUnitResult::success()
            }
        })
    }

    /// Read-only half of the invocation: condition, resolution, binding.
    /// `None` when the condition is false.
    fn prepare(
        &self,
        invocation: &TaskInvocation,
        ctx: &TaskContext<'_>,
        bucket: &Bucket,
        location: &ElementLocation,
    ) -> Result<Option<PreparedTask>> {
        let project = ctx.project;
        let expander = Expander::new(ctx.lookup)
            .with_file_system(project.file_system().as_ref(), project.directory())
            .with_bucket(bucket);

        let condition = invocation.condition.as_deref().unwrap_or("");
        if !evaluate_condition(condition, &expander, &location.child("condition"))? {
            return Ok(None);
        }

        let raw_continue = invocation.continue_on_error.as_deref().unwrap_or("");
        let continue_on_error = expander
            .expand_unescaped(raw_continue, location)?
            .parse::<ContinueOnError>()
            .map_err(|message| BuildError::invalid_project(codes::INVALID_ATTRIBUTE_VALUE, location, message))?;

        let requested = requested_parameters(invocation, &expander, location)?;
        let lookup = project
            .registry()
            .get_task_registration_record(&invocation.name, Some(&requested), false);
        let Some(record) = lookup.record else {
            return Err(BuildError::invalid_project(
                codes::TASK_NOT_FOUND,
                location,
                format!(
                    "the \"{}\" task was not found; check that a using_task declaration registers it",
                    invocation.name
                ),
            ));
        };
        trace!(task = %invocation.name, cached = lookup.retrieved_from_cache, "task resolved");
        let task_type = self.factories.task_type_for(&record, location)?;

        let mut values = IndexMap::new();
        for (name, raw) in invocation.parameters.iter() {
            let info = task_type.parameter(name).ok_or_else(|| {
                BuildError::invalid_project(
                    codes::UNKNOWN_TASK_PARAMETER,
                    location,
                    format!("the \"{}\" task does not support the \"{name}\" parameter", invocation.name),
                )
            })?;
            let items = expander.expand_into_task_items(raw, location)?;
            let converted = info.parameter_type.convert(items).map_err(|message| {
                BuildError::invalid_project(
                    codes::INVALID_ATTRIBUTE_VALUE,
                    location,
                    format!("the \"{name}\" parameter of the \"{}\" task: {message}", invocation.name),
                )
            })?;
            if let Some(value) = converted {
                values.insert(info.name.clone(), value);
            }
        }
        for info in task_type.parameters().iter().filter(|p| p.required) {
            if !values.keys().any(|k| k.eq_ignore_ascii_case(&info.name)) {
                return Err(BuildError::invalid_project(
                    codes::MISSING_REQUIRED_PARAMETER,
                    location,
                    format!(
                        "the \"{}\" task was not given a value for the required parameter \"{}\"",
                        invocation.name, info.name
                    ),
                ));
            }
        }

        let mut outputs = Vec::new();
        for (idx, output) in invocation.output.iter().enumerate() {
            let output_location = location.child(format!("output #{}", idx + 1));
            let declared = task_type
                .parameter(&output.task_parameter)
                .filter(|p| p.output)
                .ok_or_else(|| {
                    BuildError::invalid_project(
                        codes::UNKNOWN_TASK_PARAMETER,
                        &output_location,
                        format!(
                            "the \"{}\" task does not have an output parameter named \"{}\"",
                            invocation.name, output.task_parameter
                        ),
                    )
                })?;
            let binding = match (output.item_name.as_deref(), output.property_name.as_deref()) {
                (Some(item), None) => OutputBinding::Item(expander.expand_unescaped(item, &output_location)?),
                (None, Some(property)) => {
                    OutputBinding::Property(expander.expand_unescaped(property, &output_location)?)
                }
                (Some(_), Some(_)) => {
                    return Err(BuildError::invalid_project(
                        codes::MUTUALLY_EXCLUSIVE_ATTRIBUTES,
                        &output_location,
                        "an output binds either \"item_name\" or \"property_name\", not both",
                    ));
                }
                (None, None) => {
                    return Err(BuildError::invalid_project(
                        codes::MISSING_ATTRIBUTE,
                        &output_location,
                        "an output must name an \"item_name\" or a \"property_name\"",
                    ));
                }
            };
            let output_condition = output.condition.as_deref().unwrap_or("");
            if evaluate_condition(output_condition, &expander, &output_location)? {
                outputs.push((declared.name.clone(), binding));
            }
        }

        Ok(Some(PreparedTask {
            record,
            task_type,
            requested,
            values,
            continue_on_error,
            outputs,
        }))
    }

    fn instantiate(
        &self,
        invocation: &TaskInvocation,
        prepared: &PreparedTask,
        project: &ProjectInstance,
        location: &ElementLocation,
    ) -> Result<Box<dyn Task>> {
        let factory = self.factories.factory_for(&prepared.record)?;
        let (runtime, architecture) = host_identity(&prepared.requested, prepared.record.factory_parameters());
        let out_of_proc = factory.requires_task_host()
            || self.node_provider.requires_task_host(runtime, architecture)
            || self
                .node_provider
                .should_task_execute_out_of_proc(Some(&invocation.name));
        if !out_of_proc {
            return Ok(prepared.task_type.create());
        }
        self.node_provider
            .validate_runtime(runtime, &invocation.name, location)?;
        debug!(
            task = %invocation.name,
            %runtime,
            %architecture,
            "routing task to a task host"
        );
        Ok(Box::new(TaskHostProxy::new(
            Arc::clone(&self.node_manager),
            Arc::clone(&prepared.record),
            runtime,
            architecture,
            project.file(),
            project.directory().to_path_buf(),
        )))
    }
}

impl TaskBuilder for DefaultTaskBuilder {
    fn execute_task(&self, invocation: &TaskInvocation, ctx: &mut TaskContext<'_>) -> Result<WorkUnitResult> {
        let mut expressions: Vec<&str> = Vec::new();
        if let Some(condition) = invocation.condition.as_deref() {
            expressions.push(condition);
        }
        expressions.extend(invocation.parameters.values().map(String::as_str));
        for output in invocation.output.iter() {
            if let Some(condition) = output.condition.as_deref() {
                expressions.push(condition);
            }
        }
        let buckets = bucketize(&expressions, ctx.lookup, &ctx.location)?;
        let target_bucket: &Bucket = ctx.target_bucket;

        let mut aggregate = WorkUnitResult::skipped();
        if buckets.len() == 1 && buckets.iter().all(Bucket::is_trivial) {
            return self.execute_bucket(invocation, ctx, target_bucket);
        }
        for bucket in buckets.iter() {
            let result = self.execute_bucket(invocation, ctx, bucket)?;
            aggregate = aggregate.aggregate(result);
            if result.action == WorkUnitActionCode::Stop {
                break;
            }
        }
        Ok(aggregate)
    }
}

fn requested_parameters(
    invocation: &TaskInvocation,
    expander: &Expander<'_>,
    location: &ElementLocation,
) -> Result<TaskFactoryParameters> {
    let mut parameters = TaskFactoryParameters::new();
    for (key, raw) in [
        (RUNTIME_PARAMETER, invocation.runtime.as_deref()),
        (ARCHITECTURE_PARAMETER, invocation.architecture.as_deref()),
    ] {
        let Some(raw) = raw else {
            continue;
        };
        let value = expander.expand_unescaped(raw, location)?;
        if !value.trim().is_empty() {
            parameters.insert(key, value.trim());
        }
    }
    if parameters.parsed_runtime().is_none() && parameters.runtime().is_some() {
        return Err(BuildError::invalid_project(
            codes::INVALID_TASK_HOST_PARAMETER,
            location,
            format!("\"{}\" is not a valid task host runtime", parameters.runtime().unwrap_or_default()),
        ));
    }
    if parameters.parsed_architecture().is_none() && parameters.architecture().is_some() {
        return Err(BuildError::invalid_project(
            codes::INVALID_TASK_HOST_PARAMETER,
            location,
            format!(
                "\"{}\" is not a valid task host architecture",
                parameters.architecture().unwrap_or_default()
            ),
        ));
    }
    Ok(parameters)
}

/// Runtime and architecture a task needs: the invocation's request wins
/// over the registration, and wildcards mean "whatever this process is".
fn host_identity(
    requested: &TaskFactoryParameters,
    registered: &TaskFactoryParameters,
) -> (TaskHostRuntime, TaskHostArchitecture) {
    let runtime = requested
        .parsed_runtime()
        .filter(|r| !r.is_any())
        .or_else(|| registered.parsed_runtime().filter(|r| !r.is_any()))
        .unwrap_or(TaskHostRuntime::Current)
        .resolve();
    let architecture = requested
        .parsed_architecture()
        .filter(|a| !a.is_any())
        .or_else(|| registered.parsed_architecture().filter(|a| !a.is_any()))
        .unwrap_or(TaskHostArchitecture::Current)
        .resolve();
    (runtime, architecture)
}

fn bind_outputs(
    task: &dyn Task,
    outputs: &[(String, OutputBinding)],
    lookup: &mut Lookup,
    location: &ElementLocation,
) -> Result<()> {
    for (parameter, binding) in outputs {
        let Some(value) = task.get_output(parameter) else {
            trace!(%parameter, "task output not set");
            continue;
        };
        match binding {
            OutputBinding::Item(item_type) => {
                let items: Vec<ProjectItem> = value
                    .into_items()
                    .iter()
                    .map(|i| ProjectItem::from_task_item(item_type, i))
                    .collect();
                trace!(%parameter, %item_type, count = items.len(), "binding task output to items");
                lookup.add_new_items(items);
            }
            OutputBinding::Property(name) => {
                if is_reserved_property(name) {
                    return Err(BuildError::invalid_project(
                        codes::RESERVED_PROPERTY,
                        location,
                        format!("the property \"{name}\" is reserved and cannot be set by a task output"),
                    ));
                }
                let joined: Vec<String> = value.into_strings().iter().map(|s| escape(s)).collect();
                if !lookup.set_property(name, joined.join(";")) {
                    warn!(property = %name, "task output not applied to global property");
                }
            }
        }
    }
    Ok(())
}
