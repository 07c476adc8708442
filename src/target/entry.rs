// src/target/entry.rs

//! One target on the build stack.
//!
//! An entry walks `Dependencies -> Execution -> [ErrorExecution] -> Completed`.
//! Each transition is driven by the [`TargetBuilder`](super::TargetBuilder);
//! calling a method in the wrong state is an internal error.
//!
//! The entry does not own a lookup. The builder passes the request's lookup
//! into every call, so targets see each other's committed changes.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use indexmap::IndexSet;
use tracing::{debug, info, trace};

use crate::errors::{verify_internal, BuildError, ElementLocation, Result};
use crate::evaluation::{bucketize, evaluate_condition, Bucket, Expander, Lookup, LookupDelta, TaskItem};
use crate::events::BuildEvent;
use crate::intrinsic::{execute_choose, execute_item_group, execute_property_group, EvaluationPass, IntrinsicContext};
use crate::project::model::{TargetDefinition, TargetStep};
use crate::project::ProjectInstance;
use crate::target::callbacks::{TargetBuildEngine, TargetServices};
use crate::target::result::{TargetResult, WorkUnitActionCode, WorkUnitResult, WorkUnitResultCode};
use crate::target::task_builder::{TaskBuilder, TaskContext};
use crate::target::{TargetBuiltReason, TargetSpecification};
use crate::tasks::BuildEngine;
use crate::types::parse_bool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEntryState {
    Dependencies,
    Execution,
    ErrorExecution,
    Completed,
}

/// How execution ended, before outputs are gathered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Pending,
    ConditionFalse,
    UpToDate,
    Executed(WorkUnitResultCode),
    DependencyFailed,
    Canceled,
}

#[derive(Debug)]
pub struct TargetEntry {
    name: String,
    definition: TargetDefinition,
    location: ElementLocation,
    parent: Option<String>,
    reason: TargetBuiltReason,
    state: TargetEntryState,
    outcome: Outcome,
    error_targets: Vec<TargetSpecification>,
}

impl TargetEntry {
    /// Entry for `spec`, which must name a target of `project`.
    pub fn new(
        project: &ProjectInstance,
        spec: &TargetSpecification,
        parent: Option<String>,
        reason: TargetBuiltReason,
    ) -> Result<Self> {
        let Some((name, definition)) = project.target(&spec.name) else {
            return Err(BuildError::invalid_project(
                crate::errors::codes::TARGET_NOT_FOUND,
                &spec.location,
                format!("the target \"{}\" does not exist in the project", spec.name.trim()),
            ));
        };
        Ok(Self {
            name: name.to_string(),
            definition: definition.clone(),
            location: ElementLocation::new(project.file(), format!("target '{name}'")),
            parent,
            reason,
            state: TargetEntryState::Dependencies,
            outcome: Outcome::Pending,
            error_targets: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TargetEntryState {
        self.state
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn reason(&self) -> TargetBuiltReason {
        self.reason
    }

    pub fn definition(&self) -> &TargetDefinition {
        &self.definition
    }

    pub fn location(&self) -> &ElementLocation {
        &self.location
    }

    /// Why the target was skipped, if it was.
    pub fn skip_reason(&self) -> Option<String> {
        match self.outcome {
            Outcome::ConditionFalse => Some(format!(
                "condition \"{}\" evaluated to false",
                self.definition.condition.as_deref().unwrap_or_default()
            )),
            Outcome::UpToDate => Some("outputs are up to date with respect to the inputs".to_string()),
            _ => None,
        }
    }

    /// Evaluate the condition and the dependency list.
    ///
    /// A false condition completes the entry as skipped and yields no
    /// dependencies.
    pub fn get_dependencies(&mut self, project: &ProjectInstance, lookup: &Lookup) -> Result<Vec<TargetSpecification>> {
        self.expect_state(TargetEntryState::Dependencies, "get_dependencies")?;

        let expander = Expander::new(lookup)
            .with_file_system(project.file_system().as_ref(), project.directory())
            .without_metadata();
        if let Some(condition) = self.definition.condition.as_deref() {
            if !evaluate_condition(condition, &expander, &self.location.child("condition"))? {
                debug!(target = %self.name, %condition, "target condition is false");
                self.outcome = Outcome::ConditionFalse;
                self.state = TargetEntryState::Completed;
                return Ok(Vec::new());
            }
        }

        let mut dependencies: Vec<TargetSpecification> = Vec::new();
        if let Some(raw) = self.definition.depends_on_targets.as_deref() {
            let location = self.location.child("depends_on_targets");
            for name in expander.expand_into_strings(raw, &location)? {
                if !dependencies.iter().any(|d| d.name.eq_ignore_ascii_case(&name)) {
                    dependencies.push(TargetSpecification::new(name, location.clone()));
                }
            }
        }
        trace!(target = %self.name, count = dependencies.len(), "dependencies resolved");
        self.state = TargetEntryState::Execution;
        Ok(dependencies)
    }

    /// A dependency failed: skip execution, the entry fails.
    pub fn mark_dependency_failed(&mut self) -> Result<()> {
        self.expect_state(TargetEntryState::Execution, "mark_dependency_failed")?;
        self.outcome = Outcome::DependencyFailed;
        self.state = TargetEntryState::Completed;
        Ok(())
    }

    /// Stop the entry where it is. It completes as a canceled failure and
    /// runs no error targets.
    pub fn cancel(&mut self) {
        debug!(target = %self.name, state = ?self.state, "target canceled");
        self.outcome = Outcome::Canceled;
        self.error_targets.clear();
        self.state = TargetEntryState::Completed;
    }

    /// Run the target's steps, once per Inputs/Outputs bucket.
    ///
    /// Every bucket runs in its own scope over the same pre-batch view;
    /// bucket changes are applied to `lookup` only after all buckets ran.
    pub fn execute_target(&mut self, services: &mut TargetServices<'_>, lookup: &mut Lookup) -> Result<()> {
        self.expect_state(TargetEntryState::Execution, "execute_target")?;

        let project = Arc::clone(services.project);
        let task_builder = services.task_builder;
        let inputs = self.definition.inputs.clone().unwrap_or_default();
        let outputs = self.definition.outputs.clone().unwrap_or_default();
        let buckets = bucketize(&[inputs.as_str(), outputs.as_str()], lookup, &self.location)?;

        info!(project = %project.file(), target = %self.name, buckets = buckets.len(), "executing target");

        let committed = Arc::clone(lookup.project_state());
        let mut engine = TargetBuildEngine::new(services, &self.name, committed);
        let mut deltas: Vec<LookupDelta> = Vec::new();
        let mut aggregate: Option<WorkUnitResult> = None;

        for (idx, bucket) in buckets.iter().enumerate() {
            if engine.is_cancelled() {
                aggregate = Some(WorkUnitResult::canceled());
                break;
            }
            if self.bucket_up_to_date(&project, lookup, bucket)? {
                info!(target = %self.name, bucket = idx, "skipping target bucket: outputs are up to date");
                continue;
            }

            let mut scope = lookup.clone();
            scope.enter_scope(&format!("target '{}' bucket {}", self.name, idx));
            let result = self.run_steps(&project, task_builder, &mut engine, &mut scope, bucket);
            let result = match result {
                Ok(result) => result,
                Err(BuildError::Cancelled) => WorkUnitResult::canceled(),
                Err(err) if err.is_invalid_project() => {
                    debug!(target = %self.name, error = %err, "target stopped on a project error");
                    engine.log(BuildEvent::error(err.code(), err.to_string(), Some(self.location.file.as_str())));
                    WorkUnitResult::failed_and_stop()
                }
                Err(err) => return Err(err),
            };
            deltas.push(scope.take_scope()?);
            let combined = match aggregate {
                Some(previous) => previous.aggregate(result),
                None => result,
            };
            aggregate = Some(combined);
            if combined.action == WorkUnitActionCode::Stop {
                break;
            }
        }
        let called_targets = engine.into_called_target_changes()?;

        for delta in deltas {
            lookup.apply_delta(delta);
        }
        if let Some(delta) = called_targets {
            lookup.apply_delta(delta);
        }

        let Some(result) = aggregate else {
            self.outcome = Outcome::UpToDate;
            self.state = TargetEntryState::Completed;
            return Ok(());
        };
        if result.code == WorkUnitResultCode::Canceled {
            self.cancel();
            return Ok(());
        }
        self.outcome = Outcome::Executed(result.code);

        if result.code == WorkUnitResultCode::Failed && result.action == WorkUnitActionCode::Stop {
            self.error_targets = self.collect_error_targets(&project, lookup)?;
        }
        self.state = if self.error_targets.is_empty() {
            TargetEntryState::Completed
        } else {
            TargetEntryState::ErrorExecution
        };
        Ok(())
    }

    /// Targets named by the `on_error` steps whose condition held.
    pub fn get_error_targets(&mut self) -> Result<Vec<TargetSpecification>> {
        self.expect_state(TargetEntryState::ErrorExecution, "get_error_targets")?;
        self.state = TargetEntryState::Completed;
        Ok(std::mem::take(&mut self.error_targets))
    }

    /// What this target hands back to callers.
    ///
    /// `returns` wins over `outputs`. When any target of the project declares
    /// `returns`, a target without it returns nothing.
    pub fn gather_results(&self, project: &ProjectInstance, lookup: &Lookup) -> Result<TargetResult> {
        self.expect_state(TargetEntryState::Completed, "gather_results")?;

        match self.outcome {
            Outcome::Pending => {
                return Err(BuildError::internal(format!(
                    "target '{}' completed without an outcome",
                    self.name
                )));
            }
            Outcome::ConditionFalse => return Ok(TargetResult::skipped(Vec::new())),
            Outcome::Canceled => return Ok(TargetResult::canceled()),
            Outcome::DependencyFailed | Outcome::Executed(WorkUnitResultCode::Failed) => {
                return Ok(TargetResult::failure());
            }
            Outcome::UpToDate | Outcome::Executed(_) => {}
        }

        let expression = match (self.definition.returns.as_deref(), project.returns_enabled()) {
            (Some(returns), _) => Some(returns),
            (None, true) => None,
            (None, false) => self.definition.outputs.as_deref(),
        };
        let items = match expression {
            Some(expr) => self.expand_results(project, lookup, expr)?,
            None => Vec::new(),
        };
        Ok(match self.outcome {
            Outcome::UpToDate => TargetResult::skipped(items),
            _ => TargetResult::success(items),
        })
    }

    fn expect_state(&self, expected: TargetEntryState, operation: &str) -> Result<()> {
        verify_internal(self.state == expected, || {
            format!(
                "{operation} called on target '{}' in state {:?}, expected {:?}",
                self.name, self.state, expected
            )
        })
    }

    fn run_steps(
        &self,
        project: &ProjectInstance,
        task_builder: &dyn TaskBuilder,
        engine: &mut TargetBuildEngine<'_, '_>,
        lookup: &mut Lookup,
        bucket: &Bucket,
    ) -> Result<WorkUnitResult> {
        let ctx = IntrinsicContext::target(project.file_system().as_ref(), project.directory());
        let mut aggregate = WorkUnitResult::skipped();
        for (idx, step) in self.definition.steps.iter().enumerate() {
            let location = self.location.child(format!("step #{} ({})", idx + 1, step.kind()));
            let result = match step {
                TargetStep::Task(invocation) => {
                    let mut task_ctx = TaskContext {
                        project,
                        target: &self.name,
                        lookup: &mut *lookup,
                        target_bucket: bucket,
                        location,
                        engine: &mut *engine,
                    };
                    task_builder.execute_task(invocation, &mut task_ctx)?
                }
                TargetStep::PropertyGroup(group) => {
                    execute_property_group(group, lookup, &ctx, &location)?;
                    WorkUnitResult::success()
                }
                TargetStep::ItemGroup(group) => {
                    execute_item_group(group, lookup, &ctx, &location)?;
                    WorkUnitResult::success()
                }
                TargetStep::Choose(choose) => {
                    execute_choose(choose, EvaluationPass::All, lookup, &ctx, &location)?;
                    WorkUnitResult::success()
                }
                TargetStep::OnError(_) => continue,
            };
            aggregate = aggregate.aggregate(result);
            if result.action == WorkUnitActionCode::Stop {
                break;
            }
        }
        Ok(aggregate)
    }

    /// Up to date when every output exists and is no older than the newest
    /// input. Targets without both attributes always run.
    fn bucket_up_to_date(&self, project: &ProjectInstance, lookup: &Lookup, bucket: &Bucket) -> Result<bool> {
        let (Some(inputs), Some(outputs)) = (self.definition.inputs.as_deref(), self.definition.outputs.as_deref())
        else {
            return Ok(false);
        };
        let fs = project.file_system();
        let expander = Expander::new(lookup)
            .with_file_system(fs.as_ref(), project.directory())
            .with_bucket(bucket);
        let inputs = expander.expand_into_strings(inputs, &self.location.child("inputs"))?;
        let outputs = expander.expand_into_strings(outputs, &self.location.child("outputs"))?;
        if inputs.is_empty() || outputs.is_empty() {
            debug!(target = %self.name, "no inputs or outputs to compare; nothing to do");
            return Ok(true);
        }

        let times = |paths: &[String]| -> Vec<Option<SystemTime>> {
            paths
                .iter()
                .map(|p| fs.modified(&fs.resolve(project.directory(), Path::new(p))))
                .collect()
        };
        let input_times = times(&inputs);
        let output_times = times(&outputs);
        if input_times.iter().any(Option::is_none) || output_times.iter().any(Option::is_none) {
            trace!(target = %self.name, "missing input or output; building");
            return Ok(false);
        }
        let newest_input = input_times.iter().flatten().max();
        let oldest_output = output_times.iter().flatten().min();
        Ok(match (newest_input, oldest_output) {
            (Some(input), Some(output)) => input <= output,
            _ => false,
        })
    }

    fn collect_error_targets(&self, project: &ProjectInstance, lookup: &Lookup) -> Result<Vec<TargetSpecification>> {
        let expander = Expander::new(lookup)
            .with_file_system(project.file_system().as_ref(), project.directory())
            .without_metadata();
        let mut targets: Vec<TargetSpecification> = Vec::new();
        for (idx, step) in self.definition.steps.iter().enumerate() {
            let TargetStep::OnError(on_error) = step else {
                continue;
            };
            let location = self.location.child(format!("step #{} (on_error)", idx + 1));
            if let Some(condition) = on_error.condition.as_deref() {
                if !evaluate_condition(condition, &expander, &location.child("condition"))? {
                    continue;
                }
            }
            for name in expander.expand_into_strings(&on_error.execute_targets, &location)? {
                targets.push(TargetSpecification::new(name, location.clone()));
            }
        }
        debug!(target = %self.name, count = targets.len(), "error targets collected");
        Ok(targets)
    }

    fn expand_results(&self, project: &ProjectInstance, lookup: &Lookup, expression: &str) -> Result<Vec<TaskItem>> {
        let location = self.location.child("outputs");
        let keep_duplicates = match self.definition.keep_duplicate_outputs.as_deref() {
            None => false,
            Some(raw) => {
                let expander = Expander::new(lookup).without_metadata();
                let value = expander.expand_unescaped(raw, &location)?;
                parse_bool(&value).unwrap_or(false)
            }
        };

        let mut items: Vec<TaskItem> = Vec::new();
        for bucket in bucketize(&[expression], lookup, &location)? {
            let expander = Expander::new(lookup)
                .with_file_system(project.file_system().as_ref(), project.directory())
                .with_bucket(&bucket);
            items.extend(expander.expand_into_task_items(expression, &location)?);
        }
        if keep_duplicates {
            return Ok(items);
        }
        let unique: IndexSet<TaskItem> = items.into_iter().collect();
        Ok(unique.into_iter().collect())
    }
}
