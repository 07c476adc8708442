// src/target/builder.rs

//! Drives [`TargetEntry`]s to completion.
//!
//! Targets live on an explicit stack instead of the call stack. On each turn
//! the top entry advances one state:
//!
//! - `Dependencies`: push its `depends_on_targets` and the targets that name
//!   it in `before_targets`; dependencies end up on top and run first
//! - `Execution`: run its steps, unless a dependency failed
//! - `ErrorExecution`: push its `on_error` targets
//! - `Completed`: gather results and push its after-targets, then pop it
//!   once those finished
//!
//! A target already built for this request is never built again; its stored
//! result is reused.

use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::evaluation::{Expander, Lookup};
use crate::events::BuildEvent;
use crate::project::ProjectInstance;
use crate::target::callbacks::{RequestCallbacks, TargetServices};
use crate::target::entry::{TargetEntry, TargetEntryState};
use crate::target::result::{TargetResult, TargetResultCode, TargetResults};
use crate::target::task_builder::TaskBuilder;
use crate::target::{TargetBuiltReason, TargetSpecification};

/// A stack slot: the entry plus what its children reported back.
#[derive(Debug)]
struct Frame {
    entry: TargetEntry,
    /// Stack index of the entry that pushed this one.
    parent: Option<usize>,
    dependency_failed: bool,
    after_target_failed: bool,
    /// Set on the first visit in `Completed`, when after-targets are pushed.
    result: Option<TargetResult>,
}

impl Frame {
    fn new(entry: TargetEntry, parent: Option<usize>) -> Self {
        Self {
            entry,
            parent,
            dependency_failed: false,
            after_target_failed: false,
            result: None,
        }
    }
}

pub struct TargetBuilder<'a> {
    project: Arc<ProjectInstance>,
    task_builder: &'a dyn TaskBuilder,
    callbacks: &'a mut dyn RequestCallbacks,
    results: &'a mut TargetResults,
    /// Targets already in progress further out (for `CallTarget`).
    active: Vec<String>,
}

impl<'a> TargetBuilder<'a> {
    pub fn new(
        project: Arc<ProjectInstance>,
        task_builder: &'a dyn TaskBuilder,
        callbacks: &'a mut dyn RequestCallbacks,
        results: &'a mut TargetResults,
    ) -> Self {
        Self {
            project,
            task_builder,
            callbacks,
            results,
            active: Vec::new(),
        }
    }

    pub fn with_active_targets(mut self, active: Vec<String>) -> Self {
        self.active = active;
        self
    }

    /// Build `targets` in order. Stops at the first target that fails and
    /// returns whether all of them succeeded.
    pub fn build_targets(&mut self, lookup: &mut Lookup, targets: &[String]) -> Result<bool> {
        let location = ElementLocation::new(self.project.file(), "build request");
        for name in targets {
            if let Some(existing) = self.results.get(name) {
                trace!(target = %name, "target already built; reusing result");
                if !existing.succeeded() {
                    return Ok(false);
                }
                continue;
            }
            if self.is_active(name) {
                return Err(circular_dependency(name, &location));
            }
            let spec = TargetSpecification::new(name.clone(), location.clone());
            let entry = TargetEntry::new(&self.project, &spec, None, TargetBuiltReason::None)?;
            let result = self.process_stack(lookup, entry)?;
            if !result.succeeded() {
                info!(project = %self.project.file(), target = %name, "target failed; stopping request");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn process_stack(&mut self, lookup: &mut Lookup, root: TargetEntry) -> Result<TargetResult> {
        let mut stack: Vec<Frame> = vec![Frame::new(root, None)];

        loop {
            let Some(top) = stack.len().checked_sub(1) else {
                return Err(BuildError::internal("target stack drained before the requested target finished"));
            };
            if self.callbacks.is_cancelled() && stack[top].entry.state() != TargetEntryState::Completed {
                stack[top].entry.cancel();
            }

            match stack[top].entry.state() {
                TargetEntryState::Dependencies => {
                    if self.results.contains(stack[top].entry.name()) {
                        // Pushed twice; the other copy finished first.
                        let frame = pop(&mut stack)?;
                        let result = self
                            .results
                            .get(frame.entry.name())
                            .cloned()
                            .unwrap_or_else(TargetResult::failure);
                        if let Some(result) = finish_frame(&mut stack, frame, result) {
                            return Ok(result);
                        }
                        continue;
                    }

                    let dependencies = stack[top].entry.get_dependencies(&self.project, lookup)?;
                    if stack[top].entry.state() == TargetEntryState::Completed {
                        continue;
                    }
                    let name = stack[top].entry.name().to_string();
                    let before = self.targets_hooked_to(&name, HookKind::Before, lookup)?;
                    self.push_targets(&mut stack, top, before, TargetBuiltReason::BeforeTargets)?;
                    self.push_targets(&mut stack, top, dependencies, TargetBuiltReason::DependsOn)?;
                }
                TargetEntryState::Execution => {
                    if stack[top].dependency_failed {
                        debug!(target = %stack[top].entry.name(), "a dependency failed; not executing");
                        stack[top].entry.mark_dependency_failed()?;
                        continue;
                    }
                    let parent_target = stack[top]
                        .parent
                        .map(|idx| stack[idx].entry.name().to_string());
                    self.callbacks.emit(BuildEvent::TargetStarted {
                        project_file: self.project.file(),
                        target: stack[top].entry.name().to_string(),
                        parent_target,
                    });

                    let mut active_targets = self.active.clone();
                    active_targets.extend(ancestors(&stack, top).map(str::to_string));
                    let mut services = TargetServices {
                        project: &self.project,
                        task_builder: self.task_builder,
                        callbacks: &mut *self.callbacks,
                        results: &mut *self.results,
                        active_targets,
                    };
                    stack[top].entry.execute_target(&mut services, lookup)?;
                }
                TargetEntryState::ErrorExecution => {
                    let error_targets = stack[top].entry.get_error_targets()?;
                    self.push_targets(&mut stack, top, error_targets, TargetBuiltReason::OnError)?;
                }
                TargetEntryState::Completed => {
                    if stack[top].result.is_none() {
                        let result = stack[top].entry.gather_results(&self.project, lookup)?;
                        let run_after = result.succeeded();
                        stack[top].result = Some(result);
                        if run_after {
                            let name = stack[top].entry.name().to_string();
                            let after = self.targets_hooked_to(&name, HookKind::After, lookup)?;
                            self.push_targets(&mut stack, top, after, TargetBuiltReason::AfterTargets)?;
                        }
                        continue;
                    }

                    let mut frame = pop(&mut stack)?;
                    let mut result = frame.result.take().unwrap_or_else(TargetResult::failure);
                    if frame.after_target_failed {
                        result.mark_failed();
                    }
                    self.record(&frame.entry, &result);
                    if let Some(result) = finish_frame(&mut stack, frame, result) {
                        return Ok(result);
                    }
                }
            }
        }
    }

    fn record(&mut self, entry: &TargetEntry, result: &TargetResult) {
        let project_file = self.project.file();
        if result.code() == TargetResultCode::Skipped {
            self.callbacks.emit(BuildEvent::TargetSkipped {
                project_file: project_file.clone(),
                target: entry.name().to_string(),
                reason: entry.skip_reason().unwrap_or_default(),
            });
        }
        let target_outputs = self
            .callbacks
            .target_output_logging()
            .then(|| result.items().to_vec());
        self.callbacks.emit(BuildEvent::TargetFinished {
            project_file,
            target: entry.name().to_string(),
            succeeded: result.succeeded(),
            target_outputs,
        });
        debug!(
            target = %entry.name(),
            code = ?result.code(),
            outputs = result.items().len(),
            "target finished"
        );
        self.results.insert(entry.name(), result.clone());
    }

    fn push_targets(
        &mut self,
        stack: &mut Vec<Frame>,
        parent: usize,
        targets: Vec<TargetSpecification>,
        reason: TargetBuiltReason,
    ) -> Result<()> {
        let parent_name = stack[parent].entry.name().to_string();
        for spec in targets.into_iter().rev() {
            if let Some(existing) = self.results.get(&spec.name) {
                let failed = !existing.succeeded();
                match reason {
                    TargetBuiltReason::DependsOn | TargetBuiltReason::BeforeTargets if failed => {
                        stack[parent].dependency_failed = true;
                    }
                    TargetBuiltReason::AfterTargets if failed => stack[parent].after_target_failed = true,
                    _ => {}
                }
                continue;
            }

            let in_progress = self.is_active(&spec.name)
                || std::iter::once(parent_name.as_str())
                    .chain(ancestors(stack, parent))
                    .any(|n| n.eq_ignore_ascii_case(spec.name.trim()));
            if in_progress {
                if reason == TargetBuiltReason::DependsOn {
                    return Err(circular_dependency_between(&spec.name, &parent_name, &spec.location));
                }
                trace!(target = %spec.name, %reason, "target already in progress; not pushing");
                continue;
            }

            let entry = TargetEntry::new(&self.project, &spec, Some(parent_name.clone()), reason)?;
            trace!(target = %entry.name(), parent = %parent_name, %reason, "pushing target");
            stack.push(Frame::new(entry, Some(parent)));
        }
        Ok(())
    }

    /// Targets whose `before_targets`/`after_targets` name `target`, in
    /// declaration order.
    fn targets_hooked_to(&self, target: &str, kind: HookKind, lookup: &Lookup) -> Result<Vec<TargetSpecification>> {
        let expander = Expander::new(lookup)
            .with_file_system(self.project.file_system().as_ref(), self.project.directory())
            .without_metadata();
        let mut hooked = Vec::new();
        for (name, definition) in self.project.targets().iter() {
            let raw = match kind {
                HookKind::Before => definition.before_targets.as_deref(),
                HookKind::After => definition.after_targets.as_deref(),
            };
            let Some(raw) = raw else {
                continue;
            };
            let location = ElementLocation::new(self.project.file(), format!("target '{name}' > {}", kind.attribute()));
            let names = expander.expand_into_strings(raw, &location)?;
            if names.iter().any(|n| n.eq_ignore_ascii_case(target)) {
                hooked.push(TargetSpecification::new(name.clone(), location));
            }
        }
        Ok(hooked)
    }

    fn is_active(&self, name: &str) -> bool {
        self.active.iter().any(|a| a.eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Debug, Clone, Copy)]
enum HookKind {
    Before,
    After,
}

impl HookKind {
    fn attribute(self) -> &'static str {
        match self {
            HookKind::Before => "before_targets",
            HookKind::After => "after_targets",
        }
    }
}

/// Names of the entries above which `idx` was pushed, innermost first.
fn ancestors(stack: &[Frame], idx: usize) -> impl Iterator<Item = &str> {
    std::iter::successors(stack[idx].parent, move |&i| stack[i].parent).map(move |i| stack[i].entry.name())
}

/// Report a finished frame to its parent. Returns the result when the root
/// frame finished.
fn finish_frame(stack: &mut Vec<Frame>, frame: Frame, result: TargetResult) -> Option<TargetResult> {
    let Some(parent) = frame.parent else {
        return Some(result);
    };
    if result.succeeded() {
        return None;
    }
    match frame.entry.reason() {
        TargetBuiltReason::DependsOn | TargetBuiltReason::BeforeTargets => {
            stack[parent].dependency_failed = true;
            // Remaining siblings of the failed dependency never start.
            if stack.len() > parent + 1 {
                trace!(
                    target = %stack[parent].entry.name(),
                    dropped = stack.len() - parent - 1,
                    "dropping pending dependencies after a failure"
                );
                stack.truncate(parent + 1);
            }
        }
        TargetBuiltReason::AfterTargets => stack[parent].after_target_failed = true,
        TargetBuiltReason::OnError | TargetBuiltReason::None => {}
    }
    None
}

fn pop(stack: &mut Vec<Frame>) -> Result<Frame> {
    stack
        .pop()
        .ok_or_else(|| BuildError::internal("target stack is empty"))
}

fn circular_dependency(target: &str, location: &ElementLocation) -> BuildError {
    BuildError::invalid_project(
        codes::CIRCULAR_TARGET_DEPENDENCY,
        location,
        format!("there is a circular dependency in the target dependency graph involving target \"{target}\""),
    )
}

fn circular_dependency_between(target: &str, parent: &str, location: &ElementLocation) -> BuildError {
    BuildError::invalid_project(
        codes::CIRCULAR_TARGET_DEPENDENCY,
        location,
        format!(
            "there is a circular dependency in the target dependency graph involving target \"{}\"; \"{parent}\" depends on it while it is still being built",
            target.trim()
        ),
    )
}
