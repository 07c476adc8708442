// src/target/callbacks.rs

//! The engine surface tasks see while a target runs.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::evaluation::{Lookup, LookupDelta, ProjectState};
use crate::events::BuildEvent;
use crate::project::ProjectInstance;
use crate::protocol::task_host::{TaskHostBuildRequest, TaskHostBuildResponse};
use crate::target::builder::TargetBuilder;
use crate::target::result::TargetResults;
use crate::target::task_builder::TaskBuilder;
use crate::tasks::{BuildEngine, CallTargetResult};

/// What the request being built provides to its targets.
pub trait RequestCallbacks {
    fn emit(&self, event: BuildEvent);

    /// Build other projects on behalf of a task in `parent`.
    fn build_projects(
        &mut self,
        parent: &ProjectInstance,
        request: TaskHostBuildRequest,
    ) -> Result<TaskHostBuildResponse>;

    fn is_cancelled(&self) -> bool;

    /// Attach output items to target-finished events.
    fn target_output_logging(&self) -> bool;
}

/// Borrowed state a target needs while it executes.
pub struct TargetServices<'s> {
    pub project: &'s Arc<ProjectInstance>,
    pub task_builder: &'s dyn TaskBuilder,
    pub callbacks: &'s mut dyn RequestCallbacks,
    pub results: &'s mut TargetResults,
    /// Targets currently in progress, outermost first.
    pub active_targets: Vec<String>,
}

/// [`BuildEngine`] handed to tasks of one target.
///
/// `CallTarget` runs against the project state committed before the calling
/// target started, in a scope of its own. That scope is shared by every
/// `CallTarget` of the calling target and is folded into the project only
/// after the calling target finishes.
pub struct TargetBuildEngine<'e, 's> {
    services: &'e mut TargetServices<'s>,
    target: String,
    committed: Arc<ProjectState>,
    called_targets: Option<Lookup>,
}

impl<'e, 's> TargetBuildEngine<'e, 's> {
    pub fn new(services: &'e mut TargetServices<'s>, target: &str, committed: Arc<ProjectState>) -> Self {
        Self {
            services,
            target: target.to_string(),
            committed,
            called_targets: None,
        }
    }

    /// Changes made by targets run through `CallTarget`, if any ran.
    pub fn into_called_target_changes(self) -> Result<Option<LookupDelta>> {
        match self.called_targets {
            Some(mut lookup) => Ok(Some(lookup.take_scope()?)),
            None => Ok(None),
        }
    }
}

impl BuildEngine for TargetBuildEngine<'_, '_> {
    fn log(&mut self, event: BuildEvent) {
        self.services.callbacks.emit(event);
    }

    fn build_project_files(&mut self, request: TaskHostBuildRequest) -> Result<TaskHostBuildResponse> {
        self.services
            .callbacks
            .build_projects(self.services.project, request)
    }

    fn call_targets(&mut self, targets: &[String], run_each_separately: bool) -> Result<CallTargetResult> {
        debug!(target = %self.target, ?targets, run_each_separately, "calling targets");
        let committed = &self.committed;
        let lookup = self.called_targets.get_or_insert_with(|| {
            let mut lookup = Lookup::new(Arc::clone(committed));
            lookup.enter_scope("call target");
            lookup
        });

        let mut active = self.services.active_targets.clone();
        active.push(self.target.clone());
        let mut builder = TargetBuilder::new(
            Arc::clone(self.services.project),
            self.services.task_builder,
            &mut *self.services.callbacks,
            &mut *self.services.results,
        )
        .with_active_targets(active);

        let mut succeeded = true;
        if run_each_separately {
            for target in targets {
                succeeded &= builder.build_targets(lookup, std::slice::from_ref(target))?;
            }
        } else {
            succeeded = builder.build_targets(lookup, targets)?;
        }
        drop(builder);

        let mut outputs = Vec::new();
        for target in targets {
            if let Some(result) = self.services.results.get(target) {
                outputs.extend(result.items().iter().cloned());
            }
        }
        Ok(CallTargetResult { succeeded, outputs })
    }

    fn is_cancelled(&self) -> bool {
        self.services.callbacks.is_cancelled()
    }

    fn project_file(&self) -> String {
        self.services.project.file()
    }

    fn project_directory(&self) -> PathBuf {
        self.services.project.directory().to_path_buf()
    }
}
