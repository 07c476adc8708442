// src/engine/request_builder.rs

//! Synchronous core of a build: one request at a time, child projects
//! recursively.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::state::BuildState;
use crate::errors::{codes, verify_internal, BuildError, ElementLocation, Result};
use crate::events::{BuildEvent, BuildEventSink};
use crate::fs::FileSystem;
use crate::project::ProjectInstance;
use crate::protocol::task_host::{ProjectInvocation, TargetOutputs};
use crate::protocol::{TaskHostBuildRequest, TaskHostBuildResponse};
use crate::request::{BuildRequest, BuildResult, ConfigurationMetadata};
use crate::target::{RequestCallbacks, TargetBuilder, TaskBuilder};

/// Builds requests against the shared [`BuildState`].
///
/// Child projects requested by the `MSBuild` task are built recursively on
/// the same thread. The stack of requests in progress is what detects a
/// project building itself.
pub struct RequestBuilder<'a> {
    state: &'a mut BuildState,
    file_system: Arc<dyn FileSystem>,
    task_builder: &'a dyn TaskBuilder,
    sink: &'a dyn BuildEventSink,
    cancel: CancellationToken,
    target_output_logging: bool,
    stack: Vec<BuildRequest>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(
        state: &'a mut BuildState,
        file_system: Arc<dyn FileSystem>,
        task_builder: &'a dyn TaskBuilder,
        sink: &'a dyn BuildEventSink,
        cancel: CancellationToken,
        target_output_logging: bool,
    ) -> Self {
        Self {
            state,
            file_system,
            task_builder,
            sink,
            cancel,
            target_output_logging,
            stack: Vec::new(),
        }
    }

    /// Build a resolved request and record its result.
    ///
    /// Project errors end up in the returned [`BuildResult`]. The only
    /// invalid-project error returned as `Err` is MSB4116, a configuration
    /// that is already being built further up.
    pub fn build(&mut self, request: BuildRequest) -> Result<BuildResult> {
        verify_internal(request.is_configuration_resolved(), || {
            format!(
                "request {} must be resolved to a configuration before it is built",
                request.global_request_id()
            )
        })?;
        let configuration_id = request.configuration_id();
        if let Some(outer) = self
            .stack
            .iter()
            .find(|r| r.configuration_id() == configuration_id)
        {
            let project = self
                .state
                .configs()
                .get(configuration_id)
                .map(|c| c.project_full_path().display().to_string())
                .unwrap_or_default();
            return Err(BuildError::invalid_project(
                codes::CIRCULAR_PROJECT_REFERENCE,
                &ElementLocation::new(project.clone(), ""),
                format!(
                    "the project \"{project}\" is already being built by request {}; a project cannot build itself",
                    outer.global_request_id()
                ),
            ));
        }

        self.stack.push(request.clone());
        let result = self.build_request(&request);
        self.stack.pop();

        let result = result?;
        self.state.results_mut().add_result(result.clone());
        Ok(result)
    }

    fn build_request(&mut self, request: &BuildRequest) -> Result<BuildResult> {
        let mut result = BuildResult::new(request);
        let configuration_id = request.configuration_id();
        let project = match self
            .state
            .load_project(configuration_id, Arc::clone(&self.file_system))
        {
            Ok(project) => project,
            Err(e) if e.is_invalid_project() => {
                self.report_error(&e, None);
                result.set_error(e.to_string());
                return Ok(result);
            }
            Err(e) => return Err(e),
        };

        let initial_targets = project.initial_targets().to_vec();
        let targets = if request.targets().is_empty() {
            project.default_targets().to_vec()
        } else {
            request.targets().to_vec()
        };
        result.set_target_lists(initial_targets.clone(), project.default_targets().to_vec());

        let project_file = project.file();
        info!(
            project = %project_file,
            configuration = configuration_id,
            request = request.global_request_id(),
            ?targets,
            "building project"
        );
        self.sink.emit(BuildEvent::ProjectStarted {
            project_file: project_file.clone(),
            targets: targets.clone(),
            global_properties: project.global_properties().clone(),
        });

        let mut target_results = self
            .state
            .results()
            .get_result_for_configuration(configuration_id)
            .map(|r| r.results_by_target().clone())
            .unwrap_or_default();
        let mut lookup = project.create_lookup();
        let task_builder = self.task_builder;
        let outcome = {
            let mut builder = TargetBuilder::new(Arc::clone(&project), task_builder, self, &mut target_results);
            builder
                .build_targets(&mut lookup, &initial_targets)
                .and_then(|ok| {
                    if ok {
                        builder.build_targets(&mut lookup, &targets)
                    } else {
                        Ok(false)
                    }
                })
        };
        project.commit(&lookup);
        result.merge_results(target_results);

        match outcome {
            Ok(_) => {}
            Err(BuildError::Cancelled) => result.mark_canceled(),
            Err(e) if e.is_invalid_project() => {
                self.report_error(&e, Some(&project_file));
                result.set_error(e.to_string());
            }
            Err(e) => return Err(e),
        }
        if self.cancel.is_cancelled() {
            result.mark_canceled();
        }

        let succeeded = result.succeeded();
        info!(project = %project_file, succeeded, "project finished");
        self.sink.emit(BuildEvent::ProjectFinished {
            project_file,
            succeeded,
        });
        Ok(result)
    }

    fn build_child(
        &mut self,
        parent: &ProjectInstance,
        invocation: &ProjectInvocation,
        targets: &[String],
        use_results_cache: bool,
        unload_on_completion: bool,
    ) -> Result<(bool, TargetOutputs)> {
        let path = parent
            .file_system()
            .resolve(parent.directory(), Path::new(&invocation.project_file));
        let global_properties = merge_global_properties(parent.global_properties(), invocation);
        let tools_version = invocation
            .tools_version
            .clone()
            .filter(|tv| !tv.trim().is_empty())
            .unwrap_or_else(|| parent.tools_version().to_string());
        let configuration_id = self
            .state
            .resolve_configuration(ConfigurationMetadata::new(path, global_properties, tools_version))?;

        let parent_request = self.stack.last().cloned();
        let submission_id = parent_request.as_ref().map(|r| r.submission_id()).unwrap_or_default();
        let parent_context = parent_request
            .as_ref()
            .map(|r| r.build_event_context())
            .unwrap_or_default();
        let global_request_id = self.state.next_global_request_id();
        let mut request = BuildRequest::new(
            submission_id,
            global_request_id,
            configuration_id,
            Some(targets.to_vec()),
            None,
            parent_context,
            parent_request.as_ref(),
        )?;
        request.set_global_request_id(global_request_id);

        if use_results_cache {
            let implicit = self.state.implicit_targets(configuration_id);
            if let Some(cached) = self.state.results().satisfy_request(&request, &implicit) {
                debug!(configuration = configuration_id, "child request satisfied from results cache");
                let requested = requested_targets(cached, targets);
                return Ok((requested_succeeded(cached, &requested), cached.target_outputs(&requested)));
            }
        }

        let outcome = self.build(request);
        if unload_on_completion {
            if let Some(configuration) = self.state.configs_mut().get_mut(configuration_id) {
                configuration.unload();
            }
        }
        match outcome {
            Ok(result) => {
                let requested = requested_targets(&result, targets);
                Ok((requested_succeeded(&result, &requested), result.target_outputs(&requested)))
            }
            Err(e) if e.is_invalid_project() => {
                self.report_error(&e, Some(&parent.file()));
                Ok((false, TargetOutputs::new()))
            }
            Err(e) => Err(e),
        }
    }

    fn report_error(&self, error: &BuildError, file: Option<&str>) {
        warn!(error = %error, "build request failed");
        self.sink.emit(BuildEvent::error(error.code(), error.to_string(), file));
    }
}

impl RequestCallbacks for RequestBuilder<'_> {
    fn emit(&self, event: BuildEvent) {
        self.sink.emit(event);
    }

    fn build_projects(
        &mut self,
        parent: &ProjectInstance,
        request: TaskHostBuildRequest,
    ) -> Result<TaskHostBuildResponse> {
        let request_id = request.request_id();
        let targets = request.target_names().to_vec();
        let use_results_cache = request.use_results_cache();
        let unload_on_completion = request.unload_projects_on_completion();
        debug!(
            parent = %parent.file(),
            variant = %request.variant(),
            projects = ?request.project_file_names(),
            ?targets,
            "building child projects"
        );

        let mut overall = true;
        let mut per_project = Vec::new();
        for invocation in request.invocations() {
            if self.cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            let (succeeded, outputs) =
                self.build_child(parent, &invocation, &targets, use_results_cache, unload_on_completion)?;
            overall &= succeeded;
            per_project.push(outputs);
        }

        let outputs = request.return_target_outputs().then_some(per_project);
        Ok(if request.is_multi_project() {
            TaskHostBuildResponse::for_build_engine_result(request_id, overall, outputs)
        } else {
            TaskHostBuildResponse::for_single_project(
                request_id,
                overall,
                outputs.and_then(|o| o.into_iter().next()),
            )
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn target_output_logging(&self) -> bool {
        self.target_output_logging
    }
}

/// Global properties of a child project: the parent's, minus the removed
/// names, overlaid with the invocation's own. Names compare
/// case-insensitively.
pub fn merge_global_properties(
    inherited: &BTreeMap<String, String>,
    invocation: &ProjectInvocation,
) -> BTreeMap<String, String> {
    let mut properties = inherited.clone();
    properties.retain(|name, _| {
        !invocation
            .remove_global_properties
            .iter()
            .any(|removed| removed.trim().eq_ignore_ascii_case(name))
    });
    if let Some(overrides) = &invocation.global_properties {
        for (name, value) in overrides {
            properties.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
            properties.insert(name.clone(), value.clone());
        }
    }
    properties
}

fn requested_targets(result: &BuildResult, targets: &[String]) -> Vec<String> {
    if targets.is_empty() {
        result.default_targets().to_vec()
    } else {
        targets.to_vec()
    }
}

/// Every requested target has a successful result and the request itself
/// did not fail.
fn requested_succeeded(result: &BuildResult, requested: &[String]) -> bool {
    result.error().is_none()
        && requested
            .iter()
            .all(|t| result.result_for_target(t).is_some_and(|r| r.succeeded()))
}
