// src/request/build_request.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::errors::{verify_internal, BuildError, Result};

/// Configuration id of a request whose configuration is not known yet.
pub const INVALID_CONFIGURATION_ID: i32 = -1;

pub const INVALID_NODE_REQUEST_ID: i32 = 0;

pub const INVALID_GLOBAL_REQUEST_ID: i32 = -1;

/// Which node, submission, project and target an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildEventContext {
    pub submission_id: i32,
    pub node_id: i32,
    pub project_context_id: i32,
    pub target_id: i32,
    pub task_id: i32,
}

impl BuildEventContext {
    pub const INVALID: BuildEventContext = BuildEventContext {
        submission_id: -1,
        node_id: -2,
        project_context_id: -2,
        target_id: -1,
        task_id: -1,
    };

    pub fn new(submission_id: i32, node_id: i32, project_context_id: i32) -> Self {
        Self {
            submission_id,
            node_id,
            project_context_id,
            target_id: -1,
            task_id: -1,
        }
    }
}

impl Default for BuildEventContext {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Host objects made available to tasks, keyed by project file, then target,
/// then task name. Values are opaque host object monikers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostServices {
    host_objects: BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>,
}

impl HostServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_host_object(&mut self, project_file: &str, target: &str, task: &str, moniker: impl Into<String>) {
        self.host_objects
            .entry(project_file.to_string())
            .or_default()
            .entry(target.to_lowercase())
            .or_default()
            .insert(task.to_lowercase(), moniker.into());
    }

    pub fn get_host_object(&self, project_file: &str, target: &str, task: &str) -> Option<&str> {
        self.host_objects
            .get(project_file)?
            .get(&target.to_lowercase())?
            .get(&task.to_lowercase())
            .map(String::as_str)
    }

    pub fn has_host_objects(&self, project_file: &str) -> bool {
        self.host_objects.contains_key(project_file)
    }
}

/// A request to build targets of one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    submission_id: i32,
    node_request_id: i32,
    global_request_id: i32,
    parent_global_request_id: i32,
    configuration_id: i32,
    targets: Vec<String>,
    host_services: Option<HostServices>,
    build_event_context: BuildEventContext,
    parent_build_event_context: BuildEventContext,
}

impl BuildRequest {
    /// `targets` is required; an empty list builds the default targets.
    ///
    /// A negative `configuration_id` leaves the request unresolved until
    /// [`BuildRequest::resolve_configuration`] is called.
    pub fn new(
        submission_id: i32,
        node_request_id: i32,
        configuration_id: i32,
        targets: Option<Vec<String>>,
        host_services: Option<HostServices>,
        parent_build_event_context: BuildEventContext,
        parent_request: Option<&BuildRequest>,
    ) -> Result<Self> {
        let targets = targets.ok_or(BuildError::ArgumentNull("targets"))?;
        Ok(Self {
            submission_id,
            node_request_id,
            global_request_id: INVALID_GLOBAL_REQUEST_ID,
            parent_global_request_id: parent_request
                .map(|p| p.global_request_id)
                .unwrap_or(INVALID_GLOBAL_REQUEST_ID),
            configuration_id,
            targets,
            host_services,
            build_event_context: BuildEventContext::INVALID,
            parent_build_event_context,
        })
    }

    pub fn submission_id(&self) -> i32 {
        self.submission_id
    }

    pub fn node_request_id(&self) -> i32 {
        self.node_request_id
    }

    pub fn global_request_id(&self) -> i32 {
        self.global_request_id
    }

    pub fn set_global_request_id(&mut self, id: i32) {
        self.global_request_id = id;
    }

    pub fn parent_global_request_id(&self) -> i32 {
        self.parent_global_request_id
    }

    pub fn configuration_id(&self) -> i32 {
        self.configuration_id
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn host_services(&self) -> Option<&HostServices> {
        self.host_services.as_ref()
    }

    pub fn build_event_context(&self) -> BuildEventContext {
        self.build_event_context
    }

    pub fn set_build_event_context(&mut self, context: BuildEventContext) {
        self.build_event_context = context;
    }

    pub fn parent_build_event_context(&self) -> BuildEventContext {
        self.parent_build_event_context
    }

    pub fn is_configuration_resolved(&self) -> bool {
        self.configuration_id >= 0
    }

    /// Bind the request to a concrete configuration.
    ///
    /// Resolving to the id the request already carries is a no-op; anything
    /// else on a resolved request is an internal error.
    pub fn resolve_configuration(&mut self, configuration_id: i32) -> Result<()> {
        verify_internal(configuration_id >= 0, || {
            format!("cannot resolve a request to the invalid configuration id {configuration_id}")
        })?;
        verify_internal(
            !self.is_configuration_resolved() || self.configuration_id == configuration_id,
            || {
                format!(
                    "request already resolved to configuration {}, cannot resolve to {configuration_id}",
                    self.configuration_id
                )
            },
        )?;
        trace!(
            submission = self.submission_id,
            node_request = self.node_request_id,
            configuration = configuration_id,
            "request configuration resolved"
        );
        self.configuration_id = configuration_id;
        Ok(())
    }
}
