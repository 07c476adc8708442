// src/protocol/task_host.rs

//! Build requests a task running in a task host sends back to its parent,
//! and the parent's responses.
//!
//! Hosted tasks can ask the engine to build projects through four historical
//! callback shapes. Each shape is one variant of [`TaskHostBuildPayload`], so
//! only the fields valid for a variant can be set. Optional collections keep
//! `None` distinct from empty all the way through the wire.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::evaluation::TaskItem;

pub type GlobalProperties = BTreeMap<String, String>;

/// Outputs of one project, keyed by target name.
pub type TargetOutputs = BTreeMap<String, Vec<TaskItem>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildEngineVariant {
    BuildEngine1,
    BuildEngine2Single,
    BuildEngine2Parallel,
    BuildEngine3Parallel,
}

impl fmt::Display for BuildEngineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildEngineVariant::BuildEngine1 => "BuildEngine1",
            BuildEngineVariant::BuildEngine2Single => "BuildEngine2Single",
            BuildEngineVariant::BuildEngine2Parallel => "BuildEngine2Parallel",
            BuildEngineVariant::BuildEngine3Parallel => "BuildEngine3Parallel",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskHostBuildPayload {
    BuildEngine1 {
        project_file_name: String,
        target_names: Vec<String>,
        global_properties: Option<GlobalProperties>,
    },
    BuildEngine2Single {
        project_file_name: String,
        target_names: Vec<String>,
        global_properties: Option<GlobalProperties>,
        tools_version: Option<String>,
    },
    BuildEngine2Parallel {
        project_file_names: Vec<String>,
        target_names: Vec<String>,
        global_properties: Vec<Option<GlobalProperties>>,
        tools_versions: Vec<Option<String>>,
        use_results_cache: bool,
        unload_projects_on_completion: bool,
    },
    BuildEngine3Parallel {
        project_file_names: Vec<String>,
        target_names: Vec<String>,
        global_properties: Vec<Option<GlobalProperties>>,
        remove_global_properties: Vec<Option<Vec<String>>>,
        tools_versions: Vec<Option<String>>,
        return_target_outputs: bool,
    },
}

/// One project to build, flattened out of any variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInvocation {
    pub project_file: String,
    pub global_properties: Option<GlobalProperties>,
    pub remove_global_properties: Vec<String>,
    pub tools_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHostBuildRequest {
    request_id: i32,
    payload: TaskHostBuildPayload,
}

impl TaskHostBuildRequest {
    pub fn build_engine1(
        project_file_name: impl Into<String>,
        target_names: Vec<String>,
        global_properties: Option<GlobalProperties>,
    ) -> Self {
        Self::from_payload(TaskHostBuildPayload::BuildEngine1 {
            project_file_name: project_file_name.into(),
            target_names,
            global_properties,
        })
    }

    pub fn build_engine2_single(
        project_file_name: impl Into<String>,
        target_names: Vec<String>,
        global_properties: Option<GlobalProperties>,
        tools_version: Option<String>,
    ) -> Self {
        Self::from_payload(TaskHostBuildPayload::BuildEngine2Single {
            project_file_name: project_file_name.into(),
            target_names,
            global_properties,
            tools_version,
        })
    }

    pub fn build_engine2_parallel(
        project_file_names: Vec<String>,
        target_names: Vec<String>,
        global_properties: Vec<Option<GlobalProperties>>,
        tools_versions: Vec<Option<String>>,
        use_results_cache: bool,
        unload_projects_on_completion: bool,
    ) -> Self {
        Self::from_payload(TaskHostBuildPayload::BuildEngine2Parallel {
            project_file_names,
            target_names,
            global_properties,
            tools_versions,
            use_results_cache,
            unload_projects_on_completion,
        })
    }

    pub fn build_engine3_parallel(
        project_file_names: Vec<String>,
        target_names: Vec<String>,
        global_properties: Vec<Option<GlobalProperties>>,
        remove_global_properties: Vec<Option<Vec<String>>>,
        tools_versions: Vec<Option<String>>,
        return_target_outputs: bool,
    ) -> Self {
        Self::from_payload(TaskHostBuildPayload::BuildEngine3Parallel {
            project_file_names,
            target_names,
            global_properties,
            remove_global_properties,
            tools_versions,
            return_target_outputs,
        })
    }

    fn from_payload(payload: TaskHostBuildPayload) -> Self {
        Self {
            request_id: 0,
            payload,
        }
    }

    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    pub fn set_request_id(&mut self, request_id: i32) {
        self.request_id = request_id;
    }

    pub fn with_request_id(mut self, request_id: i32) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn payload(&self) -> &TaskHostBuildPayload {
        &self.payload
    }

    pub fn variant(&self) -> BuildEngineVariant {
        match self.payload {
            TaskHostBuildPayload::BuildEngine1 { .. } => BuildEngineVariant::BuildEngine1,
            TaskHostBuildPayload::BuildEngine2Single { .. } => BuildEngineVariant::BuildEngine2Single,
            TaskHostBuildPayload::BuildEngine2Parallel { .. } => BuildEngineVariant::BuildEngine2Parallel,
            TaskHostBuildPayload::BuildEngine3Parallel { .. } => BuildEngineVariant::BuildEngine3Parallel,
        }
    }

    pub fn target_names(&self) -> &[String] {
        match &self.payload {
            TaskHostBuildPayload::BuildEngine1 { target_names, .. }
            | TaskHostBuildPayload::BuildEngine2Single { target_names, .. }
            | TaskHostBuildPayload::BuildEngine2Parallel { target_names, .. }
            | TaskHostBuildPayload::BuildEngine3Parallel { target_names, .. } => target_names,
        }
    }

    pub fn project_file_names(&self) -> Vec<&str> {
        match &self.payload {
            TaskHostBuildPayload::BuildEngine1 {
                project_file_name, ..
            }
            | TaskHostBuildPayload::BuildEngine2Single {
                project_file_name, ..
            } => vec![project_file_name.as_str()],
            TaskHostBuildPayload::BuildEngine2Parallel {
                project_file_names,
                ..
            }
            | TaskHostBuildPayload::BuildEngine3Parallel {
                project_file_names,
                ..
            } => project_file_names.iter().map(String::as_str).collect(),
        }
    }

    /// Whether the parallel variants are asked to reuse cached results.
    pub fn use_results_cache(&self) -> bool {
        matches!(
            self.payload,
            TaskHostBuildPayload::BuildEngine2Parallel {
                use_results_cache: true,
                ..
            }
        )
    }

    pub fn unload_projects_on_completion(&self) -> bool {
        matches!(
            self.payload,
            TaskHostBuildPayload::BuildEngine2Parallel {
                unload_projects_on_completion: true,
                ..
            }
        )
    }

    /// Only the BuildEngine3 variant can decline target outputs.
    pub fn return_target_outputs(&self) -> bool {
        match self.payload {
            TaskHostBuildPayload::BuildEngine3Parallel {
                return_target_outputs,
                ..
            } => return_target_outputs,
            _ => true,
        }
    }

    /// Whether a response must carry one outputs map per project.
    pub fn is_multi_project(&self) -> bool {
        matches!(
            self.variant(),
            BuildEngineVariant::BuildEngine2Parallel | BuildEngineVariant::BuildEngine3Parallel
        )
    }

    /// Flatten into one invocation per project. Per-project arrays shorter
    /// than the project list leave the missing entries unset.
    pub fn invocations(&self) -> Vec<ProjectInvocation> {
        match &self.payload {
            TaskHostBuildPayload::BuildEngine1 {
                project_file_name,
                global_properties,
                ..
            } => vec![ProjectInvocation {
                project_file: project_file_name.clone(),
                global_properties: global_properties.clone(),
                remove_global_properties: Vec::new(),
                tools_version: None,
            }],
            TaskHostBuildPayload::BuildEngine2Single {
                project_file_name,
                global_properties,
                tools_version,
                ..
            } => vec![ProjectInvocation {
                project_file: project_file_name.clone(),
                global_properties: global_properties.clone(),
                remove_global_properties: Vec::new(),
                tools_version: tools_version.clone(),
            }],
            TaskHostBuildPayload::BuildEngine2Parallel {
                project_file_names,
                global_properties,
                tools_versions,
                ..
            } => project_file_names
                .iter()
                .enumerate()
                .map(|(i, file)| ProjectInvocation {
                    project_file: file.clone(),
                    global_properties: global_properties.get(i).cloned().flatten(),
                    remove_global_properties: Vec::new(),
                    tools_version: tools_versions.get(i).cloned().flatten(),
                })
                .collect(),
            TaskHostBuildPayload::BuildEngine3Parallel {
                project_file_names,
                global_properties,
                remove_global_properties,
                tools_versions,
                ..
            } => project_file_names
                .iter()
                .enumerate()
                .map(|(i, file)| ProjectInvocation {
                    project_file: file.clone(),
                    global_properties: global_properties.get(i).cloned().flatten(),
                    remove_global_properties: remove_global_properties
                        .get(i)
                        .cloned()
                        .flatten()
                        .unwrap_or_default(),
                    tools_version: tools_versions.get(i).cloned().flatten(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskHostBuildOutputs {
    SingleProject(Option<TargetOutputs>),
    PerProject(Option<Vec<TargetOutputs>>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHostBuildResponse {
    request_id: i32,
    overall_result: bool,
    outputs: TaskHostBuildOutputs,
}

impl TaskHostBuildResponse {
    /// Response to a single-project request.
    pub fn for_single_project(
        request_id: i32,
        overall_result: bool,
        target_outputs: Option<TargetOutputs>,
    ) -> Self {
        Self {
            request_id,
            overall_result,
            outputs: TaskHostBuildOutputs::SingleProject(target_outputs),
        }
    }

    /// Response to a parallel request, one outputs map per project.
    pub fn for_build_engine_result(
        request_id: i32,
        overall_result: bool,
        target_outputs_per_project: Option<Vec<TargetOutputs>>,
    ) -> Self {
        Self {
            request_id,
            overall_result,
            outputs: TaskHostBuildOutputs::PerProject(target_outputs_per_project),
        }
    }

    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    pub fn with_request_id(mut self, request_id: i32) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn overall_result(&self) -> bool {
        self.overall_result
    }

    pub fn outputs(&self) -> &TaskHostBuildOutputs {
        &self.outputs
    }

    pub fn get_target_outputs_for_single_project(&self) -> Option<&TargetOutputs> {
        match &self.outputs {
            TaskHostBuildOutputs::SingleProject(outputs) => outputs.as_ref(),
            TaskHostBuildOutputs::PerProject(_) => None,
        }
    }

    pub fn get_target_outputs_for_build_engine_result(&self) -> Option<&[TargetOutputs]> {
        match &self.outputs {
            TaskHostBuildOutputs::PerProject(outputs) => outputs.as_deref(),
            TaskHostBuildOutputs::SingleProject(_) => None,
        }
    }

    /// Every output item, project by project.
    pub fn all_output_items(&self) -> Vec<TaskItem> {
        let maps: Vec<&TargetOutputs> = match &self.outputs {
            TaskHostBuildOutputs::SingleProject(outputs) => outputs.iter().collect(),
            TaskHostBuildOutputs::PerProject(outputs) => outputs.iter().flatten().collect(),
        };
        maps.into_iter()
            .flat_map(|m| m.values())
            .flatten()
            .cloned()
            .collect()
    }
}
