// src/tasks/builtin.rs

//! Core task library: `Message`, `Warning`, `Error`, `Exec`, `CallTarget`
//! and `MSBuild`.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::errors::{codes, BuildError, Result};
use crate::evaluation::TaskItem;
use crate::protocol::task_host::{GlobalProperties, TaskHostBuildRequest};
use crate::registry::factory::{TaskLibrary, TaskType, CORE_TASKS_LIBRARY};
use crate::registry::param_types::{TaskParameterType, TaskParameterValue};
use crate::registry::record::TaskPropertyInfo;
use crate::tasks::{is_param, BuildEngine, Task};
use crate::types::MessageImportance;

/// Metadata stamped on items returned by the `MSBuild` task.
pub const SOURCE_PROJECT_METADATA: &str = "MSBuildSourceProjectFile";
pub const SOURCE_TARGET_METADATA: &str = "MSBuildSourceTargetName";

pub fn core_library() -> TaskLibrary {
    TaskLibrary::new(CORE_TASKS_LIBRARY)
        .with_task(TaskType::new(
            "Message",
            vec![
                TaskPropertyInfo::input("Text", TaskParameterType::STRING),
                TaskPropertyInfo::input("Importance", TaskParameterType::STRING),
            ],
            || Box::new(MessageTask::default()),
        ))
        .with_task(TaskType::new(
            "Warning",
            vec![
                TaskPropertyInfo::input("Text", TaskParameterType::STRING),
                TaskPropertyInfo::input("Code", TaskParameterType::STRING),
            ],
            || Box::new(DiagnosticTask::warning()),
        ))
        .with_task(TaskType::new(
            "Error",
            vec![
                TaskPropertyInfo::input("Text", TaskParameterType::STRING),
                TaskPropertyInfo::input("Code", TaskParameterType::STRING),
            ],
            || Box::new(DiagnosticTask::error()),
        ))
        .with_task(TaskType::new(
            "Exec",
            vec![
                TaskPropertyInfo::input("Command", TaskParameterType::STRING).required(),
                TaskPropertyInfo::input("WorkingDirectory", TaskParameterType::STRING),
                TaskPropertyInfo::input("IgnoreExitCode", TaskParameterType::BOOL),
                TaskPropertyInfo::output("ExitCode", TaskParameterType::INT32),
                TaskPropertyInfo::output("ConsoleOutput", TaskParameterType::ITEMS),
            ],
            || Box::new(ExecTask::default()),
        ))
        .with_task(TaskType::new(
            "CallTarget",
            vec![
                TaskPropertyInfo::input("Targets", TaskParameterType::STRINGS),
                TaskPropertyInfo::input("RunEachTargetSeparately", TaskParameterType::BOOL),
                TaskPropertyInfo::output("TargetOutputs", TaskParameterType::ITEMS),
            ],
            || Box::new(CallTargetTask::default()),
        ))
        .with_task(TaskType::new(
            "MSBuild",
            vec![
                TaskPropertyInfo::input("Projects", TaskParameterType::ITEMS).required(),
                TaskPropertyInfo::input("Targets", TaskParameterType::STRINGS),
                TaskPropertyInfo::input("Properties", TaskParameterType::STRINGS),
                TaskPropertyInfo::input("RemoveProperties", TaskParameterType::STRINGS),
                TaskPropertyInfo::input("ToolsVersion", TaskParameterType::STRING),
                TaskPropertyInfo::input("UseResultsCache", TaskParameterType::BOOL),
                TaskPropertyInfo::input("UnloadProjectsOnCompletion", TaskParameterType::BOOL),
                TaskPropertyInfo::output("TargetOutputs", TaskParameterType::ITEMS),
            ],
            || Box::new(MsBuildTask::default()),
        ))
}

fn unknown_parameter(task: &str, name: &str) -> String {
    format!("the \"{task}\" task does not have a parameter named \"{name}\"")
}

fn flag(value: &TaskParameterValue, name: &str) -> std::result::Result<bool, String> {
    value
        .as_bool()
        .ok_or_else(|| format!("the value of \"{name}\" is not a boolean"))
}

fn joined(value: TaskParameterValue) -> String {
    value.into_strings().join(";")
}

#[derive(Debug, Default)]
pub struct MessageTask {
    text: String,
    importance: MessageImportance,
}

impl Task for MessageTask {
    fn set_parameter(&mut self, name: &str, value: TaskParameterValue) -> std::result::Result<(), String> {
        if is_param(name, "Text") {
            self.text = joined(value);
        } else if is_param(name, "Importance") {
            self.importance = joined(value).parse()?;
        } else {
            return Err(unknown_parameter("Message", name));
        }
        Ok(())
    }

    fn execute(&mut self, engine: &mut dyn BuildEngine) -> Result<bool> {
        if !self.text.is_empty() {
            engine.log_message(self.importance, &self.text);
        }
        Ok(true)
    }

    fn get_output(&self, _name: &str) -> Option<TaskParameterValue> {
        None
    }
}

/// `Warning` and `Error`. An error always fails the task.
#[derive(Debug)]
pub struct DiagnosticTask {
    is_error: bool,
    text: String,
    code: Option<String>,
}

impl DiagnosticTask {
    pub fn warning() -> Self {
        Self {
            is_error: false,
            text: String::new(),
            code: None,
        }
    }

    pub fn error() -> Self {
        Self {
            is_error: true,
            text: String::new(),
            code: None,
        }
    }

    fn task_name(&self) -> &'static str {
        if self.is_error { "Error" } else { "Warning" }
    }
}

impl Task for DiagnosticTask {
    fn set_parameter(&mut self, name: &str, value: TaskParameterValue) -> std::result::Result<(), String> {
        if is_param(name, "Text") {
            self.text = joined(value);
        } else if is_param(name, "Code") {
            let code = joined(value);
            self.code = (!code.is_empty()).then_some(code);
        } else {
            return Err(unknown_parameter(self.task_name(), name));
        }
        Ok(())
    }

    fn execute(&mut self, engine: &mut dyn BuildEngine) -> Result<bool> {
        if self.is_error {
            engine.log_error(self.code.as_deref(), &self.text);
            Ok(false)
        } else {
            engine.log_warning(self.code.as_deref(), &self.text);
            Ok(true)
        }
    }

    fn get_output(&self, _name: &str) -> Option<TaskParameterValue> {
        None
    }
}

/// Run a command line through the platform shell.
pub(crate) fn shell_command(command_line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command_line);
        c
    }
}

/// Run `command_line` in `directory`, logging its output through the engine.
/// Returns the exit code (`-1` when killed by a signal) and stdout lines.
pub(crate) fn run_command(
    engine: &mut dyn BuildEngine,
    command_line: &str,
    directory: &Path,
) -> Result<(i32, Vec<String>)> {
    info!(cmd = %command_line, dir = %directory.display(), "running command");
    let output = shell_command(command_line)
        .current_dir(directory)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            BuildError::TaskHost(format!("failed to spawn \"{command_line}\": {e}"))
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<String> = stdout.lines().map(str::to_string).collect();
    for line in &lines {
        engine.log_message(MessageImportance::Normal, line);
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        debug!(cmd = %command_line, "stderr: {}", line);
        engine.log_message(MessageImportance::Normal, line);
    }
    let code = output.status.code().unwrap_or(-1);
    debug!(cmd = %command_line, exit_code = code, "command exited");
    Ok((code, lines))
}

#[derive(Debug, Default)]
pub struct ExecTask {
    command: String,
    working_directory: Option<String>,
    ignore_exit_code: bool,
    exit_code: Option<i32>,
    console_output: Vec<String>,
}

impl Task for ExecTask {
    fn set_parameter(&mut self, name: &str, value: TaskParameterValue) -> std::result::Result<(), String> {
        if is_param(name, "Command") {
            self.command = joined(value);
        } else if is_param(name, "WorkingDirectory") {
            let dir = joined(value);
            self.working_directory = (!dir.is_empty()).then_some(dir);
        } else if is_param(name, "IgnoreExitCode") {
            self.ignore_exit_code = flag(&value, name)?;
        } else {
            return Err(unknown_parameter("Exec", name));
        }
        Ok(())
    }

    fn execute(&mut self, engine: &mut dyn BuildEngine) -> Result<bool> {
        if engine.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let project_dir = engine.project_directory();
        let directory = match self.working_directory.as_deref() {
            Some(dir) => project_dir.join(dir),
            None => project_dir,
        };
        let (code, lines) = run_command(engine, &self.command, &directory)?;
        self.exit_code = Some(code);
        self.console_output = lines;

        if code != 0 && !self.ignore_exit_code {
            engine.log_error(
                Some(codes::EXEC_COMMAND_FAILED),
                &format!("the command \"{}\" exited with code {code}", self.command),
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn get_output(&self, name: &str) -> Option<TaskParameterValue> {
        if is_param(name, "ExitCode") {
            self.exit_code.map(|c| TaskParameterValue::int(i64::from(c)))
        } else if is_param(name, "ConsoleOutput") {
            Some(TaskParameterValue::Items(
                self.console_output.iter().map(TaskItem::new).collect(),
            ))
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct CallTargetTask {
    targets: Vec<String>,
    run_each_target_separately: bool,
    outputs: Vec<TaskItem>,
}

impl Task for CallTargetTask {
    fn set_parameter(&mut self, name: &str, value: TaskParameterValue) -> std::result::Result<(), String> {
        if is_param(name, "Targets") {
            self.targets = value.into_strings();
        } else if is_param(name, "RunEachTargetSeparately") {
            self.run_each_target_separately = flag(&value, name)?;
        } else {
            return Err(unknown_parameter("CallTarget", name));
        }
        Ok(())
    }

    fn execute(&mut self, engine: &mut dyn BuildEngine) -> Result<bool> {
        if self.targets.is_empty() {
            return Ok(true);
        }
        let result = engine.call_targets(&self.targets, self.run_each_target_separately)?;
        self.outputs = result.outputs;
        Ok(result.succeeded)
    }

    fn get_output(&self, name: &str) -> Option<TaskParameterValue> {
        is_param(name, "TargetOutputs").then(|| TaskParameterValue::Items(self.outputs.clone()))
    }
}

/// Builds other projects through the engine.
///
/// Uses the BuildEngine3 request shape; setting `UseResultsCache` or
/// `UnloadProjectsOnCompletion` switches to the BuildEngine2 parallel shape,
/// which is the only one carrying those flags.
#[derive(Debug, Default)]
pub struct MsBuildTask {
    projects: Vec<TaskItem>,
    targets: Vec<String>,
    properties: Vec<String>,
    remove_properties: Vec<String>,
    tools_version: Option<String>,
    use_results_cache: bool,
    unload_projects_on_completion: bool,
    outputs: Vec<TaskItem>,
}

/// Parse `Name=Value` pairs. Returns the offending entry on failure.
pub fn parse_property_list(entries: &[String]) -> std::result::Result<GlobalProperties, String> {
    let mut properties = GlobalProperties::new();
    for entry in entries {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                properties.insert(name.trim().to_string(), value.trim().to_string());
            }
            _ => return Err(trimmed.to_string()),
        }
    }
    Ok(properties)
}

impl Task for MsBuildTask {
    fn set_parameter(&mut self, name: &str, value: TaskParameterValue) -> std::result::Result<(), String> {
        if is_param(name, "Projects") {
            self.projects = value.into_items();
        } else if is_param(name, "Targets") {
            self.targets = value.into_strings();
        } else if is_param(name, "Properties") {
            self.properties = value.into_strings();
        } else if is_param(name, "RemoveProperties") {
            self.remove_properties = value.into_strings();
        } else if is_param(name, "ToolsVersion") {
            let version = joined(value);
            self.tools_version = (!version.is_empty()).then_some(version);
        } else if is_param(name, "UseResultsCache") {
            self.use_results_cache = flag(&value, name)?;
        } else if is_param(name, "UnloadProjectsOnCompletion") {
            self.unload_projects_on_completion = flag(&value, name)?;
        } else {
            return Err(unknown_parameter("MSBuild", name));
        }
        Ok(())
    }

    fn execute(&mut self, engine: &mut dyn BuildEngine) -> Result<bool> {
        if self.projects.is_empty() {
            return Ok(true);
        }
        let shared = match parse_property_list(&self.properties) {
            Ok(p) => p,
            Err(entry) => {
                engine.log_error(
                    Some(codes::INVALID_PROPERTY_SYNTAX),
                    &format!("the property \"{entry}\" is not of the form Name=Value"),
                );
                return Ok(false);
            }
        };

        let project_dir = engine.project_directory();
        let mut files = Vec::with_capacity(self.projects.len());
        let mut global_properties = Vec::with_capacity(self.projects.len());
        for project in &self.projects {
            files.push(project_dir.join(&project.item_spec).to_string_lossy().into_owned());

            let additional = project.get_metadata("AdditionalProperties");
            let additional: Vec<String> = additional.split(';').map(str::to_string).collect();
            let mut properties = shared.clone();
            match parse_property_list(&additional) {
                Ok(extra) => properties.extend(extra),
                Err(entry) => {
                    engine.log_error(
                        Some(codes::INVALID_PROPERTY_SYNTAX),
                        &format!("the property \"{entry}\" is not of the form Name=Value"),
                    );
                    return Ok(false);
                }
            }
            global_properties.push((!properties.is_empty()).then_some(properties));
        }
        let tools_versions = vec![self.tools_version.clone(); files.len()];

        let request = if self.use_results_cache || self.unload_projects_on_completion {
            TaskHostBuildRequest::build_engine2_parallel(
                files.clone(),
                self.targets.clone(),
                global_properties,
                tools_versions,
                self.use_results_cache,
                self.unload_projects_on_completion,
            )
        } else {
            let removes = (!self.remove_properties.is_empty()).then(|| self.remove_properties.clone());
            TaskHostBuildRequest::build_engine3_parallel(
                files.clone(),
                self.targets.clone(),
                global_properties,
                vec![removes; files.len()],
                tools_versions,
                true,
            )
        };

        let response = engine.build_project_files(request)?;
        self.outputs.clear();
        let per_project: Vec<_> = match response.get_target_outputs_for_build_engine_result() {
            Some(maps) => maps.iter().collect(),
            None => response.get_target_outputs_for_single_project().into_iter().collect(),
        };
        for (file, outputs) in files.iter().zip(per_project) {
            for (target, items) in outputs {
                for item in items {
                    let mut item = item.clone();
                    item.metadata
                        .entry(SOURCE_PROJECT_METADATA.to_string())
                        .or_insert_with(|| file.clone());
                    item.metadata
                        .entry(SOURCE_TARGET_METADATA.to_string())
                        .or_insert_with(|| target.clone());
                    self.outputs.push(item);
                }
            }
        }
        Ok(response.overall_result())
    }

    fn get_output(&self, name: &str) -> Option<TaskParameterValue> {
        is_param(name, "TargetOutputs").then(|| TaskParameterValue::Items(self.outputs.clone()))
    }
}
