// src/tasks/command_line.rs

//! Data-driven command-line tasks.
//!
//! The task body is a TOML document describing how parameters map onto the
//! switches of a tool:
//!
//! ```toml
//! command = "rustc"
//!
//! [switches]
//! Verbose = "-v"            # boolean: emitted when true
//! Output = "-o {value}"     # scalar: value substituted
//! Sources = "{value}"       # list: emitted once per entry
//! ```
//!
//! Switch names that are not declared in the parameter group become string
//! parameters (boolean when the template has no `{value}`).

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::registry::param_types::{TaskParameterType, TaskParameterValue};
use crate::registry::record::TaskPropertyInfo;
use crate::tasks::builtin::run_command;
use crate::tasks::{is_param, BuildEngine, Task};

const VALUE_PLACEHOLDER: &str = "{value}";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCommandLine {
    command: String,
    #[serde(default)]
    working_directory: Option<String>,
    #[serde(default)]
    switches: IndexMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CommandLineTaskDefinition {
    name: String,
    command: String,
    working_directory: Option<String>,
    switches: IndexMap<String, String>,
    parameters: Vec<TaskPropertyInfo>,
}

impl CommandLineTaskDefinition {
    pub fn parse(
        name: &str,
        body: &str,
        declared: &[TaskPropertyInfo],
        location: &ElementLocation,
    ) -> Result<Self> {
        let raw: RawCommandLine = toml::from_str(body).map_err(|e| {
            BuildError::invalid_project(
                codes::INVALID_TASK_BODY,
                location,
                format!("the command-line task \"{name}\" has an invalid body: {e}"),
            )
        })?;
        if raw.command.trim().is_empty() {
            return Err(BuildError::invalid_project(
                codes::INVALID_TASK_BODY,
                location,
                format!("the command-line task \"{name}\" does not name a command"),
            ));
        }

        let mut parameters: Vec<TaskPropertyInfo> = declared.to_vec();
        for (switch, template) in raw.switches.iter() {
            if parameters.iter().any(|p| p.name.eq_ignore_ascii_case(switch)) {
                continue;
            }
            let parameter_type = if template.contains(VALUE_PLACEHOLDER) {
                TaskParameterType::STRING
            } else {
                TaskParameterType::BOOL
            };
            parameters.push(TaskPropertyInfo::input(switch.clone(), parameter_type));
        }
        if !parameters.iter().any(|p| is_param(&p.name, "ExitCode")) {
            parameters.push(TaskPropertyInfo::output("ExitCode", TaskParameterType::INT32));
        }

        Ok(Self {
            name: name.to_string(),
            command: raw.command.trim().to_string(),
            working_directory: raw.working_directory,
            switches: raw.switches,
            parameters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> Vec<TaskPropertyInfo> {
        self.parameters.clone()
    }

    /// Command line for the given parameter values (keys lower-cased).
    pub fn render(&self, values: &IndexMap<String, TaskParameterValue>) -> String {
        let mut parts = vec![self.command.clone()];
        for (switch, template) in self.switches.iter() {
            let Some(value) = values.get(&switch.to_lowercase()) else {
                continue;
            };
            if !template.contains(VALUE_PLACEHOLDER) {
                if value.as_bool().unwrap_or(false) {
                    parts.push(template.clone());
                }
                continue;
            }
            for entry in value.clone().into_strings() {
                if entry.is_empty() {
                    continue;
                }
                parts.push(template.replace(VALUE_PLACEHOLDER, &quote(&entry)));
            }
        }
        parts.join(" ")
    }

    pub fn instantiate(self: &Arc<Self>) -> Box<dyn Task> {
        Box::new(CommandLineTask {
            definition: Arc::clone(self),
            values: IndexMap::new(),
            exit_code: None,
        })
    }
}

fn quote(value: &str) -> String {
    if value.contains(char::is_whitespace) && !value.starts_with('"') {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

#[derive(Debug)]
struct CommandLineTask {
    definition: Arc<CommandLineTaskDefinition>,
    values: IndexMap<String, TaskParameterValue>,
    exit_code: Option<i32>,
}

impl Task for CommandLineTask {
    fn set_parameter(&mut self, name: &str, value: TaskParameterValue) -> std::result::Result<(), String> {
        let known = self
            .definition
            .parameters
            .iter()
            .any(|p| !p.output && p.name.eq_ignore_ascii_case(name));
        if !known {
            return Err(format!(
                "the task \"{}\" does not have an input parameter named \"{name}\"",
                self.definition.name
            ));
        }
        self.values.insert(name.to_lowercase(), value);
        Ok(())
    }

    fn execute(&mut self, engine: &mut dyn BuildEngine) -> Result<bool> {
        if engine.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let command_line = self.definition.render(&self.values);
        let project_dir = engine.project_directory();
        let directory = match self.definition.working_directory.as_deref() {
            Some(dir) => project_dir.join(dir),
            None => project_dir,
        };
        let (code, _) = run_command(engine, &command_line, &directory)?;
        self.exit_code = Some(code);
        if code != 0 {
            engine.log_error(
                Some(codes::EXEC_COMMAND_FAILED),
                &format!("the command \"{command_line}\" exited with code {code}"),
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn get_output(&self, name: &str) -> Option<TaskParameterValue> {
        if is_param(name, "ExitCode") {
            return self.exit_code.map(|c| TaskParameterValue::int(i64::from(c)));
        }
        None
    }
}
