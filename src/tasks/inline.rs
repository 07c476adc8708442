// src/tasks/inline.rs

//! Inline tasks built from a using-task body.
//!
//! The body is a small line-oriented script over the declared parameters:
//!
//! ```text
//! # comment
//! log: Building {Name}
//! log.high: important
//! warn: {Name} is deprecated
//! error: {Name} is broken
//! Greeting = Hello, {Name}!
//! ```
//!
//! `{Param}` interpolates the current value of a parameter. An assignment
//! targets an output parameter. An `error:` line logs and marks the task
//! failed but the remaining lines still run.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::evaluation::TaskItem;
use crate::registry::param_types::TaskParameterValue;
use crate::registry::record::TaskPropertyInfo;
use crate::tasks::{BuildEngine, Task};
use crate::types::MessageImportance;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Statement {
    Log(MessageImportance, String),
    Warn(String),
    Error(String),
    Assign(String, String),
}

#[derive(Debug, Clone)]
pub struct InlineTaskDefinition {
    name: String,
    parameters: Vec<TaskPropertyInfo>,
    statements: Vec<Statement>,
}

impl InlineTaskDefinition {
    pub fn parse(
        name: &str,
        body: &str,
        parameters: &[TaskPropertyInfo],
        location: &ElementLocation,
    ) -> Result<Self> {
        let invalid = |line_no: usize, message: String| {
            BuildError::invalid_project(
                codes::INVALID_TASK_BODY,
                location,
                format!("the inline task \"{name}\" has an invalid body (line {line_no}): {message}"),
            )
        };
        let declared = |param: &str| parameters.iter().find(|p| p.name.eq_ignore_ascii_case(param));

        let mut statements = Vec::new();
        for (idx, raw) in body.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }

            let statement = if let Some((keyword, rest)) = line.split_once(':').filter(|(k, _)| is_keyword(k)) {
                let text = rest.trim().to_string();
                match keyword.trim().to_lowercase().as_str() {
                    "log" => Statement::Log(MessageImportance::Normal, text),
                    "log.high" => Statement::Log(MessageImportance::High, text),
                    "log.low" => Statement::Log(MessageImportance::Low, text),
                    "warn" => Statement::Warn(text),
                    _ => Statement::Error(text),
                }
            } else if let Some((target, value)) = line.split_once('=') {
                let target = target.trim();
                match declared(target) {
                    Some(p) if p.output => Statement::Assign(p.name.clone(), value.trim().to_string()),
                    Some(_) => {
                        return Err(invalid(line_no, format!("\"{target}\" is not an output parameter")));
                    }
                    None => {
                        return Err(invalid(line_no, format!("\"{target}\" is not a declared parameter")));
                    }
                }
            } else {
                return Err(invalid(line_no, format!("unrecognized statement \"{line}\"")));
            };

            let template = match &statement {
                Statement::Log(_, t) | Statement::Warn(t) | Statement::Error(t) | Statement::Assign(_, t) => t,
            };
            for placeholder in placeholders(template) {
                if declared(placeholder).is_none() {
                    return Err(invalid(
                        line_no,
                        format!("\"{{{placeholder}}}\" does not name a declared parameter"),
                    ));
                }
            }
            statements.push(statement);
        }

        Ok(Self {
            name: name.to_string(),
            parameters: parameters.to_vec(),
            statements,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(self: &Arc<Self>) -> Box<dyn Task> {
        Box::new(InlineTask {
            definition: Arc::clone(self),
            values: IndexMap::new(),
        })
    }
}

fn is_keyword(keyword: &str) -> bool {
    matches!(
        keyword.trim().to_lowercase().as_str(),
        "log" | "log.high" | "log.low" | "warn" | "error"
    )
}

/// Names inside `{...}` in order of appearance.
fn placeholders(template: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        found.push(after[..close].trim());
        rest = &after[close + 1..];
    }
    found
}

#[derive(Debug)]
struct InlineTask {
    definition: Arc<InlineTaskDefinition>,
    values: IndexMap<String, String>,
}

impl InlineTask {
    fn interpolate(&self, template: &str) -> String {
        let mut out = template.to_string();
        for name in placeholders(template) {
            let value = self
                .values
                .get(&name.to_lowercase())
                .map(String::as_str)
                .unwrap_or("");
            out = out.replacen(&format!("{{{name}}}"), value, 1);
        }
        out
    }
}

impl Task for InlineTask {
    fn set_parameter(&mut self, name: &str, value: TaskParameterValue) -> std::result::Result<(), String> {
        if !self
            .definition
            .parameters
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(name))
        {
            return Err(format!(
                "the inline task \"{}\" does not declare a parameter named \"{name}\"",
                self.definition.name
            ));
        }
        self.values
            .insert(name.to_lowercase(), value.into_strings().join(";"));
        Ok(())
    }

    fn execute(&mut self, engine: &mut dyn BuildEngine) -> Result<bool> {
        let mut succeeded = true;
        for statement in self.definition.statements.clone() {
            match statement {
                Statement::Log(importance, template) => {
                    engine.log_message(importance, &self.interpolate(&template));
                }
                Statement::Warn(template) => engine.log_warning(None, &self.interpolate(&template)),
                Statement::Error(template) => {
                    engine.log_error(None, &self.interpolate(&template));
                    succeeded = false;
                }
                Statement::Assign(target, template) => {
                    let value = self.interpolate(&template);
                    self.values.insert(target.to_lowercase(), value);
                }
            }
        }
        Ok(succeeded)
    }

    fn get_output(&self, name: &str) -> Option<TaskParameterValue> {
        let parameter = self
            .definition
            .parameters
            .iter()
            .find(|p| p.output && p.name.eq_ignore_ascii_case(name))?;
        let raw = self.values.get(&name.to_lowercase())?;
        let items = raw
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(TaskItem::new)
            .collect();
        parameter.parameter_type.convert(items).ok().flatten()
    }
}
