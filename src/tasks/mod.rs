// src/tasks/mod.rs

//! Task contract and the built-in task implementations.
//!
//! A task receives its parameters through [`Task::set_parameter`], runs
//! against a [`BuildEngine`] callback surface, and exposes outputs through
//! [`Task::get_output`]. The same contract is used in-process and inside a
//! task host; only the [`BuildEngine`] implementation differs.

pub mod builtin;
pub mod command_line;
pub mod inline;

use std::path::PathBuf;

use crate::errors::Result;
use crate::evaluation::TaskItem;
use crate::events::BuildEvent;
use crate::protocol::task_host::{TaskHostBuildRequest, TaskHostBuildResponse};
use crate::registry::param_types::TaskParameterValue;
use crate::types::MessageImportance;

pub trait Task: Send {
    /// Bind a parameter. Unknown names or values of the wrong shape are
    /// reported back as a message.
    fn set_parameter(&mut self, name: &str, value: TaskParameterValue) -> std::result::Result<(), String>;

    /// Run the task. `Ok(false)` is an ordinary task failure; `Err` means
    /// the task itself blew up.
    fn execute(&mut self, engine: &mut dyn BuildEngine) -> Result<bool>;

    fn get_output(&self, name: &str) -> Option<TaskParameterValue>;
}

/// What a running task can ask of the engine.
pub trait BuildEngine {
    fn log(&mut self, event: BuildEvent);

    /// Build other projects (the `MSBuild` task and host callbacks).
    fn build_project_files(&mut self, request: TaskHostBuildRequest) -> Result<TaskHostBuildResponse>;

    /// Run targets of the current project (the `CallTarget` task).
    fn call_targets(&mut self, targets: &[String], run_each_separately: bool) -> Result<CallTargetResult>;

    fn is_cancelled(&self) -> bool;

    fn project_file(&self) -> String;

    fn project_directory(&self) -> PathBuf;

    fn log_message(&mut self, importance: MessageImportance, text: &str) {
        self.log(BuildEvent::message(importance, text));
    }

    fn log_warning(&mut self, code: Option<&str>, text: &str) {
        self.log(BuildEvent::warning(code, text));
    }

    fn log_error(&mut self, code: Option<&str>, text: &str) {
        let file = self.project_file();
        self.log(BuildEvent::error(code, text, Some(&file)));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallTargetResult {
    pub succeeded: bool,
    pub outputs: Vec<TaskItem>,
}

/// Case-insensitive parameter name comparison used by task implementations.
pub(crate) fn is_param(name: &str, expected: &str) -> bool {
    name.eq_ignore_ascii_case(expected)
}
