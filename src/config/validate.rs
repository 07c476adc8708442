// src/config/validate.rs

use std::sync::Arc;

use crate::config::model::{BuildSettings, RawSettingsFile};
use crate::errors::{BuildError, Result};
use crate::node::ThreadSafeTaskRegistry;
use crate::types::TaskHostRuntime;

impl TryFrom<RawSettingsFile> for BuildSettings {
    type Error = BuildError;

    fn try_from(raw: RawSettingsFile) -> std::result::Result<Self, Self::Error> {
        validate_build_section(&raw)?;
        validate_thread_safe_tasks(&raw)?;
        let supported_runtimes = parse_supported_runtimes(&raw)?;

        let thread_safe_tasks =
            ThreadSafeTaskRegistry::default().with_additional(raw.task_host.thread_safe_tasks.iter());

        Ok(BuildSettings {
            multi_threaded: raw.build.multi_threaded,
            disable_in_proc_node: raw.build.disable_in_proc_node,
            target_output_logging: raw.build.target_output_logging,
            default_tools_version: raw.build.default_tools_version.trim().to_string(),
            thread_safe_tasks: Arc::new(thread_safe_tasks),
            supported_runtimes,
        })
    }
}

fn validate_build_section(raw: &RawSettingsFile) -> Result<()> {
    if raw.build.default_tools_version.trim().is_empty() {
        return Err(BuildError::ConfigError(
            "[build].default_tools_version must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_thread_safe_tasks(raw: &RawSettingsFile) -> Result<()> {
    for (index, name) in raw.task_host.thread_safe_tasks.iter().enumerate() {
        if name.trim().is_empty() {
            return Err(BuildError::ConfigError(format!(
                "[task_host].thread_safe_tasks[{index}] is blank"
            )));
        }
    }
    Ok(())
}

fn parse_supported_runtimes(raw: &RawSettingsFile) -> Result<Vec<TaskHostRuntime>> {
    if raw.task_host.supported_runtimes.is_empty() {
        return Err(BuildError::ConfigError(
            "[task_host].supported_runtimes must name at least one runtime".to_string(),
        ));
    }
    raw.task_host
        .supported_runtimes
        .iter()
        .map(|name| {
            name.parse::<TaskHostRuntime>().map_err(|e| {
                BuildError::ConfigError(format!("[task_host].supported_runtimes: {e}"))
            })
        })
        .collect()
}
