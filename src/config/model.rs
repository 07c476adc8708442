// src/config/model.rs

use std::sync::Arc;

use serde::Deserialize;

use crate::node::{NodeProvider, ThreadSafeTaskRegistry};
use crate::project::DEFAULT_TOOLS_VERSION;
use crate::types::TaskHostRuntime;

/// Engine settings as read from a TOML file.
///
/// ```toml
/// [build]
/// multi_threaded = true
/// target_output_logging = false
/// default_tools_version = "Current"
///
/// [task_host]
/// thread_safe_tasks = ["Copy", "Touch"]
/// supported_runtimes = ["NET", "CLR4"]
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSettingsFile {
    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub task_host: TaskHostSection,
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    /// Run thread-safe tasks in process and everything else in a task host.
    #[serde(default)]
    pub multi_threaded: bool,

    /// Treat the whole build as out of process: every task goes to a host.
    #[serde(default)]
    pub disable_in_proc_node: bool,

    /// Attach output items to target-finished events.
    #[serde(default)]
    pub target_output_logging: bool,

    /// Tools version for submissions that do not request one. Child
    /// projects inherit their parent's tools version.
    #[serde(default = "default_tools_version")]
    pub default_tools_version: String,
}

fn default_tools_version() -> String {
    DEFAULT_TOOLS_VERSION.to_string()
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            multi_threaded: false,
            disable_in_proc_node: false,
            target_output_logging: false,
            default_tools_version: default_tools_version(),
        }
    }
}

/// `[task_host]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskHostSection {
    /// Added to the built-in thread-safe allowlist.
    #[serde(default)]
    pub thread_safe_tasks: Vec<String>,

    /// Runtimes a task host may be launched for.
    #[serde(default = "default_supported_runtimes")]
    pub supported_runtimes: Vec<String>,
}

fn default_supported_runtimes() -> Vec<String> {
    vec!["NET".to_string(), "CLR4".to_string()]
}

impl Default for TaskHostSection {
    fn default() -> Self {
        Self {
            thread_safe_tasks: Vec::new(),
            supported_runtimes: default_supported_runtimes(),
        }
    }
}

/// Validated engine settings.
///
/// Built from a [`RawSettingsFile`] through `TryFrom` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub multi_threaded: bool,
    pub disable_in_proc_node: bool,
    pub target_output_logging: bool,
    pub default_tools_version: String,
    pub thread_safe_tasks: Arc<ThreadSafeTaskRegistry>,
    pub supported_runtimes: Vec<TaskHostRuntime>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            multi_threaded: false,
            disable_in_proc_node: false,
            target_output_logging: false,
            default_tools_version: default_tools_version(),
            thread_safe_tasks: Arc::new(ThreadSafeTaskRegistry::default()),
            supported_runtimes: vec![TaskHostRuntime::Net, TaskHostRuntime::Clr4],
        }
    }
}

impl BuildSettings {
    /// Environment variable that switches target output logging on.
    pub const TARGET_OUTPUT_LOGGING_ENV: &'static str = "MSBUILDTARGETOUTPUTLOGGING";

    /// Apply overrides from the process environment.
    pub fn with_environment_overlay(self) -> Self {
        let value = std::env::var(Self::TARGET_OUTPUT_LOGGING_ENV).ok();
        self.with_target_output_logging_env(value.as_deref())
    }

    /// Overlay a value of `MSBUILDTARGETOUTPUTLOGGING`. Any non-empty value
    /// other than `0` or `false` enables target output logging; otherwise
    /// the file setting stands.
    pub fn with_target_output_logging_env(mut self, value: Option<&str>) -> Self {
        if let Some(value) = value.map(str::trim) {
            if !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false") {
                self.target_output_logging = true;
            }
        }
        self
    }

    pub fn node_provider(&self) -> NodeProvider {
        NodeProvider::new(self.multi_threaded, self.disable_in_proc_node)
            .with_thread_safe_tasks(Arc::clone(&self.thread_safe_tasks))
            .with_supported_runtimes(self.supported_runtimes.clone())
    }
}
