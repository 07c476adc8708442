// src/node/provider.rs

//! Where a task runs: in this process or in a task host.

use std::sync::Arc;

use tracing::trace;

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::node::thread_safe::ThreadSafeTaskRegistry;
use crate::types::{TaskHostArchitecture, TaskHostRuntime};

#[derive(Debug, Clone)]
pub struct NodeProvider {
    multi_threaded: bool,
    out_of_proc: bool,
    thread_safe: Arc<ThreadSafeTaskRegistry>,
    supported_runtimes: Vec<TaskHostRuntime>,
}

impl Default for NodeProvider {
    fn default() -> Self {
        Self {
            multi_threaded: false,
            out_of_proc: false,
            thread_safe: Arc::new(ThreadSafeTaskRegistry::default()),
            supported_runtimes: vec![TaskHostRuntime::Net, TaskHostRuntime::Clr4],
        }
    }
}

impl NodeProvider {
    pub fn new(multi_threaded: bool, out_of_proc: bool) -> Self {
        Self {
            multi_threaded,
            out_of_proc,
            ..Self::default()
        }
    }

    pub fn with_thread_safe_tasks(mut self, registry: Arc<ThreadSafeTaskRegistry>) -> Self {
        self.thread_safe = registry;
        self
    }

    pub fn with_supported_runtimes(mut self, runtimes: Vec<TaskHostRuntime>) -> Self {
        self.supported_runtimes = runtimes;
        self
    }

    pub fn is_multi_threaded(&self) -> bool {
        self.multi_threaded
    }

    pub fn is_out_of_proc(&self) -> bool {
        self.out_of_proc
    }

    pub fn thread_safe_tasks(&self) -> &ThreadSafeTaskRegistry {
        &self.thread_safe
    }

    pub fn supported_runtimes(&self) -> &[TaskHostRuntime] {
        &self.supported_runtimes
    }

    /// Routing by build mode.
    ///
    /// Single-threaded builds keep the build's own out-of-proc setting. A
    /// multi-threaded in-process build sends every task that is not on the
    /// thread-safe allowlist to a task host.
    pub fn should_task_execute_out_of_proc(&self, task_name: Option<&str>) -> bool {
        if !self.multi_threaded || self.out_of_proc {
            return self.out_of_proc;
        }
        let out_of_proc = !self.thread_safe.is_task_thread_safe(task_name);
        trace!(task = ?task_name, out_of_proc, "multi-threaded task routing");
        out_of_proc
    }

    /// A task needing another runtime or architecture than this process
    /// must run in a task host.
    pub fn requires_task_host(&self, runtime: TaskHostRuntime, architecture: TaskHostArchitecture) -> bool {
        !runtime.matches(TaskHostRuntime::PROCESS) || !architecture.matches(TaskHostArchitecture::process())
    }

    pub fn validate_runtime(&self, runtime: TaskHostRuntime, task_name: &str, location: &ElementLocation) -> Result<()> {
        let runtime = runtime.resolve();
        if self.supported_runtimes.iter().any(|r| r.matches(runtime)) {
            return Ok(());
        }
        Err(BuildError::invalid_project(
            codes::UNSUPPORTED_TASK_HOST_RUNTIME,
            location,
            format!(
                "the task \"{task_name}\" requested the \"{runtime}\" runtime, which this build cannot host; supported runtimes: {}",
                self.supported_runtimes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ))
    }
}
