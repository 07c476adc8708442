// src/node/thread_safe.rs

use std::collections::HashSet;

/// Core tasks known to be safe to run concurrently in process.
pub const DEFAULT_THREAD_SAFE_TASKS: &[&str] = &[
    "Message",
    "Warning",
    "Error",
    "ItemGroup",
    "PropertyGroup",
    "CallTarget",
    "MSBuild",
];

/// Allowlist of tasks that may run in process during a multi-threaded build.
///
/// Names compare case-insensitively. The list is built once when the build
/// starts and is read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSafeTaskRegistry {
    tasks: HashSet<String>,
}

impl Default for ThreadSafeTaskRegistry {
    fn default() -> Self {
        Self::from_names(DEFAULT_THREAD_SAFE_TASKS.iter().copied())
    }
}

impl ThreadSafeTaskRegistry {
    pub fn empty() -> Self {
        Self {
            tasks: HashSet::new(),
        }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::empty().with_additional(names)
    }

    /// The allowlist plus `names`. Blank names are ignored.
    pub fn with_additional<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() {
                self.tasks.insert(name.to_lowercase());
            }
        }
        self
    }

    /// Unknown, missing and blank names are never thread-safe.
    pub fn is_task_thread_safe(&self, task_name: Option<&str>) -> bool {
        match task_name.map(str::trim) {
            Some(name) if !name.is_empty() => self.tasks.contains(&name.to_lowercase()),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
