// src/target/result.rs

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::evaluation::TaskItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetResultCode {
    Success,
    Failure,
    Skipped,
}

/// What a target hands back to whoever asked for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResult {
    items: Vec<TaskItem>,
    code: TargetResultCode,
    canceled: bool,
}

impl TargetResult {
    pub fn new(items: Vec<TaskItem>, code: TargetResultCode) -> Self {
        Self {
            items,
            code,
            canceled: false,
        }
    }

    pub fn success(items: Vec<TaskItem>) -> Self {
        Self::new(items, TargetResultCode::Success)
    }

    pub fn failure() -> Self {
        Self::new(Vec::new(), TargetResultCode::Failure)
    }

    pub fn skipped(items: Vec<TaskItem>) -> Self {
        Self::new(items, TargetResultCode::Skipped)
    }

    pub fn canceled() -> Self {
        Self {
            items: Vec::new(),
            code: TargetResultCode::Failure,
            canceled: true,
        }
    }

    pub fn items(&self) -> &[TaskItem] {
        &self.items
    }

    pub fn code(&self) -> TargetResultCode {
        self.code
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    pub fn succeeded(&self) -> bool {
        self.code != TargetResultCode::Failure
    }

    /// An after-target failed: the owning target failed too.
    pub fn mark_failed(&mut self) {
        self.code = TargetResultCode::Failure;
    }
}

/// Results of the targets built so far, keyed by lower-cased target name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResults {
    results: IndexMap<String, (String, TargetResult)>,
}

impl TargetResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, result: TargetResult) {
        self.results
            .insert(name.to_lowercase(), (name.to_string(), result));
    }

    pub fn get(&self, name: &str) -> Option<&TargetResult> {
        self.results.get(&name.to_lowercase()).map(|(_, r)| r)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.results.contains_key(&name.to_lowercase())
    }

    /// Entries in build order, with their declared names.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TargetResult)> {
        self.results.values().map(|(n, r)| (n.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn remove(&mut self, name: &str) -> Option<TargetResult> {
        self.results.shift_remove(&name.to_lowercase()).map(|(_, r)| r)
    }

    /// Fold another set of results into this one; later results win.
    pub fn merge(&mut self, other: TargetResults) {
        for (key, value) in other.results {
            self.results.insert(key, value);
        }
    }
}

/// Outcome of one task invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkUnitResultCode {
    Success,
    Failed,
    Skipped,
    Canceled,
}

/// Whether the target keeps going after a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkUnitActionCode {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnitResult {
    pub code: WorkUnitResultCode,
    pub action: WorkUnitActionCode,
}

impl WorkUnitResult {
    pub fn new(code: WorkUnitResultCode, action: WorkUnitActionCode) -> Self {
        Self { code, action }
    }

    pub fn success() -> Self {
        Self::new(WorkUnitResultCode::Success, WorkUnitActionCode::Continue)
    }

    pub fn skipped() -> Self {
        Self::new(WorkUnitResultCode::Skipped, WorkUnitActionCode::Continue)
    }

    pub fn failed_and_stop() -> Self {
        Self::new(WorkUnitResultCode::Failed, WorkUnitActionCode::Stop)
    }

    pub fn failed_and_continue() -> Self {
        Self::new(WorkUnitResultCode::Failed, WorkUnitActionCode::Continue)
    }

    pub fn canceled() -> Self {
        Self::new(WorkUnitResultCode::Canceled, WorkUnitActionCode::Stop)
    }

    /// Combine the results of successive tasks (or buckets) of one target.
    pub fn aggregate(self, other: WorkUnitResult) -> WorkUnitResult {
        let code = match (self.code, other.code) {
            (WorkUnitResultCode::Canceled, _) | (_, WorkUnitResultCode::Canceled) => WorkUnitResultCode::Canceled,
            (WorkUnitResultCode::Failed, _) | (_, WorkUnitResultCode::Failed) => WorkUnitResultCode::Failed,
            (WorkUnitResultCode::Success, _) | (_, WorkUnitResultCode::Success) => WorkUnitResultCode::Success,
            _ => WorkUnitResultCode::Skipped,
        };
        let action = if self.action == WorkUnitActionCode::Stop || other.action == WorkUnitActionCode::Stop {
            WorkUnitActionCode::Stop
        } else {
            WorkUnitActionCode::Continue
        };
        WorkUnitResult { code, action }
    }
}
