use std::collections::HashMap;
use std::sync::Arc;

use buildforge::errors::Result;
use buildforge::events::BuildEvent;
use buildforge::project::model::TaskInvocation;
use buildforge::target::{TaskBuilder, TaskContext, WorkUnitResult};
use buildforge::types::MessageImportance;
use parking_lot::Mutex;

/// One task the fake was asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedTask {
    pub target: String,
    pub task: String,
}

/// A fake task builder that:
/// - records which tasks were "run", and from which target
/// - returns a scripted outcome per task name (success by default)
/// - logs the `Text` parameter of each task as a message, unexpanded
///
/// Conditions and parameters are not evaluated.
#[derive(Debug, Clone, Default)]
pub struct FakeTaskBuilder {
    executed: Arc<Mutex<Vec<ExecutedTask>>>,
    outcomes: Arc<Mutex<HashMap<String, WorkUnitResult>>>,
}

impl FakeTaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `task` to fail and stop its target.
    pub fn failing(self, task: &str) -> Self {
        self.with_outcome(task, WorkUnitResult::failed_and_stop())
    }

    pub fn with_outcome(self, task: &str, outcome: WorkUnitResult) -> Self {
        self.outcomes.lock().insert(task.to_lowercase(), outcome);
        self
    }

    pub fn executed(&self) -> Vec<ExecutedTask> {
        self.executed.lock().clone()
    }

    /// `Target.Task` for every executed task, in order.
    pub fn executed_names(&self) -> Vec<String> {
        self.executed
            .lock()
            .iter()
            .map(|t| format!("{}.{}", t.target, t.task))
            .collect()
    }

    /// Targets in the order their first task ran.
    pub fn executed_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = Vec::new();
        for task in self.executed.lock().iter() {
            if targets.last() != Some(&task.target) {
                targets.push(task.target.clone());
            }
        }
        targets
    }
}

impl TaskBuilder for FakeTaskBuilder {
    fn execute_task(&self, invocation: &TaskInvocation, ctx: &mut TaskContext<'_>) -> Result<WorkUnitResult> {
        self.executed.lock().push(ExecutedTask {
            target: ctx.target.to_string(),
            task: invocation.name.clone(),
        });
        if let Some(text) = invocation.parameters.get("Text") {
            ctx.engine
                .log(BuildEvent::message(MessageImportance::Normal, text.clone()));
        }
        let outcome = self
            .outcomes
            .lock()
            .get(&invocation.name.to_lowercase())
            .copied()
            .unwrap_or_else(WorkUnitResult::success);
        Ok(outcome)
    }
}
