#![allow(dead_code)]

use buildforge::errors::{BuildError, Result};
use buildforge::events::{BuildEvent, BuildEventSink};
use buildforge::project::ProjectInstance;
use buildforge::protocol::task_host::{TaskHostBuildRequest, TaskHostBuildResponse};
use buildforge::target::RequestCallbacks;

pub use buildforge_test_utils::builders;
pub use buildforge_test_utils::fake_task_builder::FakeTaskBuilder;
pub use buildforge_test_utils::recording_sink::RecordingEventSink;
pub use buildforge_test_utils::{init_tracing, load_project, mock_fs_with_project, PROJECT_PATH};

/// Request callbacks for driving a target builder without a build manager.
///
/// Events go to a [`RecordingEventSink`]; building other projects is not
/// supported.
#[derive(Debug, Default)]
pub struct StubCallbacks {
    pub sink: RecordingEventSink,
    pub cancelled: bool,
    pub target_output_logging: bool,
}

impl StubCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_logging(mut self) -> Self {
        self.target_output_logging = true;
        self
    }
}

impl RequestCallbacks for StubCallbacks {
    fn emit(&self, event: BuildEvent) {
        self.sink.emit(event);
    }

    fn build_projects(
        &mut self,
        _parent: &ProjectInstance,
        _request: TaskHostBuildRequest,
    ) -> Result<TaskHostBuildResponse> {
        Err(BuildError::internal("stub callbacks cannot build projects"))
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn target_output_logging(&self) -> bool {
        self.target_output_logging
    }
}
