// src/engine/manager.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::BuildSettings;
use crate::engine::request_builder::RequestBuilder;
use crate::engine::state::BuildState;
use crate::errors::{BuildError, Result};
use crate::events::BuildEventSink;
use crate::fs::FileSystem;
use crate::node::NodeManager;
use crate::protocol::NodeShutdownReason;
use crate::registry::{FactoryRegistry, TaskLibraryCatalog};
use crate::request::{
    BuildEventContext, BuildRequest, BuildResult, ConfigurationMetadata, INVALID_CONFIGURATION_ID,
};
use crate::target::{DefaultTaskBuilder, TaskBuilder};

/// What to build: one project with its targets and global properties.
#[derive(Debug, Clone, Default)]
pub struct BuildSubmission {
    pub project: PathBuf,
    /// Empty builds the project's default targets.
    pub targets: Vec<String>,
    pub global_properties: BTreeMap<String, String>,
    pub tools_version: Option<String>,
}

impl BuildSubmission {
    pub fn new(project: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            ..Self::default()
        }
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.global_properties.insert(name.into(), value.into());
        self
    }
}

/// Async shell around the synchronous request builder.
///
/// Submissions run one at a time on the blocking pool and share the
/// configuration and results caches. Cancelling the token stops every
/// running and future submission.
#[derive(Clone)]
pub struct BuildManager {
    state: Arc<Mutex<BuildState>>,
    file_system: Arc<dyn FileSystem>,
    settings: Arc<BuildSettings>,
    task_builder: Arc<dyn TaskBuilder>,
    node_manager: Option<Arc<NodeManager>>,
    sink: Arc<dyn BuildEventSink>,
    cancel: CancellationToken,
}

impl fmt::Debug for BuildManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildManager")
            .field("settings", &self.settings)
            .field("node_manager", &self.node_manager)
            .finish_non_exhaustive()
    }
}

impl BuildManager {
    /// Manager with the default task builder over the core task library.
    pub fn new(settings: BuildSettings, file_system: Arc<dyn FileSystem>, sink: Arc<dyn BuildEventSink>) -> Self {
        let catalog = Arc::new(TaskLibraryCatalog::with_core_tasks());
        let node_manager = Arc::new(NodeManager::new(Arc::clone(&catalog)));
        let task_builder = DefaultTaskBuilder::new(
            Arc::new(FactoryRegistry::with_defaults(catalog)),
            Arc::new(settings.node_provider()),
            Arc::clone(&node_manager),
        );
        let mut manager = Self::with_task_builder(settings, file_system, sink, Arc::new(task_builder));
        manager.node_manager = Some(node_manager);
        manager
    }

    pub fn with_task_builder(
        settings: BuildSettings,
        file_system: Arc<dyn FileSystem>,
        sink: Arc<dyn BuildEventSink>,
        task_builder: Arc<dyn TaskBuilder>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(BuildState::new())),
            file_system,
            settings: Arc::new(settings),
            task_builder,
            node_manager: None,
            sink,
            cancel: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        info!("build cancellation requested");
        self.cancel.cancel();
    }

    /// Number of configurations known to the build.
    pub fn configuration_count(&self) -> usize {
        self.state.lock().configs().len()
    }

    /// Build a submission on the blocking pool.
    pub async fn build(&self, submission: BuildSubmission) -> Result<BuildResult> {
        let manager = self.clone();
        tokio::task::spawn_blocking(move || manager.build_blocking(submission))
            .await
            .map_err(|e| BuildError::internal(format!("build worker failed: {e}")))?
    }

    /// Build a submission on the calling thread.
    pub fn build_blocking(&self, submission: BuildSubmission) -> Result<BuildResult> {
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let mut state = self.state.lock();
        let submission_id = state.next_submission_id();
        let mut request = BuildRequest::new(
            submission_id,
            1,
            INVALID_CONFIGURATION_ID,
            Some(submission.targets),
            None,
            BuildEventContext::INVALID,
            None,
        )?;
        request.set_global_request_id(state.next_global_request_id());

        let tools_version = submission
            .tools_version
            .filter(|tv| !tv.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_tools_version.clone());
        let metadata = ConfigurationMetadata::new(submission.project, submission.global_properties, tools_version);
        let configuration_id = state.resolve_configuration(metadata)?;
        request.resolve_configuration(configuration_id)?;
        request.set_build_event_context(BuildEventContext::new(submission_id, 1, configuration_id));
        debug!(
            submission = submission_id,
            configuration = configuration_id,
            "submission resolved"
        );

        let mut builder = RequestBuilder::new(
            &mut state,
            Arc::clone(&self.file_system),
            self.task_builder.as_ref(),
            self.sink.as_ref(),
            self.cancel.clone(),
            self.settings.target_output_logging,
        );
        builder.build(request)
    }

    /// Stop every task host this manager launched.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(node_manager) = self.node_manager.clone() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || node_manager.shutdown(NodeShutdownReason::BuildComplete))
            .await
            .map_err(|e| BuildError::internal(format!("task host shutdown failed: {e}")))
    }
}
