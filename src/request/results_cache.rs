// src/request/results_cache.rs

//! Build results per configuration.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::evaluation::TaskItem;
use crate::request::build_request::BuildRequest;
use crate::target::{TargetResult, TargetResults};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildResultCode {
    Success,
    Failure,
}

/// Outcome of a build request: every target result it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    submission_id: i32,
    configuration_id: i32,
    global_request_id: i32,
    parent_global_request_id: i32,
    node_request_id: i32,
    results: TargetResults,
    initial_targets: Vec<String>,
    default_targets: Vec<String>,
    /// Set when the request could not complete (e.g. the project failed to
    /// load).
    error: Option<String>,
    canceled: bool,
}

impl BuildResult {
    pub fn new(request: &BuildRequest) -> Self {
        Self {
            submission_id: request.submission_id(),
            configuration_id: request.configuration_id(),
            global_request_id: request.global_request_id(),
            parent_global_request_id: request.parent_global_request_id(),
            node_request_id: request.node_request_id(),
            results: TargetResults::new(),
            initial_targets: Vec::new(),
            default_targets: Vec::new(),
            error: None,
            canceled: false,
        }
    }

    pub fn submission_id(&self) -> i32 {
        self.submission_id
    }

    pub fn configuration_id(&self) -> i32 {
        self.configuration_id
    }

    pub fn global_request_id(&self) -> i32 {
        self.global_request_id
    }

    pub fn parent_global_request_id(&self) -> i32 {
        self.parent_global_request_id
    }

    pub fn node_request_id(&self) -> i32 {
        self.node_request_id
    }

    pub fn initial_targets(&self) -> &[String] {
        &self.initial_targets
    }

    pub fn default_targets(&self) -> &[String] {
        &self.default_targets
    }

    pub fn set_target_lists(&mut self, initial: Vec<String>, default: Vec<String>) {
        self.initial_targets = initial;
        self.default_targets = default;
    }

    pub fn add_result_for_target(&mut self, target: &str, result: TargetResult) {
        self.results.insert(target, result);
    }

    pub fn merge_results(&mut self, results: TargetResults) {
        self.results.merge(results);
    }

    pub fn has_results_for_target(&self, target: &str) -> bool {
        self.results.contains(target)
    }

    pub fn result_for_target(&self, target: &str) -> Option<&TargetResult> {
        self.results.get(target)
    }

    pub fn results_by_target(&self) -> &TargetResults {
        &self.results
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn mark_canceled(&mut self) {
        self.canceled = true;
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled || self.results.iter().any(|(_, r)| r.is_canceled())
    }

    /// Failure if anything went wrong, including any target failing.
    pub fn overall_result(&self) -> BuildResultCode {
        if self.error.is_some() || self.canceled || self.results.iter().any(|(_, r)| !r.succeeded()) {
            BuildResultCode::Failure
        } else {
            BuildResultCode::Success
        }
    }

    pub fn succeeded(&self) -> bool {
        self.overall_result() == BuildResultCode::Success
    }

    /// Output items of `targets`, keyed by target name. Targets without a
    /// result are left out.
    pub fn target_outputs(&self, targets: &[String]) -> BTreeMap<String, Vec<TaskItem>> {
        targets
            .iter()
            .filter_map(|t| self.results.get(t).map(|r| (t.clone(), r.items().to_vec())))
            .collect()
    }
}

/// Target results for each configuration, merged across requests.
#[derive(Debug, Clone, Default)]
pub struct ResultsCache {
    results: HashMap<i32, BuildResult>,
}

impl ResultsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `result` into what is known for its configuration.
    pub fn add_result(&mut self, result: BuildResult) {
        let configuration = result.configuration_id();
        match self.results.get_mut(&configuration) {
            Some(existing) => {
                trace!(configuration, targets = result.results.len(), "merging cached results");
                existing.merge_results(result.results);
                if result.error.is_some() {
                    existing.error = result.error;
                }
            }
            None => {
                self.results.insert(configuration, result);
            }
        }
    }

    /// A result that already covers every target `request` asks for.
    ///
    /// `targets_to_check` are the targets to look for when the request names
    /// none (its initial plus default targets).
    pub fn satisfy_request(&self, request: &BuildRequest, targets_to_check: &[String]) -> Option<&BuildResult> {
        let cached = self.results.get(&request.configuration_id())?;
        let targets = if request.targets().is_empty() {
            targets_to_check
        } else {
            request.targets()
        };
        if targets.is_empty() || !targets.iter().all(|t| cached.has_results_for_target(t)) {
            return None;
        }
        trace!(configuration = request.configuration_id(), "request satisfied from results cache");
        Some(cached)
    }

    pub fn get_result_for_configuration(&self, configuration_id: i32) -> Option<&BuildResult> {
        self.results.get(&configuration_id)
    }

    pub fn clear_results_for_configuration(&mut self, configuration_id: i32) {
        self.results.remove(&configuration_id);
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
