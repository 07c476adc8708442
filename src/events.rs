// src/events.rs

//! Build events emitted by the engine.
//!
//! The engine never formats output itself: it emits [`BuildEvent`]s to a
//! [`BuildEventSink`]. The default sink forwards everything into `tracing`.
//! Events are serializable so a task host can send them to its parent.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::evaluation::TaskItem;
use crate::types::MessageImportance;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildEvent {
    ProjectStarted {
        project_file: String,
        targets: Vec<String>,
        global_properties: BTreeMap<String, String>,
    },
    ProjectFinished {
        project_file: String,
        succeeded: bool,
    },
    TargetStarted {
        project_file: String,
        target: String,
        parent_target: Option<String>,
    },
    TargetFinished {
        project_file: String,
        target: String,
        succeeded: bool,
        /// Only populated when target output logging is enabled.
        target_outputs: Option<Vec<TaskItem>>,
    },
    TargetSkipped {
        project_file: String,
        target: String,
        reason: String,
    },
    TaskStarted {
        project_file: String,
        target: String,
        task: String,
    },
    TaskFinished {
        project_file: String,
        target: String,
        task: String,
        succeeded: bool,
    },
    Message {
        importance: MessageImportance,
        text: String,
    },
    Warning {
        code: Option<String>,
        text: String,
        file: Option<String>,
    },
    Error {
        code: Option<String>,
        text: String,
        file: Option<String>,
    },
}

impl BuildEvent {
    pub fn message(importance: MessageImportance, text: impl Into<String>) -> Self {
        BuildEvent::Message {
            importance,
            text: text.into(),
        }
    }

    pub fn warning(code: Option<&str>, text: impl Into<String>) -> Self {
        BuildEvent::Warning {
            code: code.map(str::to_string),
            text: text.into(),
            file: None,
        }
    }

    pub fn error(code: Option<&str>, text: impl Into<String>, file: Option<&str>) -> Self {
        BuildEvent::Error {
            code: code.map(str::to_string),
            text: text.into(),
            file: file.map(str::to_string),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, BuildEvent::Error { .. })
    }
}

/// Receiver of build events.
pub trait BuildEventSink: Send + Sync + Debug {
    fn emit(&self, event: BuildEvent);
}

/// Sink that writes events through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingEventSink;

impl BuildEventSink for TracingEventSink {
    fn emit(&self, event: BuildEvent) {
        match event {
            BuildEvent::ProjectStarted {
                project_file,
                targets,
                ..
            } => info!(project = %project_file, ?targets, "project started"),
            BuildEvent::ProjectFinished {
                project_file,
                succeeded,
            } => info!(project = %project_file, succeeded, "project finished"),
            BuildEvent::TargetStarted {
                project_file,
                target,
                parent_target,
            } => debug!(project = %project_file, target = %target, ?parent_target, "target started"),
            BuildEvent::TargetFinished {
                project_file,
                target,
                succeeded,
                target_outputs,
            } => match target_outputs {
                Some(outputs) => {
                    let specs: Vec<&str> = outputs.iter().map(|i| i.item_spec.as_str()).collect();
                    info!(project = %project_file, target = %target, succeeded, outputs = ?specs, "target finished")
                }
                None => debug!(project = %project_file, target = %target, succeeded, "target finished"),
            },
            BuildEvent::TargetSkipped {
                project_file,
                target,
                reason,
            } => debug!(project = %project_file, target = %target, %reason, "target skipped"),
            BuildEvent::TaskStarted { target, task, .. } => {
                debug!(target = %target, task = %task, "task started")
            }
            BuildEvent::TaskFinished {
                target,
                task,
                succeeded,
                ..
            } => debug!(target = %target, task = %task, succeeded, "task finished"),
            BuildEvent::Message { importance, text } => match importance {
                MessageImportance::High => info!("{text}"),
                MessageImportance::Normal => debug!("{text}"),
                MessageImportance::Low => tracing::trace!("{text}"),
            },
            BuildEvent::Warning { code, text, file } => {
                warn!(code = code.as_deref().unwrap_or(""), file = file.as_deref().unwrap_or(""), "{text}")
            }
            BuildEvent::Error { code, text, file } => {
                error!(code = code.as_deref().unwrap_or(""), file = file.as_deref().unwrap_or(""), "{text}")
            }
        }
    }
}
