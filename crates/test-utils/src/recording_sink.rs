use std::sync::Arc;

use buildforge::events::{BuildEvent, BuildEventSink};
use parking_lot::Mutex;

/// Sink that keeps every event it receives, in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<BuildEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BuildEvent> {
        self.events.lock().clone()
    }

    pub fn errors(&self) -> Vec<BuildEvent> {
        self.events.lock().iter().filter(|e| e.is_error()).cloned().collect()
    }

    /// Error codes of every error event, in order.
    pub fn error_codes(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BuildEvent::Error { code, .. } => code.clone(),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BuildEvent::Warning { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Text of every message event.
    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BuildEvent::Message { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names of started targets, in start order.
    pub fn started_targets(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BuildEvent::TargetStarted { target, .. } => Some(target.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names of finished targets with their outcome, in finish order.
    pub fn finished_targets(&self) -> Vec<(String, bool)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BuildEvent::TargetFinished { target, succeeded, .. } => Some((target.clone(), *succeeded)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl BuildEventSink for RecordingEventSink {
    fn emit(&self, event: BuildEvent) {
        self.events.lock().push(event);
    }
}
