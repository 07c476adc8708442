// src/node/mod.rs

//! Task routing and task host nodes.

pub mod provider;
pub mod task_host;
pub mod thread_safe;

pub use provider::NodeProvider;
pub use task_host::{NodeLease, NodeManager, TaskHostNode, TaskHostProxy};
pub use thread_safe::{ThreadSafeTaskRegistry, DEFAULT_THREAD_SAFE_TASKS};
