// src/engine/mod.rs

//! Build orchestration.
//!
//! The synchronous core lives in [`request_builder`]: it resolves
//! configurations, loads projects and drives the target builder, including
//! child projects built by the `MSBuild` task. [`manager`] is the async
//! shell that hands submissions to the core on the blocking pool and owns
//! cancellation and task host shutdown.

pub mod manager;
pub mod request_builder;
pub mod state;

pub use manager::{BuildManager, BuildSubmission};
pub use request_builder::{merge_global_properties, RequestBuilder};
pub use state::BuildState;
