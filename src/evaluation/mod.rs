// src/evaluation/mod.rs

//! Evaluation layer: items, the scoped lookup, expansion, conditions and
//! batching.

pub mod batching;
pub mod condition;
pub mod expander;
pub mod item;
pub mod lookup;

pub use batching::{bucketize, Bucket};
pub use condition::evaluate_condition;
pub use expander::{ExpandedItem, Expander};
pub use item::{ItemId, ProjectItem, TaskItem};
pub use lookup::{Lookup, LookupDelta, MetadataModifications, ProjectState, Property};
