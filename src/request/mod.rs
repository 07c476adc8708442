// src/request/mod.rs

//! Build requests, their configurations and the caches shared across them.
//!
//! - [`BuildRequest`]: what to build, bound to a configuration id
//! - [`BuildRequestConfiguration`]: project + global properties + tools
//!   version, with the evaluated instance attached lazily
//! - [`ConfigCache`]: configurations by id and by structure
//! - [`ResultsCache`]: target results per configuration

pub mod build_request;
pub mod config_cache;
pub mod configuration;
pub mod results_cache;

pub use build_request::{
    BuildEventContext, BuildRequest, HostServices, INVALID_CONFIGURATION_ID,
    INVALID_GLOBAL_REQUEST_ID, INVALID_NODE_REQUEST_ID,
};
pub use config_cache::ConfigCache;
pub use configuration::{BuildRequestConfiguration, ConfigurationMetadata};
pub use results_cache::{BuildResult, BuildResultCode, ResultsCache};
