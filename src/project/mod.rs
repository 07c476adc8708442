// src/project/mod.rs

//! Project files: the TOML model, loading, validation and evaluation into a
//! [`ProjectInstance`].

pub mod instance;
pub mod loader;
pub mod model;
pub mod validate;

pub use instance::ProjectInstance;
pub use loader::{load_and_validate, load_from_path};
pub use model::ProjectDefinition;

/// Tools version used when neither the request nor the project names one.
pub const DEFAULT_TOOLS_VERSION: &str = "Current";

pub const PROJECT_FILE_PROPERTY: &str = "MSBuildProjectFile";
pub const PROJECT_NAME_PROPERTY: &str = "MSBuildProjectName";
pub const PROJECT_DIRECTORY_PROPERTY: &str = "MSBuildProjectDirectory";
pub const PROJECT_FULL_PATH_PROPERTY: &str = "MSBuildProjectFullPath";
pub const PROJECT_EXTENSION_PROPERTY: &str = "MSBuildProjectExtension";
pub const TOOLS_VERSION_PROPERTY: &str = "MSBuildToolsVersion";
pub const LAST_TASK_RESULT_PROPERTY: &str = "MSBuildLastTaskResult";

/// Properties the engine owns. Project files may read but never set them.
pub const RESERVED_PROPERTIES: &[&str] = &[
    PROJECT_FILE_PROPERTY,
    PROJECT_NAME_PROPERTY,
    PROJECT_DIRECTORY_PROPERTY,
    PROJECT_FULL_PATH_PROPERTY,
    PROJECT_EXTENSION_PROPERTY,
    TOOLS_VERSION_PROPERTY,
    LAST_TASK_RESULT_PROPERTY,
];

pub fn is_reserved_property(name: &str) -> bool {
    RESERVED_PROPERTIES
        .iter()
        .any(|p| p.eq_ignore_ascii_case(name.trim()))
}
