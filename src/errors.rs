// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! The variants follow the engine's error taxonomy:
//! - [`BuildError::InvalidProject`] is user-facing and tied to a location in a
//!   project file. Boundaries (target execution, request building) turn these
//!   into failed result codes instead of letting them escape.
//! - [`BuildError::Internal`] and [`BuildError::ArgumentNull`] signal a bug in
//!   the calling code and always propagate.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes surfaced to users.
pub mod codes {
    /// A task factory did not supply a task type.
    pub const TASK_FACTORY_NULL_TASK_TYPE: &str = "MSB4175";
    /// Item metadata referenced where batching is not allowed.
    pub const METADATA_NOT_ALLOWED: &str = "MSB4191";
    /// The requested task host runtime is not supported.
    pub const UNSUPPORTED_TASK_HOST_RUNTIME: &str = "MSB4233";
    /// Help keyword for Remove + MatchOnMetadata referencing anything but one item list.
    pub const MATCH_ON_METADATA_ONE_ITEM: &str =
        "MSBuild.OM_MatchOnMetadataIsRestrictedToOnlyOneReferencedItem";

    pub const RESERVED_PROPERTY: &str = "MSB4004";
    pub const CIRCULAR_TARGET_DEPENDENCY: &str = "MSB4006";
    pub const INVALID_ATTRIBUTE_VALUE: &str = "MSB4030";
    pub const MISSING_ATTRIBUTE: &str = "MSB4035";
    pub const TASK_NOT_FOUND: &str = "MSB4036";
    pub const ASSEMBLY_NAME_AND_FILE: &str = "MSB4038";
    pub const MISSING_REQUIRED_PARAMETER: &str = "MSB4044";
    pub const TARGET_NOT_FOUND: &str = "MSB4057";
    pub const TASK_ASSEMBLY_NOT_FOUND: &str = "MSB4062";
    pub const UNKNOWN_TASK_PARAMETER: &str = "MSB4064";
    pub const INVALID_CHILD_ELEMENT: &str = "MSB4067";
    pub const MUTUALLY_EXCLUSIVE_ATTRIBUTES: &str = "MSB4110";
    pub const CONDITION_NOT_BOOLEAN: &str = "MSB4113";
    pub const COMPARISON_NOT_NUMERIC: &str = "MSB4086";
    pub const INVALID_CONDITION: &str = "MSB4092";
    pub const CIRCULAR_PROJECT_REFERENCE: &str = "MSB4116";
    pub const UNRECOGNIZED_PARAMETER_TYPE: &str = "MSB4173";
    pub const UNSUPPORTED_PARAMETER_TYPE: &str = "MSB4069";
    pub const INVALID_BOOLEAN_ATTRIBUTE: &str = "MSB4100";
    pub const UNKNOWN_TASK_FACTORY: &str = "MSB4217";
    pub const INVALID_TASK_HOST_PARAMETER: &str = "MSB4218";
    pub const INVALID_ITEM_OPERATION: &str = "MSB4232";
    pub const TASK_EXECUTION_FAILED: &str = "MSB4018";
    pub const EXEC_COMMAND_FAILED: &str = "MSB3073";
    pub const INVALID_TASK_BODY: &str = "MSB3758";
    pub const INVALID_PROPERTY_SYNTAX: &str = "MSB3100";
}

/// Where in a project an element lives.
///
/// Project files are TOML, so instead of line/column we keep a readable path
/// to the element (e.g. `target 'Build' step 2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ElementLocation {
    pub file: String,
    pub element: String,
}

impl ElementLocation {
    pub fn new(file: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            element: element.into(),
        }
    }

    /// Location of a child element of this one.
    pub fn child(&self, element: impl fmt::Display) -> Self {
        if self.element.is_empty() {
            return Self::new(self.file.clone(), element.to_string());
        }
        Self::new(self.file.clone(), format!("{} > {}", self.element, element))
    }
}

impl fmt::Display for ElementLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.element.is_empty() {
            write!(f, "{}", self.file)
        } else {
            write!(f, "{}: {}", self.file, self.element)
        }
    }
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{location}: error {code}: {message}")]
    InvalidProject {
        code: &'static str,
        message: String,
        location: ElementLocation,
        help_keyword: Option<&'static str>,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Argument must not be null: {0}")]
    ArgumentNull(&'static str),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Task host error: {0}")]
    TaskHost(String),

    #[error("Build was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BuildError {
    pub fn invalid_project(
        code: &'static str,
        location: &ElementLocation,
        message: impl Into<String>,
    ) -> Self {
        BuildError::InvalidProject {
            code,
            message: message.into(),
            location: location.clone(),
            help_keyword: None,
        }
    }

    pub fn invalid_project_with_help(
        code: &'static str,
        help_keyword: &'static str,
        location: &ElementLocation,
        message: impl Into<String>,
    ) -> Self {
        BuildError::InvalidProject {
            code,
            message: message.into(),
            location: location.clone(),
            help_keyword: Some(help_keyword),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        BuildError::Internal(message.into())
    }

    /// User-facing project errors are converted into result codes at target
    /// and request boundaries; everything else propagates.
    pub fn is_invalid_project(&self) -> bool {
        matches!(self, BuildError::InvalidProject { .. })
    }

    /// Error code for invalid-project errors.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            BuildError::InvalidProject { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn help_keyword(&self) -> Option<&'static str> {
        match self {
            BuildError::InvalidProject { help_keyword, .. } => *help_keyword,
            _ => None,
        }
    }
}

impl From<bincode::Error> for BuildError {
    fn from(err: bincode::Error) -> Self {
        BuildError::Translation(err.to_string())
    }
}

/// Fail with an internal error unless `condition` holds.
pub fn verify_internal(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(BuildError::Internal(message()))
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
