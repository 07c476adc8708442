// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{BuildSettings, RawSettingsFile};
use crate::errors::Result;

/// Default settings file name, looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "buildforge.toml";

/// Read a settings file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSettingsFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<RawSettingsFile> {
    let settings: RawSettingsFile = toml::from_str(contents)?;
    Ok(settings)
}

/// Read and validate a settings file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<BuildSettings> {
    let raw = load_from_path(&path)?;
    let settings = BuildSettings::try_from(raw)?;
    debug!(path = %path.as_ref().display(), "build settings loaded");
    Ok(settings)
}

/// Settings for a build: the explicit file if given, else
/// `buildforge.toml` when it exists, else defaults. The environment
/// overlay is applied last.
pub fn resolve_settings(explicit: Option<&Path>) -> Result<BuildSettings> {
    let settings = match explicit {
        Some(path) => load_and_validate(path)?,
        None => {
            let path = default_settings_path();
            if path.is_file() {
                load_and_validate(&path)?
            } else {
                BuildSettings::default()
            }
        }
    };
    Ok(settings.with_environment_overlay())
}

pub fn default_settings_path() -> PathBuf {
    PathBuf::from(DEFAULT_SETTINGS_FILE)
}
