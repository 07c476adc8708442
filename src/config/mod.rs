// src/config/mod.rs

//! Engine settings: TOML model, loading and validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_settings_path, load_and_validate, load_from_path, load_from_str, resolve_settings};
pub use model::{BuildSection, BuildSettings, RawSettingsFile, TaskHostSection};
