// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::ConfigFile;
use crate::config::validate::validate_config;
use crate::errors::{IbazelError, Result};

/// Name of the optional per-workspace config file.
pub const CONFIG_FILE_NAME: &str = ".ibazel.toml";

/// Read and deserialize a config file without semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        IbazelError::Config(format!("reading config file at {}: {e}", path.display()))
    })?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a config file and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let config = load_from_path(&path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Find the config to use.
///
/// An explicit path must exist. Otherwise `.ibazel.toml` in the workspace
/// root is used if present, and built-in defaults if not.
pub fn discover(explicit: Option<&Path>, workspace_root: Option<&Path>) -> Result<ConfigFile> {
    if let Some(path) = explicit {
        return load_and_validate(path);
    }
    match workspace_root.map(default_config_path) {
        Some(path) if path.is_file() => {
            debug!(path = %path.display(), "loading workspace config");
            load_and_validate(path)
        }
        _ => Ok(ConfigFile::default()),
    }
}

pub fn default_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(CONFIG_FILE_NAME)
}
