// src/config/mod.rs

//! Configuration for ibazel.
//!
//! Three layers, later wins:
//! 1. built-in defaults
//! 2. `.ibazel.toml` in the workspace root, or the file given with
//!    `--config-file`
//! 3. command-line flags
//!
//! The TOML model lives in [`model`], reading in [`loader`], checks in
//! [`validate`]. [`Settings::resolve`] merges everything into the values
//! the rest of the program uses.

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::CliArgs;
use crate::errors::{IbazelError, Result};
use crate::fswatcher::TolerateList;
use crate::lifecycle::HookCommands;
use crate::types::WatcherBackend;

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{discover, load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, HooksSection, WatchSection};
pub use validate::{parse_duration, split_command, validate_config};

/// Effective settings after merging config file and flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub debounce: Duration,
    pub graceful_wait: Duration,
    pub watcher: WatcherBackend,
    pub bazel_path: Option<PathBuf>,
    pub tolerate: TolerateList,
    pub hooks: HookCommands,
}

impl Settings {
    pub fn resolve(file: &ConfigFile, cli: &CliArgs) -> Result<Self> {
        let debounce_str = cli.debounce.as_deref().unwrap_or(&file.config.debounce);
        let debounce = parse_duration(debounce_str)
            .map_err(|e| IbazelError::Config(format!("invalid debounce: {e}")))?;
        if debounce.is_zero() {
            return Err(IbazelError::Config(
                "debounce must be greater than zero".to_string(),
            ));
        }

        let wait_str = cli
            .graceful_termination_wait
            .as_deref()
            .unwrap_or(&file.config.graceful_termination_wait);
        let graceful_wait = parse_duration(wait_str).map_err(|e| {
            IbazelError::Config(format!("invalid graceful termination wait: {e}"))
        })?;

        let hook = |flag: &Option<String>, section: &Option<String>| -> Result<Option<Vec<String>>> {
            match flag.as_ref().or(section.as_ref()) {
                Some(cmd) => split_command(cmd).map(Some).map_err(IbazelError::Config),
                None => Ok(None),
            }
        };
        let hooks = HookCommands {
            before: hook(&cli.run_command_before, &file.hooks.run_command_before)?,
            after: hook(&cli.run_command_after, &file.hooks.run_command_after)?,
            after_success: hook(
                &cli.run_command_after_success,
                &file.hooks.run_command_after_success,
            )?,
        };

        Ok(Self {
            debounce,
            graceful_wait,
            watcher: cli.watcher.unwrap_or(file.config.watcher),
            bazel_path: cli
                .bazel_path
                .clone()
                .or_else(|| file.config.bazel_path.clone()),
            tolerate: TolerateList::new(file.watch.tolerate_missing.iter().cloned()),
            hooks,
        })
    }
}
