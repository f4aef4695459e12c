// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::types::WatcherBackend;

/// Top-level `.ibazel.toml`.
///
/// ```toml
/// [config]
/// debounce = "100ms"
/// graceful_termination_wait = "10s"
/// watcher = "auto"
/// bazel_path = "bazelisk"
///
/// [watch]
/// tolerate_missing = ["tools/defaults/BUILD", "tools/defaults"]
///
/// [hooks]
/// run_command_before = "echo before"
/// run_command_after = "echo after"
/// run_command_after_success = "echo ok"
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub hooks: HooksSection,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Quiet period after the last change before acting (`"100ms"`, `"1s"`).
    #[serde(default = "default_debounce")]
    pub debounce: String,

    /// How long a terminated `run` target gets before it is killed.
    #[serde(default = "default_graceful_termination_wait")]
    pub graceful_termination_wait: String,

    #[serde(default)]
    pub watcher: WatcherBackend,

    /// Build tool binary. Looked up on `PATH` when unset.
    #[serde(default)]
    pub bazel_path: Option<PathBuf>,
}

fn default_debounce() -> String {
    "100ms".to_string()
}

fn default_graceful_termination_wait() -> String {
    "10s".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
            graceful_termination_wait: default_graceful_termination_wait(),
            watcher: WatcherBackend::default(),
            bazel_path: None,
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// Path suffixes whose watch failures are ignored. Query results name
    /// these even when they do not exist on disk.
    #[serde(default = "default_tolerate_missing")]
    pub tolerate_missing: Vec<String>,
}

fn default_tolerate_missing() -> Vec<String> {
    vec!["tools/defaults/BUILD".to_string(), "tools/defaults".to_string()]
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            tolerate_missing: default_tolerate_missing(),
        }
    }
}

/// `[hooks]` section: shell commands run around every action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HooksSection {
    #[serde(default)]
    pub run_command_before: Option<String>,

    #[serde(default)]
    pub run_command_after: Option<String>,

    /// Only after a successful action.
    #[serde(default)]
    pub run_command_after_success: Option<String>,
}
