// src/workspace.rs

//! Workspace root discovery and running commands from the root.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{error, info};

use crate::command::ENV_IBAZEL;
use crate::errors::{IbazelError, Result};

/// Files marking a workspace root, in search order.
pub const SENTINELS: [&str; 4] = ["WORKSPACE.bzlmod", "WORKSPACE.bazel", "MODULE.bazel", "WORKSPACE"];

pub trait Workspace: Send + Sync {
    fn find_workspace(&self) -> Result<PathBuf>;

    /// Run `program args...` from the workspace root with inherited output.
    /// Failures are logged, never returned.
    ///
    /// Blocks until the command exits; the control loop does not advance
    /// while a hook runs.
    fn execute_command(&self, program: &str, args: &[String]);
}

/// Walks upward from a start directory (the process cwd by default).
#[derive(Debug, Clone, Default)]
pub struct MainWorkspace {
    start: Option<PathBuf>,
}

impl MainWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            start: Some(dir.into()),
        }
    }
}

impl Workspace for MainWorkspace {
    fn find_workspace(&self) -> Result<PathBuf> {
        let start = match &self.start {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        find_workspace_from(&start)
    }

    fn execute_command(&self, program: &str, args: &[String]) {
        let root = match self.find_workspace() {
            Ok(root) => root,
            Err(err) => {
                error!(error = %err, "Error finding workspace");
                return;
            }
        };
        let args: Vec<&str> = args.iter().map(|a| a.trim()).collect();
        info!("Executing command: `{} {}`", program, args.join(" "));

        let run = || {
            Command::new(program)
                .args(&args)
                .current_dir(&root)
                .env(ENV_IBAZEL, "true")
                .stdin(Stdio::null())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
        };
        let status = match Handle::try_current() {
            // Hand the worker's other tasks off while the hook runs.
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(run)
            }
            _ => run(),
        };
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => error!(program, ?args, %status, "Command failed"),
            Err(err) => error!(program, ?args, error = %err, "Command failed"),
        }
    }
}

/// Closest ancestor of `dir` (inclusive) holding one of [`SENTINELS`] as a
/// regular file. The file name must match exactly, so a directory called
/// `workspace` on a case-insensitive filesystem does not count.
pub fn find_workspace_from(dir: &Path) -> Result<PathBuf> {
    for candidate in dir.ancestors() {
        for sentinel in SENTINELS {
            if is_sentinel(candidate, sentinel) {
                return Ok(candidate.to_path_buf());
            }
        }
    }
    Err(IbazelError::Workspace(
        "ibazel was not invoked from within a workspace".to_string(),
    ))
}

fn is_sentinel(dir: &Path, name: &str) -> bool {
    let path = dir.join(name);
    if !path.is_file() {
        return false;
    }
    // Exact-case check against the directory listing.
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.file_name().to_str() == Some(name))
        })
        .unwrap_or(false)
}
