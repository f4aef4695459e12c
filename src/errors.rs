// src/errors.rs

//! Crate-wide error type and result alias.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::process_group::ProcessGroupError;
use crate::types::Verb;

#[derive(Error, Debug)]
pub enum IbazelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Query failed: {0}")]
    Query(String),

    /// The build tool ran but reported failure. The captured output is kept
    /// so lifecycle listeners can still inspect it.
    #[error("{verb} failed")]
    BuildFailed { verb: Verb, output: String },

    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Error(s) updating watch list:\n{0}")]
    Watch(WatchErrors),

    #[error("Process group error: {0}")]
    ProcessGroup(#[from] ProcessGroupError),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IbazelError {
    /// Output captured from the build tool, if this error carries any.
    pub fn output(&self) -> &str {
        match self {
            IbazelError::BuildFailed { output, .. } => output,
            _ => "",
        }
    }
}

/// Per-path failures collected while reconciling a watch list.
///
/// `UpdateAll` keeps going after a failed add/remove, so all failures are
/// reported together once the new set is in place.
#[derive(Debug, Default)]
pub struct WatchErrors {
    pub failures: Vec<(PathBuf, String)>,
}

impl WatchErrors {
    pub fn push(&mut self, path: impl Into<PathBuf>, reason: impl fmt::Display) {
        self.failures.push((path.into(), reason.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// `Ok(())` when nothing failed, otherwise the aggregated error.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(IbazelError::Watch(self))
        }
    }
}

impl fmt::Display for WatchErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (path, reason)) in self.failures.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {}: {}", path.display(), reason)?;
        }
        Ok(())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, IbazelError>;
