// src/types.rs

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::Deserialize;

/// Boxed, sendable future used by the async trait seams (build tool,
/// commands) so they stay object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The build tool verb driven by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Verb {
    Build,
    Test,
    Run,
    Coverage,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Build => "build",
            Verb::Test => "test",
            Verb::Run => "run",
            Verb::Coverage => "coverage",
        }
    }

    /// Progressive form used in the "Building //foo" log line.
    pub fn progressive(self) -> &'static str {
        match self {
            Verb::Build => "Building",
            Verb::Test => "Testing",
            Verb::Run => "Running",
            Verb::Coverage => "Coveraging",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "build" => Ok(Verb::Build),
            "test" => Ok(Verb::Test),
            "run" => Ok(Verb::Run),
            "coverage" => Ok(Verb::Coverage),
            other => Err(format!(
                "unknown command: {other} (expected build, test, run or coverage)"
            )),
        }
    }
}

/// Which kind of file changed, as reported to lifecycle listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A source file: only the action needs to run again.
    Source,
    /// A BUILD/module file: dependencies must be queried again.
    Graph,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Source => "source",
            ChangeKind::Graph => "graph",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File watcher backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WatcherBackend {
    /// Recursive stream on macOS, per-path everywhere else.
    #[default]
    Auto,
    /// One OS watch per path (inotify / ReadDirectoryChangesW style).
    PerPath,
    /// One recursive subscription on the common ancestor, filtered in
    /// user space.
    Recursive,
}

impl WatcherBackend {
    /// Resolve `Auto` for the current platform.
    pub fn resolve(self) -> WatcherBackend {
        match self {
            WatcherBackend::Auto if cfg!(target_os = "macos") => WatcherBackend::Recursive,
            WatcherBackend::Auto => WatcherBackend::PerPath,
            other => other,
        }
    }
}
