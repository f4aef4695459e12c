// src/command/mod.rs

//! Long-lived `run` targets.
//!
//! A [`Command`] owns at most one running [`ProcessGroup`] at a time. Two
//! flavours exist:
//!
//! - [`DefaultCommand`]: every change is a hard restart.
//! - [`NotifyCommand`]: the child stays up and is told about rebuilds on
//!   its stdin.
//!
//! Commands are shared as `Arc<dyn Command>` between the control loop and
//! the signal handler, so every method takes `&self` and the running group
//! sits behind a lock.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tempfile::TempPath;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::bazel::{BuildToolFactory, new_tool};
use crate::errors::Result;
use crate::process_group::{ProcessGroup, Signal};
use crate::types::BoxFuture;

mod default_command;
mod notify_command;

pub use default_command::DefaultCommand;
pub use notify_command::NotifyCommand;

/// Wait between the graceful signal and the forced kill.
pub const DEFAULT_GRACEFUL_WAIT: Duration = Duration::from_secs(10);

/// Set to `true` for every child launched by a command.
pub const ENV_IBAZEL: &str = "IBAZEL";
/// Set to `y` for children launched by a [`NotifyCommand`].
pub const ENV_NOTIFY_CHANGES: &str = "IBAZEL_NOTIFY_CHANGES";

pub const MSG_BUILD_STARTED: &str = "IBAZEL_BUILD_STARTED\n";
pub const MSG_BUILD_SUCCESS: &str = "IBAZEL_BUILD_COMPLETED SUCCESS\n";
pub const MSG_BUILD_FAILURE: &str = "IBAZEL_BUILD_COMPLETED FAILURE\n";

pub trait Command: Send + Sync {
    /// Build the target and launch it. Returns the build output.
    fn start(&self) -> BoxFuture<'_, Result<String>>;

    /// React to a change of the target's inputs. Never fails; problems are
    /// logged and reflected in the returned output.
    fn notify_of_changes(&self) -> BoxFuture<'_, String>;

    /// Gracefully stop the running group and wait for it to exit. No-op when
    /// nothing is running; concurrent and repeated calls signal only once.
    fn terminate(&self) -> BoxFuture<'_, ()>;

    /// Kill the group without waiting.
    fn kill(&self);

    fn is_subprocess_running(&self) -> bool;
}

/// Everything needed to build and launch one `run` target.
#[derive(Clone)]
pub struct CommandSpec {
    pub target: String,
    pub startup_args: Vec<String>,
    pub bazel_args: Vec<String>,
    /// Arguments handed to the launched program.
    pub args: Vec<String>,
    pub graceful_wait: Duration,
    pub tools: Arc<dyn BuildToolFactory>,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("target", &self.target)
            .field("startup_args", &self.startup_args)
            .field("bazel_args", &self.bazel_args)
            .field("args", &self.args)
            .field("graceful_wait", &self.graceful_wait)
            .finish_non_exhaustive()
    }
}

pub trait CommandFactory: Send + Sync {
    fn default_command(&self, spec: CommandSpec) -> Arc<dyn Command>;
    fn notify_command(&self, spec: CommandSpec) -> Arc<dyn Command>;
}

/// Creates the real, process-backed commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandFactory;

impl CommandFactory for ProcessCommandFactory {
    fn default_command(&self, spec: CommandSpec) -> Arc<dyn Command> {
        Arc::new(DefaultCommand::new(spec))
    }

    fn notify_command(&self, spec: CommandSpec) -> Arc<dyn Command> {
        Arc::new(NotifyCommand::new(spec))
    }
}

/// The command currently owned by the control loop, readable by the signal
/// handler. The loop is the only writer.
#[derive(Clone, Default)]
pub struct CommandSlot {
    inner: Arc<RwLock<Option<Arc<dyn Command>>>>,
}

impl CommandSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<dyn Command>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, command: Arc<dyn Command>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(command);
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// A launched group plus its one-shot termination guard.
///
/// The script file stays on disk for as long as the process it launched.
struct Running {
    group: Arc<ProcessGroup>,
    terminated: Arc<OnceCell<()>>,
    _script: TempPath,
}

impl Running {
    fn new(group: ProcessGroup, script: TempPath) -> Self {
        Self {
            group: Arc::new(group),
            terminated: Arc::new(OnceCell::new()),
            _script: script,
        }
    }
}

/// Lock shared by both command flavours.
#[derive(Default)]
struct RunningSlot(Mutex<Option<Running>>);

impl RunningSlot {
    fn replace(&self, running: Running) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(running);
    }

    fn handles(&self) -> Option<(Arc<ProcessGroup>, Arc<OnceCell<()>>)> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| (Arc::clone(&r.group), Arc::clone(&r.terminated)))
    }

    /// Drop the running entry if it still refers to `group`.
    fn clear_if(&self, group: &Arc<ProcessGroup>) {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if guard
            .as_ref()
            .is_some_and(|r| Arc::ptr_eq(&r.group, group))
        {
            *guard = None;
        }
    }

    fn is_running(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| r.group.is_running())
    }

    fn pid(&self) -> Option<u32> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|r| r.group.id())
    }

    async fn terminate(&self, wait: Duration) {
        let Some((group, guard)) = self.handles() else {
            return;
        };
        if group.is_running() {
            guard
                .get_or_init(|| terminate_group(&group, wait))
                .await;
        }
        self.clear_if(&group);
    }

    fn kill(&self) {
        let Some((group, _)) = self.handles() else {
            return;
        };
        if group.is_running() {
            info!("Sending SIGKILL to the subprocess");
            if let Err(err) = group.kill() {
                warn!(error = %err, "failed to kill subprocess");
            }
        }
    }
}

async fn terminate_group(group: &ProcessGroup, wait: Duration) {
    debug!(pid = ?group.id(), "terminating subprocess");
    if let Err(err) = group.signal(Signal::Terminate) {
        warn!(error = %err, "failed to signal subprocess");
    }

    tokio::select! {
        _ = group.wait() => {}
        _ = tokio::time::sleep(wait) => {
            info!(
                "The subprocess wasn't terminated within {:?}. Forcing to close.",
                wait
            );
            if let Err(err) = group.kill() {
                warn!(error = %err, "failed to kill subprocess");
            }
            let _ = group.wait().await;
        }
    }
}

/// Build `spec.target` with `run --script_path=<tmp>` and return the build
/// output together with the script written by the build tool.
async fn build_script(spec: &CommandSpec) -> Result<(String, TempPath)> {
    let suffix = if cfg!(windows) { ".bat" } else { "" };
    let script = tempfile::Builder::new()
        .prefix("bazel_script_path")
        .suffix(suffix)
        .tempfile()?
        .into_temp_path();

    let mut tool = new_tool(spec.tools.as_ref(), &spec.startup_args, &spec.bazel_args);
    tool.write_to_terminal(true);
    let output = tool
        .run(vec![
            format!("--script_path={}", script.display()),
            spec.target.clone(),
        ])
        .await?;
    Ok((output, script))
}

/// Launch the built script in its own process group.
fn launch(script: &Path, args: &[String], notify: bool) -> Result<ProcessGroup> {
    let mut group = ProcessGroup::new(script, args);
    group
        .env(ENV_IBAZEL, "true")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if notify {
        group.env(ENV_NOTIFY_CHANGES, "y").stdin(Stdio::piped());
    } else {
        group.stdin(Stdio::inherit());
    }
    group.start()?;
    info!(pid = ?group.id(), "Starting...");
    Ok(group)
}
