// src/process_group/mod.rs

//! A subprocess plus everything it spawns, handled as one unit.
//!
//! On Unix the root process is placed in a fresh process group whose id is
//! the root pid, so signals sent to the negative pid reach every descendant.
//! On Windows the root is created suspended, assigned to a job object, and
//! only then resumed, so no grandchild can escape the job before it exists.
//!
//! The backend is picked at compile time ([`unix`] or [`windows`]); nothing
//! in this file branches on the platform at runtime.
//!
//! Group membership is fixed in [`ProcessGroup::new`]. Callers may only
//! adjust environment and stdio through the narrow setters here; the root
//! `Command` itself is never handed out.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::{ChildStdin, Command};
use tokio::sync::watch;
use tracing::{debug, warn};

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as sys;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as sys;

#[derive(Error, Debug)]
pub enum ProcessGroupError {
    #[error("process group already started")]
    AlreadyStarted,

    #[error("process group not started")]
    NotStarted,

    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("OS error: {0}")]
    Os(#[source] std::io::Error),
}

/// Termination signals understood by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
    Kill,
}

/// Exit state published by the reaper task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// `None` when the exit status could not be collected.
    Exited(Option<ExitStatus>),
}

pub struct ProcessGroup {
    root: Option<Command>,
    group: Option<sys::Group>,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    state: Option<watch::Receiver<ProcessState>>,
}

impl std::fmt::Debug for ProcessGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("pid", &self.pid)
            .field("started", &self.root.is_none())
            .finish_non_exhaustive()
    }
}

impl ProcessGroup {
    /// Prepare (but do not start) a root process with its group attributes
    /// already applied.
    pub fn new<I, S>(program: impl AsRef<OsStr>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut root = Command::new(program);
        root.args(args);
        sys::configure(&mut root);
        Self {
            root: Some(root),
            group: None,
            pid: None,
            stdin: None,
            state: None,
        }
    }

    pub fn env(&mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> &mut Self {
        if let Some(root) = self.root.as_mut() {
            root.env(key, value);
        }
        self
    }

    pub fn current_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        if let Some(root) = self.root.as_mut() {
            root.current_dir(dir);
        }
        self
    }

    pub fn stdin(&mut self, cfg: Stdio) -> &mut Self {
        if let Some(root) = self.root.as_mut() {
            root.stdin(cfg);
        }
        self
    }

    pub fn stdout(&mut self, cfg: Stdio) -> &mut Self {
        if let Some(root) = self.root.as_mut() {
            root.stdout(cfg);
        }
        self
    }

    pub fn stderr(&mut self, cfg: Stdio) -> &mut Self {
        if let Some(root) = self.root.as_mut() {
            root.stderr(cfg);
        }
        self
    }

    /// Spawn the root process into its group.
    ///
    /// Must be called from inside a Tokio runtime: a reaper task owns the
    /// child from here on and publishes its exit.
    pub fn start(&mut self) -> Result<(), ProcessGroupError> {
        let mut root = self.root.take().ok_or(ProcessGroupError::AlreadyStarted)?;

        let mut child = root.spawn().map_err(ProcessGroupError::Spawn)?;
        let group = match sys::attach(&child) {
            Ok(group) => group,
            Err(err) => {
                let _ = child.start_kill();
                return Err(err);
            }
        };

        self.pid = child.id();
        self.stdin = child.stdin.take();
        self.group = Some(group);

        let (tx, rx) = watch::channel(ProcessState::Running);
        let pid = self.pid;
        tokio::spawn(async move {
            let status = match child.wait().await {
                Ok(status) => Some(status),
                Err(err) => {
                    warn!(?pid, error = %err, "failed to wait for root process");
                    None
                }
            };
            debug!(?pid, ?status, "root process exited");
            let _ = tx.send(ProcessState::Exited(status));
        });
        self.state = Some(rx);

        Ok(())
    }

    /// Pid of the root process once started.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Take the write end of the child's stdin, if it was piped.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Deliver `sig` to every process in the group.
    pub fn signal(&self, sig: Signal) -> Result<(), ProcessGroupError> {
        let group = self.group.as_ref().ok_or(ProcessGroupError::NotStarted)?;
        group.signal(sig)
    }

    pub fn kill(&self) -> Result<(), ProcessGroupError> {
        self.signal(Signal::Kill)
    }

    /// Wait for the root process to exit. Descendants are not waited for.
    pub async fn wait(&self) -> Result<Option<ExitStatus>, ProcessGroupError> {
        let mut rx = self.state.clone().ok_or(ProcessGroupError::NotStarted)?;
        let state = match rx.wait_for(|s| *s != ProcessState::Running).await {
            Ok(state) => *state,
            // Reaper dropped the sender without publishing; nothing left to wait on.
            Err(_) => ProcessState::Exited(None),
        };
        match state {
            ProcessState::Exited(status) => Ok(status),
            ProcessState::Running => Ok(None),
        }
    }

    pub fn state(&self) -> Option<ProcessState> {
        self.state.as_ref().map(|rx| *rx.borrow())
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), Some(ProcessState::Running))
    }
}
