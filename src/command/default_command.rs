// src/command/default_command.rs

use tracing::error;

use super::{Command, CommandSpec, Running, RunningSlot, build_script, launch};
use crate::errors::Result;
use crate::types::BoxFuture;

/// Restart-on-change command: every change terminates the child and starts
/// a fresh build and process.
pub struct DefaultCommand {
    spec: CommandSpec,
    running: RunningSlot,
}

impl DefaultCommand {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            running: RunningSlot::default(),
        }
    }

    /// Pid of the current root process, if one was started.
    pub fn pid(&self) -> Option<u32> {
        self.running.pid()
    }

    async fn start_inner(&self) -> Result<String> {
        let (output, script) = build_script(&self.spec).await?;
        let group = launch(&script, &self.spec.args, false)?;
        self.running.replace(Running::new(group, script));
        Ok(output)
    }
}

impl Command for DefaultCommand {
    fn start(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.start_inner())
    }

    fn notify_of_changes(&self) -> BoxFuture<'_, String> {
        Box::pin(async move {
            self.running.terminate(self.spec.graceful_wait).await;
            match self.start_inner().await {
                Ok(output) => output,
                Err(err) => {
                    error!(label = %self.spec.target, error = %err, "restart failed");
                    err.output().to_string()
                }
            }
        })
    }

    fn terminate(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.running.terminate(self.spec.graceful_wait))
    }

    fn kill(&self) {
        self.running.kill();
    }

    fn is_subprocess_running(&self) -> bool {
        self.running.is_running()
    }
}
