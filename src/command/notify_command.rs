// src/command/notify_command.rs

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    Command, CommandSpec, MSG_BUILD_FAILURE, MSG_BUILD_STARTED, MSG_BUILD_SUCCESS, Running,
    RunningSlot, build_script, launch,
};
use crate::bazel::new_tool;
use crate::errors::Result;
use crate::types::BoxFuture;

/// Makes sure runfiles exist locally before the child hears about a build.
const DOWNLOAD_TOPLEVEL: &str = "--remote_download_outputs=toplevel";

/// Command for targets tagged `ibazel_notify_changes`.
///
/// The child keeps running across changes and is told about each rebuild
/// on stdin. It is only (re)started when it is not running and a rebuild
/// succeeded.
pub struct NotifyCommand {
    spec: CommandSpec,
    running: RunningSlot,
    stdin: Mutex<Option<ChildStdin>>,
}

impl NotifyCommand {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            running: RunningSlot::default(),
            stdin: Mutex::new(None),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.running.pid()
    }

    async fn start_inner(&self) -> Result<String> {
        let (output, script) = build_script(&self.spec).await?;
        let mut group = launch(&script, &self.spec.args, true)?;
        *self.stdin.lock().await = group.take_stdin();
        self.running.replace(Running::new(group, script));
        Ok(output)
    }

    async fn terminate_inner(&self) {
        self.running.terminate(self.spec.graceful_wait).await;
        self.stdin.lock().await.take();
    }

    async fn write_stdin(&self, msg: &str) {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            debug!(msg = msg.trim_end(), "no subprocess stdin to notify");
            return;
        };
        let res = async {
            stdin.write_all(msg.as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        if let Err(err) = res {
            warn!(msg = msg.trim_end(), error = %err, "error writing to subprocess stdin");
        }
    }
}

impl Command for NotifyCommand {
    fn start(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.start_inner())
    }

    fn notify_of_changes(&self) -> BoxFuture<'_, String> {
        Box::pin(async move {
            let mut args = self.spec.bazel_args.clone();
            args.push(DOWNLOAD_TOPLEVEL.to_string());
            let mut tool = new_tool(self.spec.tools.as_ref(), &self.spec.startup_args, &args);
            tool.write_to_terminal(true);

            self.write_stdin(MSG_BUILD_STARTED).await;

            match tool.build(vec![self.spec.target.clone()]).await {
                Err(err) => {
                    error!(error = %err, "IBAZEL BUILD FAILURE");
                    self.write_stdin(MSG_BUILD_FAILURE).await;
                    err.output().to_string()
                }
                Ok(output) => {
                    info!("IBAZEL BUILD SUCCESS");
                    self.write_stdin(MSG_BUILD_SUCCESS).await;
                    if !self.running.is_running() {
                        info!("Restarting process...");
                        self.terminate_inner().await;
                        if let Err(err) = self.start_inner().await {
                            error!(label = %self.spec.target, error = %err, "restart failed");
                        }
                    }
                    output
                }
            }
        })
    }

    fn terminate(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.terminate_inner())
    }

    fn kill(&self) {
        self.running.kill();
    }

    fn is_subprocess_running(&self) -> bool {
        self.running.is_running()
    }
}
