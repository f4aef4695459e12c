use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ibazel::command::{Command, CommandFactory, CommandSpec};
use ibazel::errors::{IbazelError, Result};
use ibazel::types::{BoxFuture, Verb};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCall {
    Start,
    NotifyOfChanges,
    Terminate,
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Default,
    Notify,
}

/// In-memory [`Command`]. `start` marks it running, `terminate` and `kill`
/// mark it stopped.
pub struct FakeCommand {
    pub kind: CommandKind,
    pub spec: CommandSpec,
    running: AtomicBool,
    fail_start: AtomicBool,
    calls: Mutex<Vec<CommandCall>>,
}

impl FakeCommand {
    pub fn new(kind: CommandKind, spec: CommandSpec) -> Self {
        Self {
            kind,
            spec,
            running: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<CommandCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: CommandCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    fn record(&self, call: CommandCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Command for FakeCommand {
    fn start(&self) -> BoxFuture<'_, Result<String>> {
        self.record(CommandCall::Start);
        let result = if self.fail_start.load(Ordering::SeqCst) {
            Err(IbazelError::BuildFailed {
                verb: Verb::Run,
                output: "build failed".to_string(),
            })
        } else {
            self.set_running(true);
            Ok("started".to_string())
        };
        Box::pin(std::future::ready(result))
    }

    fn notify_of_changes(&self) -> BoxFuture<'_, String> {
        self.record(CommandCall::NotifyOfChanges);
        Box::pin(std::future::ready("notified".to_string()))
    }

    fn terminate(&self) -> BoxFuture<'_, ()> {
        self.record(CommandCall::Terminate);
        self.set_running(false);
        Box::pin(std::future::ready(()))
    }

    fn kill(&self) {
        self.record(CommandCall::Kill);
        self.set_running(false);
    }

    fn is_subprocess_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Hands out [`FakeCommand`]s and keeps them for inspection.
#[derive(Clone, Default)]
pub struct FakeCommandFactory {
    created: Arc<Mutex<Vec<Arc<FakeCommand>>>>,
}

impl FakeCommandFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<Arc<FakeCommand>> {
        self.created.lock().unwrap().clone()
    }

    fn make(&self, kind: CommandKind, spec: CommandSpec) -> Arc<dyn Command> {
        let command = Arc::new(FakeCommand::new(kind, spec));
        self.created.lock().unwrap().push(Arc::clone(&command));
        command
    }
}

impl CommandFactory for FakeCommandFactory {
    fn default_command(&self, spec: CommandSpec) -> Arc<dyn Command> {
        self.make(CommandKind::Default, spec)
    }

    fn notify_command(&self, spec: CommandSpec) -> Arc<dyn Command> {
        self.make(CommandKind::Notify, spec)
    }
}
