// src/lifecycle/hooks.rs

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::Lifecycle;
use crate::bazel::Rule;
use crate::types::{ChangeKind, Verb};
use crate::workspace::Workspace;

/// Hook commands, already split into program and arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookCommands {
    pub before: Option<Vec<String>>,
    pub after: Option<Vec<String>>,
    pub after_success: Option<Vec<String>>,
}

impl HookCommands {
    pub fn is_empty(&self) -> bool {
        self.before.is_none() && self.after.is_none() && self.after_success.is_none()
    }
}

/// Runs user-configured shell commands around every action.
pub struct LifecycleHooks {
    hooks: HookCommands,
    workspace: Arc<dyn Workspace>,
}

impl LifecycleHooks {
    pub fn new(hooks: HookCommands, workspace: Arc<dyn Workspace>) -> Self {
        Self { hooks, workspace }
    }

    fn execute(&self, which: &str, command: Option<&Vec<String>>) {
        let Some((program, args)) = command.and_then(|c| c.split_first()) else {
            return;
        };
        debug!(hook = which, program, "running lifecycle hook");
        self.workspace.execute_command(program, args);
    }
}

impl Lifecycle for LifecycleHooks {
    fn initialize(&mut self, _info: &HashMap<String, String>) {}

    fn target_decider(&mut self, _rule: &Rule) {}

    fn change_detected(&mut self, _targets: &[String], _kind: ChangeKind, _path: &Path) {}

    fn before_command(&mut self, _targets: &[String], _verb: Verb) {
        self.execute("run_command_before", self.hooks.before.as_ref());
    }

    fn after_command(&mut self, _targets: &[String], _verb: Verb, success: bool, _output: &str) {
        self.execute("run_command_after", self.hooks.after.as_ref());
        if success {
            self.execute("run_command_after_success", self.hooks.after_success.as_ref());
        }
    }

    fn cleanup(&mut self) {}
}
