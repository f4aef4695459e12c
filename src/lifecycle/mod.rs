// src/lifecycle/mod.rs

//! Listeners notified at fixed points of the control loop.
//!
//! Listeners are called synchronously, in registration order. They are
//! trusted: a listener that blocks stalls the loop.

use std::collections::HashMap;
use std::path::Path;

use crate::bazel::Rule;
use crate::types::{ChangeKind, Verb};

mod hooks;

pub use hooks::{HookCommands, LifecycleHooks};

pub trait Lifecycle: Send {
    /// Called once at startup with the build tool's `info` output.
    fn initialize(&mut self, info: &HashMap<String, String>);

    /// Called with the rule of a `run` target before its command is created.
    fn target_decider(&mut self, rule: &Rule);

    fn change_detected(&mut self, targets: &[String], kind: ChangeKind, path: &Path);

    fn before_command(&mut self, targets: &[String], verb: Verb);

    fn after_command(&mut self, targets: &[String], verb: Verb, success: bool, output: &str);

    /// Release sockets, files and the like.
    fn cleanup(&mut self);
}
