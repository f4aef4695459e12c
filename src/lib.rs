// src/lib.rs

pub mod bazel;
pub mod cli;
pub mod command;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fswatcher;
pub mod lifecycle;
pub mod logging;
pub mod process_group;
pub mod types;
pub mod ulimit;
pub mod workspace;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::bazel::BazelCliFactory;
use crate::cli::{CliArgs, apply_default_bazel_args, parse_args, stderr_is_terminal};
use crate::command::ProcessCommandFactory;
use crate::config::Settings;
use crate::engine::{Ibazel, IbazelOptions, SignalHandler, signals};
use crate::errors::{IbazelError, Result};
use crate::fswatcher::new_watcher;
use crate::lifecycle::LifecycleHooks;
use crate::types::Verb;
use crate::workspace::{MainWorkspace, Workspace};

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - argument splitting and config loading
/// - the build tool and command factories
/// - both file watchers
/// - the control loop and its listeners
/// - signal handling
pub async fn run(args: CliArgs) -> Result<i32> {
    let parsed = parse_args(&args.args);
    let mut targets = parsed.targets;
    if targets.is_empty() {
        return Err(IbazelError::Config(format!(
            "{} needs at least one target",
            args.verb
        )));
    }
    if args.verb == Verb::Run && targets.len() > 1 {
        warn!(ignored = ?&targets[1..], "run takes a single target");
        targets.truncate(1);
    }

    let workspace: Arc<dyn Workspace> = Arc::new(MainWorkspace::new());
    let root = match workspace.find_workspace() {
        Ok(root) => Some(root),
        Err(err) => {
            debug!(error = %err, "no workspace root; using built-in config");
            None
        }
    };
    let file = config::discover(args.config_file.as_deref(), root.as_deref())?;
    let settings = Settings::resolve(&file, &args)?;

    let options = IbazelOptions {
        debounce: settings.debounce,
        graceful_wait: settings.graceful_wait,
        startup_args: parsed.startup_args,
        bazel_args: apply_default_bazel_args(parsed.bazel_args, stderr_is_terminal()),
        run_args: parsed.run_args,
    };

    let tools = Arc::new(BazelCliFactory::discover(settings.bazel_path.clone()));
    let build_watcher = new_watcher(settings.watcher, settings.tolerate.clone())?;
    let source_watcher = new_watcher(settings.watcher, settings.tolerate.clone())?;

    let mut ibazel = Ibazel::new(
        options,
        tools,
        Arc::new(ProcessCommandFactory),
        Arc::clone(&workspace),
        build_watcher,
        source_watcher,
    );
    if !settings.hooks.is_empty() {
        ibazel.add_listener(Box::new(LifecycleHooks::new(
            settings.hooks.clone(),
            Arc::clone(&workspace),
        )));
    }
    ibazel.initialize().await;

    let slot = ibazel.command_slot();
    let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<i32>();
    let handler = SignalHandler::new(slot.clone(), ibazel.interrupt_counter(), exit_tx);
    tokio::spawn(handler.run(signals::listen()?));

    let code = tokio::select! {
        res = ibazel.run_loop(args.verb, &targets) => match res {
            Ok(()) => 0,
            Err(err) => {
                error!(error = %err, "watch loop stopped");
                if let Some(command) = slot.get() {
                    if command.is_subprocess_running() {
                        command.terminate().await;
                    }
                }
                1
            }
        },
        Some(code) = exit_rx.recv() => code,
    };

    ibazel.cleanup();
    Ok(code)
}
