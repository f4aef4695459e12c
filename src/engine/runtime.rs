// src/engine/runtime.rs

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::core::LoopCore;
use super::{Channel, CoreCommand, LoopEvent, State, resolve_watch_paths};
use crate::bazel::labels::{self, OVERRIDE_REPOSITORY_FLAG};
use crate::bazel::{self, BuildTool, BuildToolFactory, NOTIFY_CHANGES_TAG, Rule};
use crate::command::{Command, CommandFactory, CommandSlot, CommandSpec, DEFAULT_GRACEFUL_WAIT};
use crate::errors::{IbazelError, Result};
use crate::fswatcher::FileWatcher;
use crate::lifecycle::Lifecycle;
use crate::types::{ChangeKind, Verb};
use crate::workspace::Workspace;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

const TEST_OUTPUT_FLAG: &str = "--test_output=";
const TEST_OUTPUT_STREAMED: &str = "--test_output=streamed";

/// Settings the loop needs from the command line and config.
#[derive(Debug, Clone)]
pub struct IbazelOptions {
    pub debounce: Duration,
    pub graceful_wait: Duration,
    pub startup_args: Vec<String>,
    pub bazel_args: Vec<String>,
    /// Arguments for the launched program in `run` mode.
    pub run_args: Vec<String>,
}

impl Default for IbazelOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            graceful_wait: DEFAULT_GRACEFUL_WAIT,
            startup_args: Vec::new(),
            bazel_args: Vec::new(),
            run_args: Vec::new(),
        }
    }
}

/// The async shell around [`LoopCore`].
///
/// Owns both watchers, the listeners and the `run` command, and performs
/// all IO the core asks for. One iteration handles exactly one state.
pub struct Ibazel {
    core: LoopCore,
    options: IbazelOptions,
    tools: Arc<dyn BuildToolFactory>,
    commands: Arc<dyn CommandFactory>,
    workspace: Arc<dyn Workspace>,
    build_watcher: Box<dyn FileWatcher>,
    source_watcher: Box<dyn FileWatcher>,
    listeners: Vec<Box<dyn Lifecycle>>,
    slot: CommandSlot,
    interrupts: Arc<AtomicU32>,
    info: HashMap<String, String>,
    debounce_deadline: Option<Instant>,
}

impl fmt::Debug for Ibazel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ibazel")
            .field("core", &self.core)
            .field("options", &self.options)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Ibazel {
    pub fn new(
        options: IbazelOptions,
        tools: Arc<dyn BuildToolFactory>,
        commands: Arc<dyn CommandFactory>,
        workspace: Arc<dyn Workspace>,
        build_watcher: Box<dyn FileWatcher>,
        source_watcher: Box<dyn FileWatcher>,
    ) -> Self {
        Self {
            core: LoopCore::new(),
            options,
            tools,
            commands,
            workspace,
            build_watcher,
            source_watcher,
            listeners: Vec::new(),
            slot: CommandSlot::new(),
            interrupts: Arc::new(AtomicU32::new(0)),
            info: HashMap::new(),
            debounce_deadline: None,
        }
    }

    /// Register a listener. Listeners are notified in registration order.
    pub fn add_listener(&mut self, listener: Box<dyn Lifecycle>) {
        self.listeners.push(listener);
    }

    pub fn state(&self) -> State {
        self.core.state()
    }

    pub fn core(&self) -> &LoopCore {
        &self.core
    }

    /// The slot holding the `run` command, shared with the signal handler.
    pub fn command_slot(&self) -> CommandSlot {
        self.slot.clone()
    }

    /// Interrupt counter shared with the signal handler; reset after every
    /// action.
    pub fn interrupt_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.interrupts)
    }

    /// Fetch `info` from the build tool and hand it to every listener.
    pub async fn initialize(&mut self) {
        let mut tool = self.new_tool();
        self.info = match tool.info().await {
            Ok(info) => info,
            Err(err) => {
                error!(error = %err, "Error getting Bazel info");
                HashMap::new()
            }
        };
        for listener in &mut self.listeners {
            listener.initialize(&self.info);
        }
    }

    /// Drive the loop until an error ends it. In normal operation this never
    /// returns; shutdown happens by dropping the future.
    pub async fn run_loop(&mut self, verb: Verb, targets: &[String]) -> Result<()> {
        info!(%verb, ?targets, "starting watch loop");
        loop {
            self.iteration(verb, targets).await?;
        }
    }

    /// Handle the current state once.
    pub async fn iteration(&mut self, verb: Verb, targets: &[String]) -> Result<()> {
        match self.core.state() {
            State::Query => {
                self.query_and_watch(targets).await;
                self.apply(LoopEvent::QueryFinished, targets);
            }
            State::Run => {
                self.run_action(verb, targets).await;
                self.apply(LoopEvent::RunFinished, targets);
            }
            State::Wait => {
                let (channel, event) = tokio::select! {
                    Some(ev) = self.source_watcher.events().recv() => (Channel::Source, ev),
                    Some(ev) = self.build_watcher.events().recv() => (Channel::BuildGraph, ev),
                    else => return Err(streams_closed()),
                };
                self.apply(LoopEvent::FileChanged { channel, event }, targets);
            }
            State::DebounceRun => self.debounce(Channel::Source, targets).await?,
            State::DebounceQuery => self.debounce(Channel::BuildGraph, targets).await?,
        }
        Ok(())
    }

    /// Wait for either another event on `channel` or the debounce timer.
    /// Events on the other channel stay queued until the loop is back in WAIT.
    async fn debounce(&mut self, channel: Channel, targets: &[String]) -> Result<()> {
        let deadline = self
            .debounce_deadline
            .unwrap_or_else(|| Instant::now() + self.options.debounce);
        let watcher = match channel {
            Channel::Source => &mut self.source_watcher,
            Channel::BuildGraph => &mut self.build_watcher,
        };

        let event = tokio::select! {
            ev = watcher.events().recv() => match ev {
                Some(event) => LoopEvent::FileChanged { channel, event },
                None => return Err(streams_closed()),
            },
            _ = tokio::time::sleep_until(deadline) => LoopEvent::DebounceElapsed,
        };

        if event == LoopEvent::DebounceElapsed {
            self.debounce_deadline = None;
        }
        self.apply(event, targets);
        Ok(())
    }

    fn apply(&mut self, event: LoopEvent, targets: &[String]) {
        let step = self.core.step(event);
        for command in step.commands {
            match command {
                CoreCommand::ReportChange { kind, path } => {
                    self.change_detected(targets, kind, &path);
                }
                CoreCommand::ArmDebounce => {
                    self.debounce_deadline = Some(Instant::now() + self.options.debounce);
                }
            }
        }
    }

    /// Close both watchers, then clean up listeners in order.
    pub fn cleanup(&mut self) {
        self.build_watcher.close();
        self.source_watcher.close();
        for listener in &mut self.listeners {
            listener.cleanup();
        }
    }

    fn new_tool(&self) -> Box<dyn BuildTool> {
        bazel::new_tool(
            self.tools.as_ref(),
            &self.options.startup_args,
            &self.options.bazel_args,
        )
    }

    fn query_args(&self, query: String) -> Vec<String> {
        let mut args = vec![query];
        args.extend(
            self.options
                .bazel_args
                .iter()
                .filter(|a| a.starts_with(OVERRIDE_REPOSITORY_FLAG))
                .cloned(),
        );
        args
    }

    // Listener fan-out.

    fn target_decider(&mut self, rule: &Rule) {
        for listener in &mut self.listeners {
            listener.target_decider(rule);
        }
    }

    fn change_detected(&mut self, targets: &[String], kind: ChangeKind, path: &std::path::Path) {
        for listener in &mut self.listeners {
            listener.change_detected(targets, kind, path);
        }
    }

    fn before_command(&mut self, targets: &[String], verb: Verb) {
        for listener in &mut self.listeners {
            listener.before_command(targets, verb);
        }
    }

    fn after_command(&mut self, targets: &[String], verb: Verb, success: bool, output: &str) {
        for listener in &mut self.listeners {
            listener.after_command(targets, verb, success, output);
        }
    }

    // QUERY

    async fn query_and_watch(&mut self, targets: &[String]) {
        let joined = targets.join(" ");
        info!("Querying for files to watch...");
        self.watch_files(Channel::BuildGraph, format!("buildfiles(deps(set({joined})))"))
            .await;
        self.watch_files(
            Channel::Source,
            format!("kind('source file', deps(set({joined})))"),
        )
        .await;
    }

    /// Query, resolve and hand the resulting directories to the watcher for
    /// `channel`. A failed query keeps the previous set.
    async fn watch_files(&mut self, channel: Channel, query: String) {
        let files = match self.query_for_source_files(&query).await {
            Ok(files) => files,
            Err(err) => {
                error!(error = %err, "Error querying for source files");
                return;
            }
        };

        let (resolved, dirs) = resolve_watch_paths(files);
        let watcher = match channel {
            Channel::BuildGraph => &mut self.build_watcher,
            Channel::Source => &mut self.source_watcher,
        };
        match watcher.update_all(dirs) {
            Ok(count) => debug!(?channel, count, "watch list updated"),
            Err(err) => error!("{err}"),
        }

        if resolved.is_empty() {
            error!("Didn't find any files to watch from query {query}");
        }
        self.core.watch_set_mut().replace(channel, resolved);
    }

    async fn query_for_source_files(&self, query: &str) -> Result<Vec<PathBuf>> {
        let local_repos = labels::local_repository_paths(&self.info, &self.options.bazel_args);
        let mut tool = self.new_tool();
        tool.write_to_terminal(false);
        let result = tool.query(self.query_args(query.to_string())).await?;
        let workspace = self.workspace.find_workspace()?;

        Ok(result
            .source_files()
            .filter_map(|label| {
                let path = labels::label_to_path(label, &workspace, &local_repos);
                if path.is_none() {
                    debug!(label, "not watching label");
                }
                path
            })
            .collect())
    }

    /// First rule node returned when querying `target` itself.
    async fn query_rule(&self, target: &str) -> Option<Rule> {
        let mut tool = self.new_tool();
        tool.write_to_terminal(false);
        match tool.query(self.query_args(target.to_string())).await {
            Ok(result) => {
                let rule = result.first_rule().cloned();
                if rule.is_none() {
                    error!(label = target, "No information available");
                }
                rule
            }
            Err(err) => {
                error!(error = %err, "Error running Bazel");
                None
            }
        }
    }

    // RUN

    async fn run_action(&mut self, verb: Verb, targets: &[String]) {
        info!("{} {}", verb.progressive(), targets.join(" "));
        self.before_command(targets, verb);

        let result = match verb {
            Verb::Build => self.build(targets).await,
            Verb::Test | Verb::Coverage => self.test(verb, targets).await,
            Verb::Run => self.run(targets).await,
        };
        self.interrupts.store(0, Ordering::SeqCst);

        let (success, output) = match result {
            Ok(output) => (true, output),
            Err(err) => (false, err.output().to_string()),
        };
        self.after_command(targets, verb, success, &output);
    }

    async fn build(&self, targets: &[String]) -> Result<String> {
        let mut tool = self.new_tool();
        tool.cancel();
        tool.write_to_terminal(true);
        tool.build(targets.to_vec()).await.inspect_err(|err| {
            error!(error = %err, "Build error");
        })
    }

    async fn test(&self, verb: Verb, targets: &[String]) -> Result<String> {
        let mut tool = self.new_tool();

        let mut rules = BTreeSet::new();
        for target in targets {
            if let Some(rule) = self.query_rule(target).await {
                rules.insert(rule.name);
            }
        }

        if rules.len() == 1 && !tool.args().iter().any(|a| a.starts_with(TEST_OUTPUT_FLAG)) {
            info!(
                "Found a single target test. Streaming results. You can override this by explicitly passing --test_output=summary"
            );
            let mut args = vec![TEST_OUTPUT_STREAMED.to_string()];
            args.extend(tool.args().iter().cloned());
            tool.set_arguments(args);
        }

        tool.cancel();
        tool.write_to_terminal(true);
        let result = match verb {
            Verb::Coverage => tool.coverage(targets.to_vec()).await,
            _ => tool.test(targets.to_vec()).await,
        };
        result.inspect_err(|err| error!(error = %err, "Build error"))
    }

    async fn run(&mut self, targets: &[String]) -> Result<String> {
        if let Some(command) = self.slot.get() {
            info!("Notifying of changes");
            return Ok(command.notify_of_changes().await);
        }

        let target = targets
            .first()
            .ok_or_else(|| IbazelError::Config("run requires a target".to_string()))?;
        let command = self.setup_run(target).await;
        self.slot.set(Arc::clone(&command));
        command
            .start()
            .await
            .inspect_err(|err| error!(error = %err, "Run start failed"))
    }

    async fn setup_run(&mut self, target: &str) -> Arc<dyn Command> {
        let rule = self.query_rule(target).await;
        let notify = match &rule {
            Some(rule) => {
                self.target_decider(rule);
                rule.has_tag(NOTIFY_CHANGES_TAG)
            }
            None => false,
        };

        let spec = CommandSpec {
            target: target.to_string(),
            startup_args: self.options.startup_args.clone(),
            bazel_args: self.options.bazel_args.clone(),
            args: self.options.run_args.clone(),
            graceful_wait: self.options.graceful_wait,
            tools: Arc::clone(&self.tools),
        };

        if notify {
            info!("Launching with notifications");
            self.commands.notify_command(spec)
        } else {
            self.commands.default_command(spec)
        }
    }
}

fn streams_closed() -> IbazelError {
    IbazelError::Other(anyhow!("file watcher event streams closed"))
}
