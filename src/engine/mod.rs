// src/engine/mod.rs

//! The watch-driven control loop.
//!
//! - [`core`]: a synchronous state machine ([`LoopCore`]) that turns
//!   [`LoopEvent`]s into state changes plus [`CoreCommand`]s for the shell.
//!   No Tokio, no filesystem, no processes.
//! - [`runtime`]: the async shell ([`Ibazel`]) that waits on watchers and
//!   timers, talks to the build tool, owns the `run` command and notifies
//!   lifecycle listeners.
//! - [`signals`]: interrupt escalation against the running command.
//! - [`watch_set`]: the per-channel sets of files events are matched against.

use std::fmt;
use std::path::PathBuf;

use crate::fswatcher::WatchEvent;
use crate::types::ChangeKind;

pub mod core;
pub mod runtime;
pub mod signals;
pub mod watch_set;

pub use self::core::LoopCore;
pub use runtime::{Ibazel, IbazelOptions};
pub use signals::{SignalHandler, TermSignal};
pub use watch_set::{WatchSet, resolve_watch_paths};

/// Which watcher an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// BUILD / module files; a change requires a new query.
    BuildGraph,
    /// Source files; a change only requires running the action again.
    Source,
}

impl Channel {
    pub fn change_kind(self) -> ChangeKind {
        match self {
            Channel::BuildGraph => ChangeKind::Graph,
            Channel::Source => ChangeKind::Source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Query,
    DebounceQuery,
    Run,
    Wait,
    DebounceRun,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Query => "QUERY",
            State::DebounceQuery => "DEBOUNCE_QUERY",
            State::Run => "RUN",
            State::Wait => "WAIT",
            State::DebounceRun => "DEBOUNCE_RUN",
        })
    }
}

/// Inputs to [`LoopCore::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// A filesystem event arrived on `channel`.
    FileChanged { channel: Channel, event: WatchEvent },
    /// The debounce timer ran out without a further matching event.
    DebounceElapsed,
    /// The shell finished querying and updating both watchers.
    QueryFinished,
    /// The shell finished running the action.
    RunFinished,
}

/// Side effects requested by the core.
///
/// Querying and running are not commands: the shell performs them whenever
/// the core is in QUERY or RUN and reports back with
/// [`LoopEvent::QueryFinished`] / [`LoopEvent::RunFinished`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Tell listeners about a matching change.
    ReportChange { kind: ChangeKind, path: PathBuf },
    /// Start (or restart) the debounce timer.
    ArmDebounce,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
}

impl CoreStep {
    fn none() -> Self {
        Self::default()
    }

    fn of(commands: impl IntoIterator<Item = CoreCommand>) -> Self {
        Self {
            commands: commands.into_iter().collect(),
        }
    }
}
