// src/engine/core.rs

//! Pure control-loop state machine.
//!
//! | State          | Input                  | Next           | Commands                      |
//! |----------------|------------------------|----------------|-------------------------------|
//! | QUERY          | `QueryFinished`        | RUN            |                               |
//! | RUN            | `RunFinished`          | WAIT           |                               |
//! | WAIT           | matching source change | DEBOUNCE_RUN   | `ReportChange`, `ArmDebounce` |
//! | WAIT           | matching graph change  | DEBOUNCE_QUERY | `ReportChange`, `ArmDebounce` |
//! | DEBOUNCE_RUN   | matching source change | DEBOUNCE_RUN   | `ReportChange`, `ArmDebounce` |
//! | DEBOUNCE_RUN   | `DebounceElapsed`      | RUN            |                               |
//! | DEBOUNCE_QUERY | matching graph change  | DEBOUNCE_QUERY | `ReportChange`, `ArmDebounce` |
//! | DEBOUNCE_QUERY | `DebounceElapsed`      | QUERY          |                               |
//!
//! Anything else leaves the state untouched. A change "matches" when its
//! operation is modifying and its path is in the current [`WatchSet`] for
//! the channel it arrived on.

use tracing::{debug, info};

use super::{Channel, CoreCommand, CoreStep, LoopEvent, State, WatchSet};
use crate::fswatcher::WatchEvent;

#[derive(Debug)]
pub struct LoopCore {
    state: State,
    watch_set: WatchSet,
}

impl Default for LoopCore {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopCore {
    /// A fresh loop always starts by querying.
    pub fn new() -> Self {
        Self {
            state: State::Query,
            watch_set: WatchSet::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn watch_set(&self) -> &WatchSet {
        &self.watch_set
    }

    pub fn watch_set_mut(&mut self) -> &mut WatchSet {
        &mut self.watch_set
    }

    /// Whether `event` on `channel` should drive a transition.
    pub fn is_relevant(&self, channel: Channel, event: &WatchEvent) -> bool {
        event.op.is_modifying() && self.watch_set.contains(channel, &event.path)
    }

    pub fn step(&mut self, event: LoopEvent) -> CoreStep {
        let from = self.state;
        let step = match (from, event) {
            (State::Query, LoopEvent::QueryFinished) => {
                self.state = State::Run;
                CoreStep::none()
            }
            (State::Run, LoopEvent::RunFinished) => {
                self.state = State::Wait;
                CoreStep::none()
            }
            (
                State::Wait | State::DebounceRun | State::DebounceQuery,
                LoopEvent::FileChanged { channel, event },
            ) => self.on_change(channel, event),
            (State::DebounceRun, LoopEvent::DebounceElapsed) => {
                self.state = State::Run;
                CoreStep::none()
            }
            (State::DebounceQuery, LoopEvent::DebounceElapsed) => {
                self.state = State::Query;
                CoreStep::none()
            }
            (state, event) => {
                debug!(%state, ?event, "ignoring event");
                CoreStep::none()
            }
        };

        if self.state != from {
            debug!(from = %from, to = %self.state, "state transition");
        }
        step
    }

    fn on_change(&mut self, channel: Channel, event: WatchEvent) -> CoreStep {
        if !self.is_relevant(channel, &event) {
            debug!(path = %event.path.display(), op = %event.op, ?channel, "ignoring unwatched change");
            return CoreStep::none();
        }

        let next = match (self.state, channel) {
            (State::Wait, Channel::Source) => {
                info!("Changed: {:?}. Rebuilding...", event.path);
                State::DebounceRun
            }
            (State::Wait, Channel::BuildGraph) => {
                info!("Build graph changed: {:?}. Requerying...", event.path);
                State::DebounceQuery
            }
            (State::DebounceRun, Channel::Source) => State::DebounceRun,
            (State::DebounceQuery, Channel::BuildGraph) => State::DebounceQuery,
            // The other channel waits until the loop is back in WAIT.
            _ => return CoreStep::none(),
        };

        self.state = next;
        CoreStep::of([
            CoreCommand::ReportChange {
                kind: channel.change_kind(),
                path: event.path,
            },
            CoreCommand::ArmDebounce,
        ])
    }
}
