// tests/core_transitions.rs

use std::collections::HashSet;
use std::path::PathBuf;

use proptest::prelude::*;

use ibazel::engine::{Channel, CoreCommand, LoopCore, LoopEvent, State};
use ibazel::fswatcher::{Op, WatchEvent};
use ibazel::types::ChangeKind;

fn core_in_wait() -> LoopCore {
    let mut core = LoopCore::new();
    core.watch_set_mut().replace(
        Channel::Source,
        HashSet::from([PathBuf::from("/ws/pkg/a.txt")]),
    );
    core.watch_set_mut().replace(
        Channel::BuildGraph,
        HashSet::from([PathBuf::from("/ws/pkg/BUILD")]),
    );
    core.step(LoopEvent::QueryFinished);
    core.step(LoopEvent::RunFinished);
    assert_eq!(core.state(), State::Wait);
    core
}

fn changed(channel: Channel, path: &str, op: Op) -> LoopEvent {
    LoopEvent::FileChanged {
        channel,
        event: WatchEvent::new(path, op),
    }
}

#[test]
fn starts_in_query_then_runs_then_waits() {
    let mut core = LoopCore::new();
    assert_eq!(core.state(), State::Query);

    assert!(core.step(LoopEvent::QueryFinished).commands.is_empty());
    assert_eq!(core.state(), State::Run);

    assert!(core.step(LoopEvent::RunFinished).commands.is_empty());
    assert_eq!(core.state(), State::Wait);
}

#[test]
fn source_change_debounces_then_runs() {
    let mut core = core_in_wait();

    let step = core.step(changed(Channel::Source, "/ws/pkg/a.txt", Op::WRITE));
    assert_eq!(core.state(), State::DebounceRun);
    assert_eq!(
        step.commands,
        vec![
            CoreCommand::ReportChange {
                kind: ChangeKind::Source,
                path: PathBuf::from("/ws/pkg/a.txt"),
            },
            CoreCommand::ArmDebounce,
        ]
    );

    core.step(LoopEvent::DebounceElapsed);
    assert_eq!(core.state(), State::Run);
}

#[test]
fn graph_change_debounces_then_queries() {
    let mut core = core_in_wait();

    let step = core.step(changed(Channel::BuildGraph, "/ws/pkg/BUILD", Op::CREATE));
    assert_eq!(core.state(), State::DebounceQuery);
    assert!(matches!(
        step.commands.first(),
        Some(CoreCommand::ReportChange {
            kind: ChangeKind::Graph,
            ..
        })
    ));

    core.step(LoopEvent::DebounceElapsed);
    assert_eq!(core.state(), State::Query);
}

#[test]
fn unwatched_path_is_ignored() {
    let mut core = core_in_wait();

    let step = core.step(changed(Channel::Source, "/ws/pkg/other.txt", Op::WRITE));
    assert!(step.commands.is_empty());
    assert_eq!(core.state(), State::Wait);
}

#[test]
fn path_on_wrong_channel_is_ignored() {
    let mut core = core_in_wait();

    // a.txt is a source file; reported by the build graph watcher it means nothing.
    core.step(changed(Channel::BuildGraph, "/ws/pkg/a.txt", Op::WRITE));
    assert_eq!(core.state(), State::Wait);
}

#[test]
fn non_modifying_op_is_ignored() {
    let mut core = core_in_wait();

    core.step(changed(Channel::Source, "/ws/pkg/a.txt", Op::empty()));
    assert_eq!(core.state(), State::Wait);
}

#[test]
fn chmod_alone_is_not_a_change() {
    let mut core = core_in_wait();

    core.step(changed(Channel::Source, "/ws/pkg/a.txt", Op::CHMOD));
    assert_eq!(core.state(), State::Wait);

    core.step(changed(Channel::Source, "/ws/pkg/a.txt", Op::CHMOD | Op::WRITE));
    assert_eq!(core.state(), State::DebounceRun);
}

#[test]
fn same_channel_change_during_debounce_rearms() {
    let mut core = core_in_wait();
    core.step(changed(Channel::Source, "/ws/pkg/a.txt", Op::WRITE));

    let step = core.step(changed(Channel::Source, "/ws/pkg/a.txt", Op::WRITE));
    assert_eq!(core.state(), State::DebounceRun);
    assert_eq!(step.commands.last(), Some(&CoreCommand::ArmDebounce));
}

#[test]
fn other_channel_change_during_debounce_is_dropped() {
    let mut core = core_in_wait();
    core.step(changed(Channel::Source, "/ws/pkg/a.txt", Op::WRITE));

    let step = core.step(changed(Channel::BuildGraph, "/ws/pkg/BUILD", Op::WRITE));
    assert!(step.commands.is_empty());
    assert_eq!(core.state(), State::DebounceRun);

    core.step(LoopEvent::DebounceElapsed);
    assert_eq!(core.state(), State::Run);
}

#[test]
fn stray_events_leave_state_alone() {
    let mut core = LoopCore::new();
    core.step(LoopEvent::RunFinished);
    core.step(LoopEvent::DebounceElapsed);
    assert_eq!(core.state(), State::Query);

    let mut core = core_in_wait();
    core.step(LoopEvent::QueryFinished);
    core.step(LoopEvent::DebounceElapsed);
    assert_eq!(core.state(), State::Wait);
}

#[test]
fn state_names_match_log_output() {
    assert_eq!(State::DebounceQuery.to_string(), "DEBOUNCE_QUERY");
    assert_eq!(State::DebounceRun.to_string(), "DEBOUNCE_RUN");
    assert_eq!(State::Wait.to_string(), "WAIT");
}

#[derive(Debug, Clone)]
enum Input {
    Source { watched: bool, op: Op },
    Graph { watched: bool, op: Op },
    Elapsed,
    QueryDone,
    RunDone,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::empty()),
        Just(Op::CREATE),
        Just(Op::WRITE),
        Just(Op::REMOVE),
        Just(Op::RENAME),
        Just(Op::CHMOD),
    ]
}

fn input_strategy() -> impl Strategy<Value = Input> {
    prop_oneof![
        (any::<bool>(), op_strategy()).prop_map(|(watched, op)| Input::Source { watched, op }),
        (any::<bool>(), op_strategy()).prop_map(|(watched, op)| Input::Graph { watched, op }),
        Just(Input::Elapsed),
        Just(Input::QueryDone),
        Just(Input::RunDone),
    ]
}

fn to_event(input: &Input) -> LoopEvent {
    match input {
        Input::Source { watched, op } => changed(
            Channel::Source,
            if *watched { "/ws/pkg/a.txt" } else { "/ws/pkg/x.txt" },
            *op,
        ),
        Input::Graph { watched, op } => changed(
            Channel::BuildGraph,
            if *watched { "/ws/pkg/BUILD" } else { "/ws/x/BUILD" },
            *op,
        ),
        Input::Elapsed => LoopEvent::DebounceElapsed,
        Input::QueryDone => LoopEvent::QueryFinished,
        Input::RunDone => LoopEvent::RunFinished,
    }
}

fn allowed(from: State, to: State) -> bool {
    from == to
        || matches!(
            (from, to),
            (State::Query, State::Run)
                | (State::Run, State::Wait)
                | (State::Wait, State::DebounceRun)
                | (State::Wait, State::DebounceQuery)
                | (State::DebounceRun, State::Run)
                | (State::DebounceQuery, State::Query)
        )
}

proptest! {
    #[test]
    fn only_documented_transitions_happen(inputs in prop::collection::vec(input_strategy(), 0..64)) {
        let mut core = core_in_wait();
        for input in &inputs {
            let from = core.state();
            let step = core.step(to_event(input));
            let to = core.state();
            prop_assert!(allowed(from, to), "{from} -> {to} on {input:?}");

            // Changes are only reported when they move or keep a debounce going.
            if !step.commands.is_empty() {
                prop_assert!(matches!(to, State::DebounceRun | State::DebounceQuery));
            }
        }
    }
}
