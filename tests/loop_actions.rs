// tests/loop_actions.rs

mod common;
use crate::common::{Harness, TARGET, graph_query, init_tracing, source_query};

use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

use ibazel::bazel::NOTIFY_CHANGES_TAG;
use ibazel::engine::{IbazelOptions, State};
use ibazel::lifecycle::{HookCommands, LifecycleHooks};
use ibazel::types::{ChangeKind, Verb};
use ibazel_test_utils::{
    CommandCall, CommandKind, ListenerEvent, RecordingListener, rule_result, source_result,
};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test(start_paused = true)]
async fn single_test_target_streams_output() -> TestResult {
    init_tracing();
    let mut h = Harness::new(IbazelOptions::default());
    h.tools
        .set_query(TARGET, rule_result(TARGET, "sh_test", &[]));

    h.settle(Verb::Test).await;

    let tests = h.tools.invocations_of("test");
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].tool_args[0], "--test_output=streamed");
    assert_eq!(tests[0].call_args, vec![TARGET.to_string()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn explicit_test_output_wins() -> TestResult {
    init_tracing();
    let options = IbazelOptions {
        bazel_args: vec!["--test_output=errors".to_string()],
        ..IbazelOptions::default()
    };
    let mut h = Harness::new(options);
    h.tools
        .set_query(TARGET, rule_result(TARGET, "sh_test", &[]));

    h.settle(Verb::Test).await;

    let tests = h.tools.invocations_of("test");
    assert_eq!(tests[0].tool_args, vec!["--test_output=errors".to_string()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn several_test_targets_do_not_stream() -> TestResult {
    init_tracing();
    let mut h = Harness::new(IbazelOptions::default());
    let other = "//pkg:other_test";
    h.targets = vec![TARGET.to_string(), other.to_string()];
    h.tools.set_query(
        graph_query(&[TARGET, other]),
        source_result(&["//pkg:BUILD"]),
    );
    h.tools.set_query(
        source_query(&[TARGET, other]),
        source_result(&["//pkg:app.txt"]),
    );
    h.tools
        .set_query(TARGET, rule_result(TARGET, "sh_test", &[]));
    h.tools
        .set_query(other, rule_result(other, "sh_test", &[]));

    h.settle(Verb::Test).await;

    let tests = h.tools.invocations_of("test");
    assert!(tests[0].tool_args.is_empty());
    assert_eq!(tests[0].call_args.len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn coverage_uses_the_coverage_verb() -> TestResult {
    init_tracing();
    let mut h = Harness::new(IbazelOptions::default());

    h.settle(Verb::Coverage).await;

    assert_eq!(h.tools.invocations_of("coverage").len(), 1);
    assert!(h.tools.invocations_of("test").is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn run_starts_once_then_notifies() -> TestResult {
    init_tracing();
    let options = IbazelOptions {
        run_args: vec!["--port=8080".to_string()],
        ..IbazelOptions::default()
    };
    let mut h = Harness::new(options);
    h.tools
        .set_query(TARGET, rule_result(TARGET, "go_binary", &[]));

    h.settle(Verb::Run).await;
    let created = h.commands.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].kind, CommandKind::Default);
    assert_eq!(created[0].spec.target, TARGET);
    assert_eq!(created[0].spec.args, vec!["--port=8080".to_string()]);
    assert_eq!(created[0].calls(), vec![CommandCall::Start]);
    assert!(h.ibazel.command_slot().get().is_some());

    for _ in 0..2 {
        h.source.write(h.file("pkg/app.txt"));
        h.step(Verb::Run).await;
        h.settle(Verb::Run).await;
    }

    assert_eq!(h.commands.created().len(), 1);
    assert_eq!(
        created[0].calls(),
        vec![
            CommandCall::Start,
            CommandCall::NotifyOfChanges,
            CommandCall::NotifyOfChanges
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn tagged_run_target_gets_notify_command() -> TestResult {
    init_tracing();
    let mut h = Harness::new(IbazelOptions::default());
    h.tools.set_query(
        TARGET,
        rule_result(TARGET, "sh_binary", &["manual", NOTIFY_CHANGES_TAG]),
    );
    let listener = RecordingListener::new("a");
    h.ibazel.add_listener(Box::new(listener.clone()));

    h.settle(Verb::Run).await;

    let created = h.commands.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].kind, CommandKind::Notify);
    assert!(
        listener
            .events()
            .contains(&ListenerEvent::TargetDecider(TARGET.to_string()))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn run_target_without_rule_falls_back_to_default_command() -> TestResult {
    init_tracing();
    let mut h = Harness::new(IbazelOptions::default());

    h.settle(Verb::Run).await;

    let created = h.commands.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].kind, CommandKind::Default);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn listeners_see_the_whole_cycle_in_order() -> TestResult {
    init_tracing();
    let mut h = Harness::new(IbazelOptions::default());
    h.tools
        .set_info(HashMap::from([("output_base".to_string(), "/nonexistent".to_string())]));

    let log = Arc::new(Mutex::new(Vec::new()));
    let first = RecordingListener::with_log("first", Arc::clone(&log));
    let second = RecordingListener::with_log("second", Arc::clone(&log));
    h.ibazel.add_listener(Box::new(first.clone()));
    h.ibazel.add_listener(Box::new(second.clone()));

    h.ibazel.initialize().await;
    h.settle(Verb::Build).await;
    h.source.write(h.file("pkg/app.txt"));
    h.step(Verb::Build).await;
    h.settle(Verb::Build).await;
    h.ibazel.cleanup();

    assert!(h.build.is_closed());
    assert!(h.source.is_closed());

    let names: Vec<String> = log.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
    for pair in names.chunks(2) {
        assert_eq!(pair, ["first".to_string(), "second".to_string()]);
    }

    let info = HashMap::from([("output_base".to_string(), "/nonexistent".to_string())]);
    let success = ListenerEvent::AfterCommand {
        verb: Verb::Build,
        success: true,
        output: String::new(),
    };
    assert_eq!(
        first.events(),
        vec![
            ListenerEvent::Initialize(info),
            ListenerEvent::BeforeCommand(Verb::Build),
            success.clone(),
            ListenerEvent::ChangeDetected {
                kind: ChangeKind::Source,
                path: h.file("pkg/app.txt"),
            },
            ListenerEvent::BeforeCommand(Verb::Build),
            success,
            ListenerEvent::Cleanup,
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_build_reaches_listeners_with_output() -> TestResult {
    init_tracing();
    let mut h = Harness::new(IbazelOptions::default());
    h.tools
        .set_action_result(Err("ERROR: compile failed".to_string()));
    let listener = RecordingListener::new("a");
    h.ibazel.add_listener(Box::new(listener.clone()));

    h.settle(Verb::Build).await;

    assert_eq!(h.ibazel.state(), State::Wait);
    assert_eq!(
        listener.events().last(),
        Some(&ListenerEvent::AfterCommand {
            verb: Verb::Build,
            success: false,
            output: "ERROR: compile failed".to_string(),
        })
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn hooks_run_around_actions() -> TestResult {
    init_tracing();
    let mut h = Harness::new(IbazelOptions::default());
    let hooks = HookCommands {
        before: Some(vec!["echo".to_string(), "before".to_string()]),
        after: Some(vec!["echo".to_string(), "after".to_string()]),
        after_success: Some(vec!["notify-send".to_string(), "ok".to_string()]),
    };
    h.ibazel.add_listener(Box::new(LifecycleHooks::new(
        hooks,
        Arc::new(h.workspace.clone()),
    )));

    h.settle(Verb::Build).await;
    assert_eq!(
        h.workspace.executed(),
        vec![
            vec!["echo".to_string(), "before".to_string()],
            vec!["echo".to_string(), "after".to_string()],
            vec!["notify-send".to_string(), "ok".to_string()],
        ]
    );

    h.tools.set_action_result(Err("broken".to_string()));
    h.source.write(h.file("pkg/app.txt"));
    h.step(Verb::Build).await;
    h.settle(Verb::Build).await;

    let executed = h.workspace.executed();
    assert_eq!(executed.len(), 5);
    assert_eq!(executed[4], vec!["echo".to_string(), "after".to_string()]);
    Ok(())
}
