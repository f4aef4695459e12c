// tests/run_commands.rs

#![cfg(unix)]

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use ibazel::command::{Command, CommandSpec, DefaultCommand, NotifyCommand};
use ibazel_test_utils::{FakeToolFactory, init_tracing};

type TestResult = Result<(), Box<dyn Error>>;

const WAIT: Duration = Duration::from_secs(5);
const TARGET: &str = "//pkg:server";

fn spec(tools: &FakeToolFactory, graceful_wait: Duration) -> CommandSpec {
    CommandSpec {
        target: TARGET.to_string(),
        startup_args: Vec::new(),
        bazel_args: vec!["--keep_going".to_string()],
        args: vec!["--flag".to_string()],
        graceful_wait,
        tools: Arc::new(tools.clone()),
    }
}

fn sleeper_tools() -> FakeToolFactory {
    let tools = FakeToolFactory::new();
    tools.set_run_script("#!/bin/sh\nexec sleep 30\n");
    tools
}

/// Poll `path` until it holds at least `lines` lines.
async fn read_lines(path: &Path, lines: usize) -> Vec<String> {
    timeout(WAIT, async {
        loop {
            if let Ok(text) = std::fs::read_to_string(path) {
                let found: Vec<String> = text.lines().map(str::to_string).collect();
                if found.len() >= lines {
                    return found;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("timed out waiting for child output")
}

#[tokio::test]
async fn default_command_builds_then_launches() -> TestResult {
    init_tracing();
    let tools = sleeper_tools();
    let command = DefaultCommand::new(spec(&tools, Duration::from_secs(5)));
    assert!(!command.is_subprocess_running());

    command.start().await?;
    assert!(command.is_subprocess_running());
    assert!(command.pid().is_some());

    let runs = tools.invocations_of("run");
    assert_eq!(runs.len(), 1);
    assert!(runs[0].call_args[0].starts_with("--script_path="));
    assert_eq!(runs[0].call_args[1], TARGET);
    assert_eq!(runs[0].tool_args, vec!["--keep_going".to_string()]);

    timeout(WAIT, command.terminate()).await?;
    assert!(!command.is_subprocess_running());
    Ok(())
}

#[tokio::test]
async fn failed_build_does_not_launch() -> TestResult {
    init_tracing();
    let tools = sleeper_tools();
    tools.set_run_result(Err("ERROR: missing dep".to_string()));
    let command = DefaultCommand::new(spec(&tools, Duration::from_secs(5)));

    let err = command.start().await.unwrap_err();
    assert_eq!(err.output(), "ERROR: missing dep");
    assert!(!command.is_subprocess_running());
    assert!(command.pid().is_none());
    Ok(())
}

#[tokio::test]
async fn changes_restart_the_default_command() -> TestResult {
    init_tracing();
    let tools = sleeper_tools();
    let command = DefaultCommand::new(spec(&tools, Duration::from_secs(5)));

    command.start().await?;
    let first = command.pid();

    timeout(WAIT, command.notify_of_changes()).await?;
    assert!(command.is_subprocess_running());
    assert_ne!(command.pid(), first);
    assert_eq!(tools.invocations_of("run").len(), 2);

    timeout(WAIT, command.terminate()).await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_terminates_signal_once() -> TestResult {
    init_tracing();
    let tools = sleeper_tools();
    let command = Arc::new(DefaultCommand::new(spec(&tools, Duration::from_secs(5))));
    command.start().await?;

    let a = {
        let command = Arc::clone(&command);
        tokio::spawn(async move { command.terminate().await })
    };
    let b = {
        let command = Arc::clone(&command);
        tokio::spawn(async move { command.terminate().await })
    };
    timeout(WAIT, a).await??;
    timeout(WAIT, b).await??;
    assert!(!command.is_subprocess_running());

    // Terminating an idle command is a no-op.
    timeout(WAIT, command.terminate()).await?;
    Ok(())
}

#[tokio::test]
async fn stubborn_child_is_killed_after_grace_period() -> TestResult {
    init_tracing();
    let tools = FakeToolFactory::new();
    tools.set_run_script("#!/bin/sh\ntrap '' TERM\nwhile :; do sleep 1; done\n");
    let command = DefaultCommand::new(spec(&tools, Duration::from_millis(300)));
    command.start().await?;
    // Let the shell install its trap.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    timeout(WAIT, command.terminate()).await?;
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(!command.is_subprocess_running());
    Ok(())
}

#[tokio::test]
async fn kill_stops_the_child_without_waiting() -> TestResult {
    init_tracing();
    let tools = sleeper_tools();
    let command = DefaultCommand::new(spec(&tools, Duration::from_secs(5)));
    command.start().await?;

    command.kill();
    timeout(WAIT, async {
        while command.is_subprocess_running() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await?;
    Ok(())
}

fn echo_stdin_script(log: &Path) -> String {
    format!(
        "#!/bin/sh\necho \"env $IBAZEL $IBAZEL_NOTIFY_CHANGES $1\" >> {log}\nwhile read line; do echo \"$line\" >> {log}; done\n",
        log = log.display()
    )
}

#[tokio::test]
async fn notify_command_reports_builds_on_stdin() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("child.log");
    let tools = FakeToolFactory::new();
    tools.set_run_script(echo_stdin_script(&log));
    let command = NotifyCommand::new(spec(&tools, Duration::from_secs(5)));

    command.start().await?;
    let pid = command.pid();
    assert_eq!(read_lines(&log, 1).await, vec!["env true y --flag"]);

    timeout(WAIT, command.notify_of_changes()).await?;
    let lines = read_lines(&log, 3).await;
    assert_eq!(lines[1], "IBAZEL_BUILD_STARTED");
    assert_eq!(lines[2], "IBAZEL_BUILD_COMPLETED SUCCESS");
    assert_eq!(command.pid(), pid);

    let builds = tools.invocations_of("build");
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].call_args, vec![TARGET.to_string()]);
    assert!(
        builds[0]
            .tool_args
            .contains(&"--remote_download_outputs=toplevel".to_string())
    );

    tools.set_action_result(Err("ERROR: syntax".to_string()));
    let output = timeout(WAIT, command.notify_of_changes()).await?;
    assert_eq!(output, "ERROR: syntax");
    let lines = read_lines(&log, 5).await;
    assert_eq!(lines[4], "IBAZEL_BUILD_COMPLETED FAILURE");
    assert_eq!(command.pid(), pid);
    assert!(command.is_subprocess_running());

    timeout(WAIT, command.terminate()).await?;
    assert!(!command.is_subprocess_running());
    Ok(())
}

#[tokio::test]
async fn notify_command_restarts_only_after_successful_build() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("child.log");
    let tools = FakeToolFactory::new();
    tools.set_run_script(echo_stdin_script(&log));
    let command = NotifyCommand::new(spec(&tools, Duration::from_secs(5)));

    command.start().await?;
    read_lines(&log, 1).await;
    command.kill();
    timeout(WAIT, async {
        while command.is_subprocess_running() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await?;

    tools.set_action_result(Err("ERROR: syntax".to_string()));
    timeout(WAIT, command.notify_of_changes()).await?;
    assert!(!command.is_subprocess_running());
    assert_eq!(tools.invocations_of("run").len(), 1);

    tools.set_action_result(Ok(String::new()));
    timeout(WAIT, command.notify_of_changes()).await?;
    assert!(command.is_subprocess_running());
    assert_eq!(tools.invocations_of("run").len(), 2);

    timeout(WAIT, command.terminate()).await?;
    Ok(())
}
