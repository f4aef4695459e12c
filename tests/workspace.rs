// tests/workspace.rs

use std::error::Error;
use std::fs;

use ibazel::errors::IbazelError;
use ibazel::workspace::{MainWorkspace, SENTINELS, Workspace, find_workspace_from};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn every_sentinel_marks_a_workspace() -> TestResult {
    for sentinel in SENTINELS {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested)?;
        fs::write(dir.path().join(sentinel), "")?;

        assert_eq!(find_workspace_from(&nested)?, dir.path());
        assert_eq!(find_workspace_from(dir.path())?, dir.path());
    }
    Ok(())
}

#[test]
fn closest_workspace_wins() -> TestResult {
    let dir = tempfile::tempdir()?;
    let inner = dir.path().join("third_party").join("lib");
    fs::create_dir_all(inner.join("src"))?;
    fs::write(dir.path().join("MODULE.bazel"), "")?;
    fs::write(inner.join("WORKSPACE"), "")?;

    assert_eq!(find_workspace_from(&inner.join("src"))?, inner);
    Ok(())
}

#[test]
fn sentinel_directories_do_not_count() -> TestResult {
    let dir = tempfile::tempdir()?;
    let outer = dir.path().join("outer");
    let inner = outer.join("inner");
    fs::create_dir_all(inner.join("WORKSPACE"))?;
    fs::write(outer.join("WORKSPACE.bazel"), "")?;

    assert_eq!(find_workspace_from(&inner)?, outer);
    Ok(())
}

#[test]
fn lowercase_sentinel_does_not_count() -> TestResult {
    let dir = tempfile::tempdir()?;
    let outer = dir.path().join("outer");
    let inner = outer.join("inner");
    fs::create_dir_all(&inner)?;
    fs::write(inner.join("workspace"), "")?;
    fs::write(outer.join("MODULE.bazel"), "")?;

    assert_eq!(find_workspace_from(&inner)?, outer);
    Ok(())
}

#[test]
fn main_workspace_starts_from_its_directory() -> TestResult {
    let dir = tempfile::tempdir()?;
    let pkg = dir.path().join("pkg");
    fs::create_dir_all(&pkg)?;
    fs::write(dir.path().join("WORKSPACE"), "")?;

    assert_eq!(MainWorkspace::from_dir(&pkg).find_workspace()?, dir.path());
    Ok(())
}

#[test]
fn no_workspace_is_an_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    // The tempdir's own ancestors must not hold a workspace for this check.
    if SENTINELS
        .iter()
        .any(|s| dir.path().ancestors().any(|a| a.join(s).is_file()))
    {
        return Ok(());
    }
    assert!(matches!(
        find_workspace_from(dir.path()),
        Err(IbazelError::Workspace(_))
    ));
    Ok(())
}

#[cfg(unix)]
#[test]
fn hook_commands_run_in_the_workspace_root() -> TestResult {
    let dir = tempfile::tempdir()?;
    let pkg = dir.path().join("pkg");
    fs::create_dir_all(&pkg)?;
    fs::write(dir.path().join("MODULE.bazel"), "")?;

    let workspace = MainWorkspace::from_dir(&pkg);
    workspace.execute_command(
        "sh",
        &[
            "-c".to_string(),
            "pwd > where.txt; echo $IBAZEL >> where.txt".to_string(),
        ],
    );

    let out = fs::read_to_string(dir.path().join("where.txt"))?;
    let mut lines = out.lines();
    assert_eq!(
        fs::canonicalize(lines.next().ok_or("no pwd")?)?,
        fs::canonicalize(dir.path())?
    );
    assert_eq!(lines.next(), Some("true"));

    // Failures are only logged.
    workspace.execute_command("/nonexistent/ibazel-hook", &[]);
    Ok(())
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hooks_inside_the_runtime_leave_other_tasks_running() -> TestResult {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("MODULE.bazel"), "")?;
    let workspace = MainWorkspace::from_dir(dir.path());

    let ticks = Arc::new(AtomicU32::new(0));
    let ticker = tokio::spawn({
        let ticks = Arc::clone(&ticks);
        async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    tokio::spawn(async move {
        workspace.execute_command(
            "sh",
            &["-c".to_string(), "sleep 0.5; echo done > hook.txt".to_string()],
        );
    })
    .await?;
    ticker.abort();

    assert!(ticks.load(Ordering::SeqCst) > 5);
    assert_eq!(fs::read_to_string(dir.path().join("hook.txt"))?.trim(), "done");
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn hooks_run_on_a_current_thread_runtime() -> TestResult {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("WORKSPACE"), "")?;

    MainWorkspace::from_dir(dir.path()).execute_command(
        "sh",
        &["-c".to_string(), "echo ok > hook.txt".to_string()],
    );

    assert_eq!(fs::read_to_string(dir.path().join("hook.txt"))?.trim(), "ok");
    Ok(())
}
