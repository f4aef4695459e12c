pub mod fake_command;
pub mod fake_tool;
pub mod fake_watcher;
pub mod fake_workspace;
pub mod listeners;

pub use fake_command::{CommandCall, CommandKind, FakeCommand, FakeCommandFactory};
pub use fake_tool::{FakeToolFactory, Invocation, rule_result, source_result};
pub use fake_watcher::{FakeWatcher, FakeWatcherHandle, fake_watcher};
pub use fake_workspace::FakeWorkspace;
pub use listeners::{ListenerEvent, RecordingListener};

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}
