// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! ibazel's own flags come before the verb. Everything after the verb is
//! split by [`parse_args`] into targets, pass-through build tool flags and
//! run arguments.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::{Verb, WatcherBackend};

/// Startup flags forwarded to the build tool (prefix match).
pub const OVERRIDEABLE_STARTUP_FLAGS: &[&str] = &[
    "--bazelrc",
    "--bazelrc=",
    "--nobazelrc",
    "--home_rc",
    "--nohome_rc",
    "--output_base",
];

/// Command flags forwarded to the build tool (prefix match).
pub const OVERRIDEABLE_BAZEL_FLAGS: &[&str] = &[
    "--action_env",
    "--announce_rc",
    "--aspects",
    "--bes_backend=",
    "--bes_keywords=",
    "--build_tag_filters=",
    "--build_tests_only",
    "--check_visibility=",
    "--compilation_mode",
    "--compile_one_dependency",
    "--config=",
    "--copt=",
    "--curses=",
    "--cxxopt",
    "-c",
    "--define=",
    "--dynamic_mode=",
    "--enable_bzlmod=",
    "--enable_bzlmod",
    "--enable_workspace",
    "--enable_workspace=",
    "--features=",
    "--flaky_test_attempts=",
    "--host_jvmopt",
    "--isatty=",
    "--jvmopt",
    "--keep_going",
    "-k",
    "--nocache_test_results",
    "--noenable_bzlmod",
    "--noenable_workspace",
    "--nostamp",
    "--output_groups=",
    "--override_repository=",
    "--platforms",
    "--remote_cache=",
    "--repo_env",
    "--runs_per_test=",
    "--run_under=",
    "--sandbox_add_mount_pair=",
    "--show_result=",
    "--stamp",
    "--strategy=",
    "--target_pattern_file=",
    "--test_arg=",
    "--test_env=",
    "--test_filter=",
    "--test_lang_filters=",
    "--test_output=",
    "--test_tag_filters=",
    "--test_timeout=",
    "--test_sharding_strategy=",
    "--test_summary=",
    // Starlark build settings.
    "--//",
    "--no//",
];

const AFTER_HELP: &str = "\
Examples:
  ibazel test //path/to/my/testing:target
  ibazel test //path/to/my/testing/targets/...
  ibazel run //path/to/my/runnable:target -- --arguments --for_your=binary
  ibazel build //path/to/my/buildable:target

Build tool flags in ARGS are forwarded when they start with one of the
supported startup flags (--bazelrc, --nobazelrc, --home_rc, --nohome_rc,
--output_base) or command flags (--config=, --define=, --test_output=,
--override_repository=, --//..., and others). Anything after `--` is passed
to the binary of `ibazel run`.";

/// Command-line arguments for `ibazel`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ibazel",
    version,
    about = "A file watcher for Bazel. Rebuilds, retests or reruns targets when their sources change.",
    long_about = None,
    after_help = AFTER_HELP
)]
pub struct CliArgs {
    /// Quiet period after the last change before acting (e.g. `100ms`).
    #[arg(long, value_name = "DURATION")]
    pub debounce: Option<String>,

    /// How long a `run` target gets to exit after SIGTERM before SIGKILL.
    #[arg(long, value_name = "DURATION")]
    pub graceful_termination_wait: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `IBAZEL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Append logs to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    pub log_to_file: Option<PathBuf>,

    /// Config file to use instead of `.ibazel.toml` in the workspace root.
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// File watcher backend.
    #[arg(long, value_enum, value_name = "BACKEND")]
    pub watcher: Option<WatcherBackend>,

    /// Build tool binary. Defaults to `bazelisk` or `bazel` on `PATH`.
    #[arg(long, value_name = "PATH")]
    pub bazel_path: Option<PathBuf>,

    /// Shell command run before every action.
    #[arg(long, value_name = "CMD")]
    pub run_command_before: Option<String>,

    /// Shell command run after every action.
    #[arg(long, value_name = "CMD")]
    pub run_command_after: Option<String>,

    /// Shell command run after every successful action.
    #[arg(long, value_name = "CMD")]
    pub run_command_after_success: Option<String>,

    #[arg(value_enum, value_name = "COMMAND")]
    pub verb: Verb,

    /// Targets, forwarded build tool flags, then `--` and run arguments.
    #[arg(
        value_name = "ARGS",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub args: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Trailing arguments split by role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    pub targets: Vec<String>,
    pub startup_args: Vec<String>,
    pub bazel_args: Vec<String>,
    /// Everything after `--`.
    pub run_args: Vec<String>,
}

fn is_overrideable(arg: &str, allowed: &[&str]) -> bool {
    allowed.iter().any(|prefix| arg.starts_with(prefix))
}

pub fn is_overrideable_startup_flag(arg: &str) -> bool {
    is_overrideable(arg, OVERRIDEABLE_STARTUP_FLAGS)
}

pub fn is_overrideable_bazel_flag(arg: &str) -> bool {
    is_overrideable(arg, OVERRIDEABLE_BAZEL_FLAGS)
}

/// Split the trailing arguments. Tokens that are neither forwarded flags
/// nor after `--` are targets.
pub fn parse_args<S: AsRef<str>>(input: &[S]) -> ParsedArgs {
    let mut parsed = ParsedArgs::default();
    let mut after_double_dash = false;

    for arg in input.iter().map(AsRef::as_ref) {
        if after_double_dash {
            parsed.run_args.push(arg.to_string());
        } else if arg == "--" {
            after_double_dash = true;
        } else if is_overrideable_startup_flag(arg) {
            parsed.startup_args.push(arg.to_string());
        } else if is_overrideable_bazel_flag(arg) {
            parsed.bazel_args.push(arg.to_string());
        } else {
            parsed.targets.push(arg.to_string());
        }
    }

    parsed
}

/// Append `--isatty=` matching `is_terminal` unless the user set it.
pub fn apply_default_bazel_args(mut bazel_args: Vec<String>, is_terminal: bool) -> Vec<String> {
    if bazel_args.iter().any(|a| a.starts_with("--isatty=")) {
        return bazel_args;
    }
    bazel_args.push(format!("--isatty={}", if is_terminal { 1 } else { 0 }));
    bazel_args
}

/// Whether stderr, where the build tool draws progress, is a terminal.
pub fn stderr_is_terminal() -> bool {
    std::io::stderr().is_terminal()
}
