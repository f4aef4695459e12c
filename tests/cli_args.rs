// tests/cli_args.rs

use clap::Parser;

use ibazel::cli::{
    CliArgs, ParsedArgs, apply_default_bazel_args, is_overrideable_bazel_flag,
    is_overrideable_startup_flag, parse_args,
};
use ibazel::types::{Verb, WatcherBackend};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn arguments_are_split_by_role() {
    let parsed = parse_args(&[
        "--bazelrc=/tmp/rc",
        "//pkg:app",
        "--config=ci",
        "--test_output=errors",
        "//other/...",
        "--//flags:feature=on",
        "--",
        "--port=8080",
        "//not/a/target",
    ]);
    assert_eq!(
        parsed,
        ParsedArgs {
            targets: strings(&["//pkg:app", "//other/..."]),
            startup_args: strings(&["--bazelrc=/tmp/rc"]),
            bazel_args: strings(&["--config=ci", "--test_output=errors", "--//flags:feature=on"]),
            run_args: strings(&["--port=8080", "//not/a/target"]),
        }
    );
}

#[test]
fn flags_match_by_prefix() {
    assert!(is_overrideable_bazel_flag("-copt"));
    assert!(is_overrideable_bazel_flag("--keep_going"));
    assert!(is_overrideable_bazel_flag("--override_repository=foo=/src/foo"));
    assert!(is_overrideable_bazel_flag("--no//flags:feature"));
    assert!(is_overrideable_startup_flag("--output_base=/tmp/ob"));
    assert!(is_overrideable_startup_flag("--nohome_rc"));

    assert!(!is_overrideable_bazel_flag("--verbose_failures"));
    assert!(!is_overrideable_startup_flag("--config=ci"));
}

#[test]
fn unknown_flags_become_targets() {
    // The build tool reports these; we only forward what we recognize.
    let parsed = parse_args(&["--verbose_failures", "//pkg:app"]);
    assert_eq!(parsed.targets, strings(&["--verbose_failures", "//pkg:app"]));
    assert!(parsed.bazel_args.is_empty());
}

#[test]
fn double_dash_only_splits_once() {
    let parsed = parse_args(&["//pkg:app", "--", "a", "--", "b"]);
    assert_eq!(parsed.targets, strings(&["//pkg:app"]));
    assert_eq!(parsed.run_args, strings(&["a", "--", "b"]));

    let parsed = parse_args(&["//pkg:app", "--"]);
    assert!(parsed.run_args.is_empty());
}

#[test]
fn isatty_is_added_unless_present() {
    assert_eq!(
        apply_default_bazel_args(strings(&["--keep_going"]), true),
        strings(&["--keep_going", "--isatty=1"])
    );
    assert_eq!(
        apply_default_bazel_args(Vec::new(), false),
        strings(&["--isatty=0"])
    );
    assert_eq!(
        apply_default_bazel_args(strings(&["--isatty=0"]), true),
        strings(&["--isatty=0"])
    );
}

#[test]
fn command_line_keeps_hyphen_arguments_after_the_verb() {
    let args = CliArgs::try_parse_from([
        "ibazel",
        "--debounce=50ms",
        "--watcher",
        "recursive",
        "run",
        "//pkg:server",
        "--config=dev",
        "--",
        "--port=8080",
    ])
    .unwrap();

    assert_eq!(args.verb, Verb::Run);
    assert_eq!(args.debounce.as_deref(), Some("50ms"));
    assert_eq!(args.watcher, Some(WatcherBackend::Recursive));
    assert_eq!(
        args.args,
        strings(&["//pkg:server", "--config=dev", "--", "--port=8080"])
    );

    let parsed = parse_args(&args.args);
    assert_eq!(parsed.targets, strings(&["//pkg:server"]));
    assert_eq!(parsed.run_args, strings(&["--port=8080"]));
}

#[test]
fn verb_and_target_are_required() {
    assert!(CliArgs::try_parse_from(["ibazel"]).is_err());
    assert!(CliArgs::try_parse_from(["ibazel", "test"]).is_err());
    assert!(CliArgs::try_parse_from(["ibazel", "deploy", "//pkg:app"]).is_err());

    let args = CliArgs::try_parse_from(["ibazel", "coverage", "//pkg:all_tests"]).unwrap();
    assert_eq!(args.verb, Verb::Coverage);
}
