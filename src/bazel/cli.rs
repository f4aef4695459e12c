// src/bazel/cli.rs

//! Subprocess-backed [`BuildTool`] talking to a real `bazel`/`bazelisk`.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BuildTool, BuildToolFactory, QueryResult, Rule, Target};
use crate::errors::{IbazelError, Result};
use crate::types::{BoxFuture, Verb};

/// Factory for [`BazelCli`] tools sharing one cancellation signal.
#[derive(Debug, Clone)]
pub struct BazelCliFactory {
    binary: PathBuf,
    cancel: Arc<Notify>,
}

impl BazelCliFactory {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cancel: Arc::new(Notify::new()),
        }
    }

    /// Use `binary` if given, else `bazelisk` or `bazel` from `PATH`.
    pub fn discover(binary: Option<PathBuf>) -> Self {
        let binary = binary
            .or_else(|| which::which("bazelisk").ok())
            .or_else(|| which::which("bazel").ok())
            .unwrap_or_else(|| PathBuf::from("bazel"));
        info!(binary = %binary.display(), "using build tool");
        Self::new(binary)
    }

    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }
}

impl BuildToolFactory for BazelCliFactory {
    fn create(&self) -> Box<dyn BuildTool> {
        Box::new(BazelCli {
            binary: self.binary.clone(),
            startup_args: Vec::new(),
            args: Vec::new(),
            echo: false,
            cancel: Arc::clone(&self.cancel),
        })
    }
}

#[derive(Debug)]
pub struct BazelCli {
    binary: PathBuf,
    startup_args: Vec<String>,
    args: Vec<String>,
    echo: bool,
    cancel: Arc<Notify>,
}

struct Invocation {
    success: bool,
    stdout: String,
    stderr: String,
}

impl BazelCli {
    async fn invoke(&self, verb: &str, args: Vec<String>, echo: bool) -> Result<Invocation> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.startup_args)
            .arg(verb)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(binary = %self.binary.display(), verb, ?args, "invoking build tool");

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {} {}", self.binary.display(), verb))?;

        let stdout = child.stdout.take().map(|s| spawn_collector(s, echo, false));
        let stderr = child.stderr.take().map(|s| spawn_collector(s, echo, true));

        // Registered before we start waiting, so a cancel issued while the
        // child runs is never missed.
        let cancelled = self.cancel.notified();

        let status = tokio::select! {
            status = child.wait() => Some(status.context("waiting for build tool")?),
            _ = cancelled => {
                info!(verb, "cancelling outstanding build tool invocation");
                if let Err(err) = child.kill().await {
                    warn!(error = %err, "failed to kill cancelled build tool process");
                }
                None
            }
        };

        let stdout = join_collector(stdout).await;
        let stderr = join_collector(stderr).await;

        Ok(Invocation {
            success: status.map(|s| s.success()).unwrap_or(false),
            stdout,
            stderr,
        })
    }

    async fn action(&self, verb: Verb, targets: Vec<String>) -> Result<String> {
        let mut args = self.args.clone();
        args.extend(targets);
        let out = self.invoke(verb.as_str(), args, self.echo).await?;
        let output = out.stderr + &out.stdout;
        if out.success {
            Ok(output)
        } else {
            Err(IbazelError::BuildFailed { verb, output })
        }
    }
}

impl BuildTool for BazelCli {
    fn args(&self) -> &[String] {
        &self.args
    }

    fn set_arguments(&mut self, args: Vec<String>) {
        self.args = args;
    }

    fn set_startup_args(&mut self, args: Vec<String>) {
        self.startup_args = args;
    }

    fn write_to_terminal(&mut self, enabled: bool) {
        self.echo = enabled;
    }

    fn info(&mut self) -> BoxFuture<'_, Result<HashMap<String, String>>> {
        Box::pin(async move {
            let out = self.invoke("info", Vec::new(), false).await?;
            if !out.success {
                return Err(IbazelError::Query(format!(
                    "bazel info failed: {}",
                    out.stderr.trim()
                )));
            }
            Ok(parse_info(&out.stdout))
        })
    }

    fn query(&mut self, args: Vec<String>) -> BoxFuture<'_, Result<QueryResult>> {
        Box::pin(async move {
            let mut full = vec!["--output=streamed_jsonproto".to_string()];
            full.extend(args);
            let out = self.invoke("query", full, false).await?;
            if !out.success {
                return Err(IbazelError::Query(out.stderr.trim().to_string()));
            }
            parse_streamed_query(&out.stdout)
        })
    }

    fn build(&mut self, targets: Vec<String>) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.action(Verb::Build, targets))
    }

    fn test(&mut self, targets: Vec<String>) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.action(Verb::Test, targets))
    }

    fn coverage(&mut self, targets: Vec<String>) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.action(Verb::Coverage, targets))
    }

    fn run(&mut self, args: Vec<String>) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.action(Verb::Run, args))
    }

    fn cancel(&mut self) {
        self.cancel.notify_waiters();
    }
}

fn spawn_collector<R>(reader: R, echo: bool, to_stderr: bool) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut collected = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            if echo {
                if to_stderr {
                    let _ = writeln!(std::io::stderr(), "{line}");
                } else {
                    let _ = writeln!(std::io::stdout(), "{line}");
                }
            }
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}

async fn join_collector(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(h) => h.await.unwrap_or_default(),
        None => String::new(),
    }
}

/// Parse `bazel info` output (`key: value` per line).
pub fn parse_info(stdout: &str) -> HashMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| line.split_once(": "))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTarget {
    #[serde(rename = "type")]
    kind: String,
    rule: Option<RawRule>,
    source_file: Option<RawNamed>,
    generated_file: Option<RawNamed>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRule {
    name: String,
    #[serde(default)]
    rule_class: String,
    #[serde(default)]
    attribute: Vec<RawAttribute>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAttribute {
    name: String,
    #[serde(default)]
    string_list_value: Vec<String>,
}

#[derive(Deserialize)]
struct RawNamed {
    name: String,
}

/// Decode `--output=streamed_jsonproto` (one JSON `Target` per line).
pub fn parse_streamed_query(stdout: &str) -> Result<QueryResult> {
    let mut targets = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let raw: RawTarget = serde_json::from_str(line)
            .map_err(|e| IbazelError::Query(format!("malformed query output: {e}")))?;
        targets.push(convert_target(raw));
    }
    Ok(QueryResult { targets })
}

fn convert_target(raw: RawTarget) -> Target {
    match (raw.kind.as_str(), raw.rule, raw.source_file) {
        ("SOURCE_FILE", _, Some(src)) => Target::SourceFile { name: src.name },
        ("RULE", Some(rule), _) => {
            let tags = rule
                .attribute
                .into_iter()
                .find(|a| a.name == "tags")
                .map(|a| a.string_list_value)
                .unwrap_or_default();
            Target::Rule(Rule {
                name: rule.name,
                rule_class: rule.rule_class,
                tags,
            })
        }
        _ => Target::Other {
            name: raw.generated_file.map(|g| g.name).unwrap_or_default(),
        },
    }
}
