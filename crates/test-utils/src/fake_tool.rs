use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ibazel::bazel::{BuildTool, BuildToolFactory, QueryResult, Rule, Target};
use ibazel::errors::{IbazelError, Result};
use ibazel::types::{BoxFuture, Verb};

/// One recorded call on a [`FakeBuildTool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// `info`, `query`, `build`, `test`, `coverage` or `run`.
    pub verb: String,
    /// Command arguments configured on the tool at call time.
    pub tool_args: Vec<String>,
    pub startup_args: Vec<String>,
    /// Arguments passed to the call itself (targets, query, script path).
    pub call_args: Vec<String>,
}

#[derive(Default)]
struct FakeToolState {
    info: HashMap<String, String>,
    queries: HashMap<String, std::result::Result<QueryResult, String>>,
    action_result: Option<std::result::Result<String, String>>,
    run_result: Option<std::result::Result<String, String>>,
    run_script: Option<String>,
    invocations: Vec<Invocation>,
    cancels: usize,
}

/// Scripted build tool shared between the loop under test and assertions.
///
/// - queries are keyed by the query expression (first argument)
/// - unscripted queries return an empty result
/// - `build`/`test`/`coverage` succeed with empty output unless scripted
/// - `run` writes the configured script to the `--script_path=` it is given
#[derive(Clone, Default)]
pub struct FakeToolFactory {
    state: Arc<Mutex<FakeToolState>>,
}

impl FakeToolFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_info(&self, info: HashMap<String, String>) {
        self.state.lock().unwrap().info = info;
    }

    pub fn set_query(&self, query: impl Into<String>, result: QueryResult) {
        self.state
            .lock()
            .unwrap()
            .queries
            .insert(query.into(), Ok(result));
    }

    pub fn fail_query(&self, query: impl Into<String>, message: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .queries
            .insert(query.into(), Err(message.into()));
    }

    /// Outcome of `build`, `test` and `coverage`. `Err` carries the output.
    pub fn set_action_result(&self, result: std::result::Result<String, String>) {
        self.state.lock().unwrap().action_result = Some(result);
    }

    /// Outcome of `run`. `Err` carries the output.
    pub fn set_run_result(&self, result: std::result::Result<String, String>) {
        self.state.lock().unwrap().run_result = Some(result);
    }

    /// Body of the script `run` writes (made executable on Unix).
    pub fn set_run_script(&self, body: impl Into<String>) {
        self.state.lock().unwrap().run_script = Some(body.into());
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().invocations.clone()
    }

    pub fn invocations_of(&self, verb: &str) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|i| i.verb == verb)
            .collect()
    }

    pub fn cancel_count(&self) -> usize {
        self.state.lock().unwrap().cancels
    }
}

impl BuildToolFactory for FakeToolFactory {
    fn create(&self) -> Box<dyn BuildTool> {
        Box::new(FakeBuildTool {
            state: Arc::clone(&self.state),
            startup_args: Vec::new(),
            args: Vec::new(),
        })
    }
}

pub struct FakeBuildTool {
    state: Arc<Mutex<FakeToolState>>,
    startup_args: Vec<String>,
    args: Vec<String>,
}

impl FakeBuildTool {
    fn record(&self, verb: &str, call_args: &[String]) {
        self.state.lock().unwrap().invocations.push(Invocation {
            verb: verb.to_string(),
            tool_args: self.args.clone(),
            startup_args: self.startup_args.clone(),
            call_args: call_args.to_vec(),
        });
    }

    fn action(&self, verb: Verb, targets: Vec<String>) -> BoxFuture<'_, Result<String>> {
        self.record(verb.as_str(), &targets);
        let outcome = self
            .state
            .lock()
            .unwrap()
            .action_result
            .clone()
            .unwrap_or_else(|| Ok(String::new()));
        Box::pin(std::future::ready(
            outcome.map_err(|output| IbazelError::BuildFailed { verb, output }),
        ))
    }
}

impl BuildTool for FakeBuildTool {
    fn args(&self) -> &[String] {
        &self.args
    }

    fn set_arguments(&mut self, args: Vec<String>) {
        self.args = args;
    }

    fn set_startup_args(&mut self, args: Vec<String>) {
        self.startup_args = args;
    }

    fn write_to_terminal(&mut self, _enabled: bool) {}

    fn info(&mut self) -> BoxFuture<'_, Result<HashMap<String, String>>> {
        self.record("info", &[]);
        let info = self.state.lock().unwrap().info.clone();
        Box::pin(std::future::ready(Ok(info)))
    }

    fn query(&mut self, args: Vec<String>) -> BoxFuture<'_, Result<QueryResult>> {
        self.record("query", &args);
        let key = args.first().cloned().unwrap_or_default();
        let outcome = self
            .state
            .lock()
            .unwrap()
            .queries
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Ok(QueryResult::default()));
        Box::pin(std::future::ready(outcome.map_err(IbazelError::Query)))
    }

    fn build(&mut self, targets: Vec<String>) -> BoxFuture<'_, Result<String>> {
        self.action(Verb::Build, targets)
    }

    fn test(&mut self, targets: Vec<String>) -> BoxFuture<'_, Result<String>> {
        self.action(Verb::Test, targets)
    }

    fn coverage(&mut self, targets: Vec<String>) -> BoxFuture<'_, Result<String>> {
        self.action(Verb::Coverage, targets)
    }

    fn run(&mut self, args: Vec<String>) -> BoxFuture<'_, Result<String>> {
        self.record("run", &args);
        let (outcome, script) = {
            let state = self.state.lock().unwrap();
            (
                state.run_result.clone().unwrap_or_else(|| Ok(String::new())),
                state.run_script.clone(),
            )
        };

        if outcome.is_ok() {
            let path = args
                .iter()
                .find_map(|a| a.strip_prefix("--script_path="));
            if let (Some(path), Some(body)) = (path, script) {
                write_script(path, &body);
            }
        }

        Box::pin(std::future::ready(outcome.map_err(|output| {
            IbazelError::BuildFailed {
                verb: Verb::Run,
                output,
            }
        })))
    }

    fn cancel(&mut self) {
        self.state.lock().unwrap().cancels += 1;
    }
}

fn write_script(path: &str, body: &str) {
    std::fs::write(path, body).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}

/// A query result listing `labels` as source files.
pub fn source_result(labels: &[&str]) -> QueryResult {
    QueryResult {
        targets: labels
            .iter()
            .map(|l| Target::SourceFile {
                name: l.to_string(),
            })
            .collect(),
    }
}

/// A query result holding a single rule.
pub fn rule_result(name: &str, rule_class: &str, tags: &[&str]) -> QueryResult {
    QueryResult {
        targets: vec![Target::Rule(Rule {
            name: name.to_string(),
            rule_class: rule_class.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        })],
    }
}
