// src/bazel/mod.rs

//! Contract for the external build tool.
//!
//! The control loop never shells out itself; it asks a [`BuildToolFactory`]
//! for a fresh [`BuildTool`] per invocation (so per-call argument tweaks such
//! as `--test_output=streamed` never leak into later calls) and drives it
//! through this trait. [`cli::BazelCli`] is the production implementation;
//! tests plug in scripted fakes.

use std::collections::HashMap;

use crate::errors::Result;
use crate::types::BoxFuture;

pub mod cli;
pub mod labels;

pub use cli::{BazelCli, BazelCliFactory};

/// Tag marking a `run` target that wants change notifications on stdin.
pub const NOTIFY_CHANGES_TAG: &str = "ibazel_notify_changes";

/// A rule node from a query result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rule {
    pub name: String,
    pub rule_class: String,
    pub tags: Vec<String>,
}

impl Rule {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    SourceFile { name: String },
    Rule(Rule),
    /// Generated files, package groups and anything else we don't watch.
    Other { name: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub targets: Vec<Target>,
}

impl QueryResult {
    pub fn source_files(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().filter_map(|t| match t {
            Target::SourceFile { name } => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn first_rule(&self) -> Option<&Rule> {
        self.targets.iter().find_map(|t| match t {
            Target::Rule(rule) => Some(rule),
            _ => None,
        })
    }
}

/// One configured invocation context of the build tool.
///
/// Failing `build`/`test`/`coverage`/`run` calls return
/// [`IbazelError::BuildFailed`](crate::errors::IbazelError::BuildFailed)
/// carrying the captured output.
pub trait BuildTool: Send {
    fn args(&self) -> &[String];
    fn set_arguments(&mut self, args: Vec<String>);
    fn set_startup_args(&mut self, args: Vec<String>);

    /// Echo the tool's stdout/stderr to the terminal while capturing it.
    fn write_to_terminal(&mut self, enabled: bool);

    fn info(&mut self) -> BoxFuture<'_, Result<HashMap<String, String>>>;
    fn query(&mut self, args: Vec<String>) -> BoxFuture<'_, Result<QueryResult>>;
    fn build(&mut self, targets: Vec<String>) -> BoxFuture<'_, Result<String>>;
    fn test(&mut self, targets: Vec<String>) -> BoxFuture<'_, Result<String>>;
    fn coverage(&mut self, targets: Vec<String>) -> BoxFuture<'_, Result<String>>;
    fn run(&mut self, args: Vec<String>) -> BoxFuture<'_, Result<String>>;

    /// Abort the most recent outstanding invocation from the same factory.
    fn cancel(&mut self);
}

pub trait BuildToolFactory: Send + Sync {
    fn create(&self) -> Box<dyn BuildTool>;
}

/// Create a tool with the given startup and command arguments applied.
pub fn new_tool(
    factory: &dyn BuildToolFactory,
    startup_args: &[String],
    args: &[String],
) -> Box<dyn BuildTool> {
    let mut tool = factory.create();
    tool.set_startup_args(startup_args.to_vec());
    tool.set_arguments(args.to_vec());
    tool
}
