// tests/common/mod.rs

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use ibazel::engine::{Ibazel, IbazelOptions, State};
use ibazel::types::Verb;
use ibazel_test_utils::{
    FakeCommandFactory, FakeToolFactory, FakeWatcherHandle, FakeWorkspace, fake_watcher,
    source_result,
};

pub use ibazel_test_utils::init_tracing;

pub const TARGET: &str = "//pkg:app";

pub fn graph_query(targets: &[&str]) -> String {
    format!("buildfiles(deps(set({})))", targets.join(" "))
}

pub fn source_query(targets: &[&str]) -> String {
    format!("kind('source file', deps(set({})))", targets.join(" "))
}

/// A control loop over fakes and a temporary workspace holding
/// `pkg/BUILD`, `pkg/app.txt` and `pkg/other.txt`. The queries for
/// [`TARGET`] return `pkg/BUILD` and `pkg/app.txt`.
pub struct Harness {
    _dir: TempDir,
    pub root: PathBuf,
    pub tools: FakeToolFactory,
    pub commands: FakeCommandFactory,
    pub workspace: FakeWorkspace,
    pub build: FakeWatcherHandle,
    pub source: FakeWatcherHandle,
    pub ibazel: Ibazel,
    pub targets: Vec<String>,
}

impl Harness {
    pub fn new(options: IbazelOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir_all(root.join("pkg")).unwrap();
        for file in ["pkg/BUILD", "pkg/app.txt", "pkg/other.txt"] {
            std::fs::write(root.join(file), "").unwrap();
        }

        let tools = FakeToolFactory::new();
        tools.set_query(graph_query(&[TARGET]), source_result(&["//pkg:BUILD"]));
        tools.set_query(source_query(&[TARGET]), source_result(&["//pkg:app.txt"]));

        let commands = FakeCommandFactory::new();
        let workspace = FakeWorkspace::new(&root);
        let (build_watcher, build) = fake_watcher();
        let (source_watcher, source) = fake_watcher();

        let ibazel = Ibazel::new(
            options,
            Arc::new(tools.clone()),
            Arc::new(commands.clone()),
            Arc::new(workspace.clone()),
            Box::new(build_watcher),
            Box::new(source_watcher),
        );

        Self {
            _dir: dir,
            root,
            tools,
            commands,
            workspace,
            build,
            source,
            ibazel,
            targets: vec![TARGET.to_string()],
        }
    }

    pub fn file(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    pub async fn step(&mut self, verb: Verb) {
        let targets = self.targets.clone();
        self.ibazel.iteration(verb, &targets).await.unwrap();
    }

    /// Iterate until the loop sits in WAIT.
    pub async fn settle(&mut self, verb: Verb) {
        for _ in 0..8 {
            if self.ibazel.state() == State::Wait {
                return;
            }
            self.step(verb).await;
        }
        panic!("loop did not reach WAIT, stuck in {}", self.ibazel.state());
    }
}
