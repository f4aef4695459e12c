use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ibazel::bazel::Rule;
use ibazel::lifecycle::Lifecycle;
use ibazel::types::{ChangeKind, Verb};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Initialize(HashMap<String, String>),
    TargetDecider(String),
    ChangeDetected { kind: ChangeKind, path: PathBuf },
    BeforeCommand(Verb),
    AfterCommand { verb: Verb, success: bool, output: String },
    Cleanup,
}

/// Appends `(name, event)` to a log that may be shared between several
/// listeners, so tests can check fan-out order.
#[derive(Clone)]
pub struct RecordingListener {
    name: String,
    log: Arc<Mutex<Vec<(String, ListenerEvent)>>>,
}

impl RecordingListener {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_log(name, Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_log(name: impl Into<String>, log: Arc<Mutex<Vec<(String, ListenerEvent)>>>) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }

    pub fn log(&self) -> Arc<Mutex<Vec<(String, ListenerEvent)>>> {
        Arc::clone(&self.log)
    }

    /// This listener's events only.
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| *name == self.name)
            .map(|(_, ev)| ev.clone())
            .collect()
    }

    fn push(&self, event: ListenerEvent) {
        self.log.lock().unwrap().push((self.name.clone(), event));
    }
}

impl Lifecycle for RecordingListener {
    fn initialize(&mut self, info: &HashMap<String, String>) {
        self.push(ListenerEvent::Initialize(info.clone()));
    }

    fn target_decider(&mut self, rule: &Rule) {
        self.push(ListenerEvent::TargetDecider(rule.name.clone()));
    }

    fn change_detected(&mut self, _targets: &[String], kind: ChangeKind, path: &Path) {
        self.push(ListenerEvent::ChangeDetected {
            kind,
            path: path.to_path_buf(),
        });
    }

    fn before_command(&mut self, _targets: &[String], verb: Verb) {
        self.push(ListenerEvent::BeforeCommand(verb));
    }

    fn after_command(&mut self, _targets: &[String], verb: Verb, success: bool, output: &str) {
        self.push(ListenerEvent::AfterCommand {
            verb,
            success,
            output: output.to_string(),
        });
    }

    fn cleanup(&mut self) {
        self.push(ListenerEvent::Cleanup);
    }
}
