use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ibazel::errors::Result;
use ibazel::workspace::Workspace;

/// Fixed workspace root that records hook executions instead of running
/// them.
#[derive(Clone)]
pub struct FakeWorkspace {
    root: PathBuf,
    executed: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FakeWorkspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Program followed by its arguments, per call.
    pub fn executed(&self) -> Vec<Vec<String>> {
        self.executed.lock().unwrap().clone()
    }
}

impl Workspace for FakeWorkspace {
    fn find_workspace(&self) -> Result<PathBuf> {
        Ok(self.root.clone())
    }

    fn execute_command(&self, program: &str, args: &[String]) {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        self.executed.lock().unwrap().push(call);
    }
}
