use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use ibazel::errors::Result;
use ibazel::fswatcher::{FileWatcher, Op, WatchEvent};

/// Watcher whose events are injected by the test through a
/// [`FakeWatcherHandle`]. `update_all` only records the requested paths.
pub struct FakeWatcher {
    rx: UnboundedReceiver<WatchEvent>,
    updates: Arc<Mutex<Vec<Vec<PathBuf>>>>,
    closed: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct FakeWatcherHandle {
    tx: UnboundedSender<WatchEvent>,
    updates: Arc<Mutex<Vec<Vec<PathBuf>>>>,
    closed: Arc<AtomicBool>,
}

pub fn fake_watcher() -> (FakeWatcher, FakeWatcherHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let updates = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    (
        FakeWatcher {
            rx,
            updates: Arc::clone(&updates),
            closed: Arc::clone(&closed),
        },
        FakeWatcherHandle {
            tx,
            updates,
            closed,
        },
    )
}

impl FakeWatcherHandle {
    pub fn send(&self, path: impl Into<PathBuf>, op: Op) {
        self.tx.send(WatchEvent::new(path, op)).unwrap();
    }

    pub fn write(&self, path: impl Into<PathBuf>) {
        self.send(path, Op::WRITE);
    }

    /// Every path list handed to `update_all`, oldest first.
    pub fn updates(&self) -> Vec<Vec<PathBuf>> {
        self.updates.lock().unwrap().clone()
    }

    pub fn last_update(&self) -> Option<Vec<PathBuf>> {
        self.updates.lock().unwrap().last().cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl FileWatcher for FakeWatcher {
    fn update_all(&mut self, paths: Vec<PathBuf>) -> Result<usize> {
        let count = paths.len();
        self.updates.lock().unwrap().push(paths);
        Ok(count)
    }

    fn events(&mut self) -> &mut UnboundedReceiver<WatchEvent> {
        &mut self.rx
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
