// src/fswatcher/recursive.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{FileWatcher, TolerateList, WatchEvent, modifying_events};
use crate::errors::{Result, WatchErrors};

/// One recursive subscription rooted at the deepest directory containing
/// every watched path.
///
/// Events under the root are forwarded only when they hit a watched path
/// or a direct child of one, which keeps the user-space filter equivalent to
/// a set of non-recursive directory watches.
pub struct RecursiveWatcher {
    watcher: Option<RecommendedWatcher>,
    root: Option<PathBuf>,
    watched: Arc<RwLock<HashSet<PathBuf>>>,
    tolerate: TolerateList,
    events: UnboundedReceiver<WatchEvent>,
    pump: Option<JoinHandle<()>>,
}

impl RecursiveWatcher {
    pub fn new(tolerate: TolerateList) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Event>();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let _ = raw_tx.send(event);
                }
                Err(err) => eprintln!("ibazel: file watch error: {err}"),
            },
            Config::default(),
        )?;

        let watched = Arc::new(RwLock::new(HashSet::new()));
        let (tx, events) = mpsc::unbounded_channel();
        let pump = tokio::spawn(filter_events(raw_rx, tx, Arc::clone(&watched)));

        Ok(Self {
            watcher: Some(watcher),
            root: None,
            watched,
            tolerate,
            events,
            pump: Some(pump),
        })
    }

    /// Directory the recursive subscription currently covers.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn resubscribe(&mut self, root: Option<PathBuf>) -> Result<()> {
        if root == self.root {
            return Ok(());
        }
        let Some(watcher) = self.watcher.as_mut() else {
            return Ok(());
        };
        if let Some(old) = self.root.take() {
            let _ = watcher.unwatch(&old);
        }
        if let Some(new) = &root {
            watcher.watch(new, RecursiveMode::Recursive)?;
            info!(root = %new.display(), "recursive watch established");
        }
        self.root = root;
        Ok(())
    }
}

async fn filter_events(
    mut raw: UnboundedReceiver<notify::Event>,
    tx: UnboundedSender<WatchEvent>,
    watched: Arc<RwLock<HashSet<PathBuf>>>,
) {
    while let Some(event) = raw.recv().await {
        for ev in modifying_events(&event) {
            let relevant = {
                let set = watched.read().unwrap_or_else(PoisonError::into_inner);
                set.contains(&ev.path) || ev.path.parent().is_some_and(|p| set.contains(p))
            };
            if relevant && tx.send(ev).is_err() {
                return;
            }
        }
    }
    debug!("recursive watcher event pump ended");
}

/// Deepest common ancestor directory of `paths`.
pub fn common_ancestor<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Option<PathBuf> {
    let mut iter = paths.into_iter();
    let mut ancestor = iter.next()?.to_path_buf();
    for path in iter {
        while !path.starts_with(&ancestor) {
            if !ancestor.pop() {
                return None;
            }
        }
    }
    Some(ancestor)
}

impl FileWatcher for RecursiveWatcher {
    fn update_all(&mut self, paths: Vec<PathBuf>) -> Result<usize> {
        let mut errors = WatchErrors::default();
        let mut next = HashSet::with_capacity(paths.len());

        for path in paths {
            if path.exists() {
                next.insert(path);
            } else if self.tolerate.matches(&path) {
                debug!(path = %path.display(), "tolerating missing path");
            } else {
                errors.push(path, "no such file or directory");
            }
        }

        let root = common_ancestor(next.iter().map(PathBuf::as_path)).map(|root| {
            // A single watched file is covered through its directory.
            if root.is_file() {
                root.parent().map(Path::to_path_buf).unwrap_or(root)
            } else {
                root
            }
        });

        if let Err(err) = self.resubscribe(root.clone()) {
            errors.push(root.unwrap_or_default(), format!("error watching: {err}"));
        }

        let count = next.len();
        *self.watched.write().unwrap_or_else(PoisonError::into_inner) = next;
        errors.into_result().map(|()| count)
    }

    fn events(&mut self) -> &mut UnboundedReceiver<WatchEvent> {
        &mut self.events
    }

    fn close(&mut self) {
        if let (Some(watcher), Some(root)) = (self.watcher.as_mut(), self.root.take()) {
            let _ = watcher.unwatch(&root);
        }
        self.watcher = None;
        self.watched
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.events.close();
    }
}

impl Drop for RecursiveWatcher {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
