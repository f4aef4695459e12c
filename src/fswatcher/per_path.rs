// src/fswatcher/per_path.rs

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{FileWatcher, Op, TolerateList, WatchEvent, modifying_events};
use crate::errors::{Result, WatchErrors};

/// The per-path OS primitive underneath [`PerPathWatcher`].
///
/// Split out so the reconciliation and re-arm logic can run against an
/// in-memory primitive. `add` must fail for paths that do not exist.
pub trait WatchPrimitive: Send + 'static {
    fn add(&mut self, path: &Path) -> notify::Result<()>;
    fn remove(&mut self, path: &Path) -> notify::Result<()>;
    fn close(&mut self) {}
}

/// Non-recursive `notify` watches (inotify, kqueue, ReadDirectoryChangesW).
pub struct NotifyPrimitive {
    watcher: Option<RecommendedWatcher>,
}

impl NotifyPrimitive {
    /// Create the primitive and the raw event stream it feeds.
    pub fn new() -> Result<(Self, UnboundedReceiver<WatchEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for ev in modifying_events(&event) {
                        if tx.send(ev).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => {
                    eprintln!("ibazel: file watch error: {err}");
                }
            },
            Config::default(),
        )?;
        Ok((
            Self {
                watcher: Some(watcher),
            },
            rx,
        ))
    }
}

impl WatchPrimitive for NotifyPrimitive {
    fn add(&mut self, path: &Path) -> notify::Result<()> {
        match self.watcher.as_mut() {
            Some(w) => w.watch(path, RecursiveMode::NonRecursive),
            None => Err(notify::Error::generic("watcher closed")),
        }
    }

    fn remove(&mut self, path: &Path) -> notify::Result<()> {
        match self.watcher.as_mut() {
            Some(w) => w.unwatch(path),
            None => Ok(()),
        }
    }

    fn close(&mut self) {
        self.watcher = None;
    }
}

/// One OS watch per path.
///
/// OS watchers drop a watch when the watched directory is removed or
/// renamed away. A lost path is parked on its nearest watchable ancestor;
/// when an event on that ancestor shows the path again, the original watch
/// is restored and the temporary one released.
pub struct PerPathWatcher<P: WatchPrimitive> {
    inner: Arc<Mutex<Inner<P>>>,
    tolerate: TolerateList,
    events: UnboundedReceiver<WatchEvent>,
    pump: Option<JoinHandle<()>>,
}

/// Watch bookkeeping shared with the event pump.
struct Inner<P> {
    primitive: P,
    /// Requested paths with a live watch.
    watched: HashSet<PathBuf>,
    /// Requested paths that vanished, keyed to the ancestor covering them.
    parked: HashMap<PathBuf, PathBuf>,
}

impl<P: WatchPrimitive> Inner<P> {
    fn is_anchor(&self, dir: &Path) -> bool {
        self.parked.values().any(|anchor| anchor == dir)
    }

    /// Drop a temporary ancestor watch once nothing relies on it.
    fn release_anchor(&mut self, anchor: &Path) {
        if !self.watched.contains(anchor) && !self.is_anchor(anchor) {
            let _ = self.primitive.remove(anchor);
        }
    }

    fn unpark(&mut self, path: &Path) {
        if let Some(anchor) = self.parked.remove(path) {
            self.release_anchor(&anchor);
        }
    }

    /// Restore the watch on `path`, or park it on the nearest ancestor that
    /// can be watched.
    fn rearm(&mut self, path: &Path) {
        if self.watched.remove(path) && !self.is_anchor(path) {
            // The old watch may or may not still be registered.
            let _ = self.primitive.remove(path);
        }
        let previous = self.parked.remove(path);

        if self.primitive.add(path).is_ok() {
            debug!(path = %path.display(), "re-armed watch");
            self.watched.insert(path.to_path_buf());
            if let Some(old) = previous {
                self.release_anchor(&old);
            }
            return;
        }

        let anchor = path.ancestors().skip(1).find(|dir| {
            self.watched.contains(*dir)
                || self.parked.values().any(|anchor| anchor == *dir)
                || self.primitive.add(dir).is_ok()
        });

        match anchor {
            Some(anchor) => {
                let anchor = anchor.to_path_buf();
                debug!(
                    path = %path.display(),
                    anchor = %anchor.display(),
                    "watched path is gone; waiting for it to reappear"
                );
                self.parked.insert(path.to_path_buf(), anchor.clone());
                if let Some(old) = previous.as_ref().filter(|old| **old != anchor) {
                    self.release_anchor(old);
                }
                // It may have come back before the ancestor watch existed.
                if self.primitive.add(path).is_ok() {
                    self.watched.insert(path.to_path_buf());
                    self.unpark(path);
                }
            }
            None => {
                warn!(
                    path = %path.display(),
                    "could not re-arm watch; it will be restored on the next query"
                );
                if let Some(old) = previous {
                    self.release_anchor(&old);
                }
            }
        }

        // Paths parked on the lost one need a new anchor.
        if !self.watched.contains(path) {
            let orphans: Vec<PathBuf> = self
                .parked
                .iter()
                .filter(|(child, anchor)| anchor.as_path() == path && child.as_path() != path)
                .map(|(child, _)| child.clone())
                .collect();
            for orphan in orphans {
                self.rearm(&orphan);
            }
        }
    }

    fn handle(&mut self, event: &WatchEvent) {
        if event.op.intersects(Op::REMOVE | Op::RENAME) && self.watched.contains(&event.path) {
            self.rearm(&event.path);
            return;
        }
        // Anything happening at or above a parked path may have brought it back.
        let revived: Vec<PathBuf> = self
            .parked
            .keys()
            .filter(|parked| parked.starts_with(&event.path))
            .cloned()
            .collect();
        for path in revived {
            if self.parked.contains_key(&path) {
                self.rearm(&path);
            }
        }
    }
}

impl PerPathWatcher<NotifyPrimitive> {
    pub fn new(tolerate: TolerateList) -> Result<Self> {
        let (primitive, raw) = NotifyPrimitive::new()?;
        Ok(Self::with_primitive(primitive, raw, tolerate))
    }
}

impl<P: WatchPrimitive> PerPathWatcher<P> {
    /// Build on top of an arbitrary primitive whose events arrive on `raw`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn with_primitive(
        primitive: P,
        raw: UnboundedReceiver<WatchEvent>,
        tolerate: TolerateList,
    ) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            primitive,
            watched: HashSet::new(),
            parked: HashMap::new(),
        }));
        let (tx, events) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_events(raw, tx, Arc::clone(&inner)));

        Self {
            inner,
            tolerate,
            events,
            pump: Some(pump),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the paths currently watched.
    pub fn watched(&self) -> HashSet<PathBuf> {
        self.lock().watched.clone()
    }

    /// Requested paths that are gone, with the ancestor watched in their
    /// place.
    pub fn pending(&self) -> HashMap<PathBuf, PathBuf> {
        self.lock().parked.clone()
    }
}

async fn pump_events<P: WatchPrimitive>(
    mut raw: UnboundedReceiver<WatchEvent>,
    tx: UnboundedSender<WatchEvent>,
    inner: Arc<Mutex<Inner<P>>>,
) {
    while let Some(event) = raw.recv().await {
        if !event.op.is_modifying() {
            continue;
        }
        inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle(&event);
        if tx.send(event).is_err() {
            break;
        }
    }
    debug!("per-path watcher event pump ended");
}

impl<P: WatchPrimitive> FileWatcher for PerPathWatcher<P> {
    fn update_all(&mut self, paths: Vec<PathBuf>) -> Result<usize> {
        let mut errors = WatchErrors::default();
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = &mut *guard;
        let wanted: HashSet<PathBuf> = paths.iter().cloned().collect();

        let stale: Vec<PathBuf> = inner
            .watched
            .iter()
            .filter(|p| !wanted.contains(*p))
            .cloned()
            .collect();
        for path in stale {
            inner.watched.remove(&path);
            if inner.is_anchor(&path) {
                continue;
            }
            match inner.primitive.remove(&path) {
                Ok(()) => {}
                Err(notify::Error {
                    kind: notify::ErrorKind::WatchNotFound,
                    ..
                }) => {}
                Err(err) => errors.push(path, format!("error unwatching: {err}")),
            }
        }

        let abandoned: Vec<PathBuf> = inner
            .parked
            .keys()
            .filter(|p| !wanted.contains(*p))
            .cloned()
            .collect();
        for path in abandoned {
            inner.unpark(&path);
        }

        let mut seen = HashSet::with_capacity(paths.len());
        for path in paths {
            if !seen.insert(path.clone()) || inner.watched.contains(&path) {
                continue;
            }
            match inner.primitive.add(&path) {
                Ok(()) => {
                    inner.watched.insert(path.clone());
                    inner.unpark(&path);
                }
                Err(err) if self.tolerate.matches(&path) => {
                    debug!(path = %path.display(), error = %err, "tolerating unwatchable path");
                }
                Err(err) => errors.push(path, format!("error watching: {err}")),
            }
        }

        let count = inner.watched.len();
        drop(guard);
        errors.into_result().map(|()| count)
    }

    fn events(&mut self) -> &mut UnboundedReceiver<WatchEvent> {
        &mut self.events
    }

    fn close(&mut self) {
        {
            let mut inner = self.lock();
            inner.primitive.close();
            inner.watched.clear();
            inner.parked.clear();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.events.close();
    }
}

impl<P: WatchPrimitive> Drop for PerPathWatcher<P> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
