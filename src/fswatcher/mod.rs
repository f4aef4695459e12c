// src/fswatcher/mod.rs

//! Filesystem watching for one logical channel of paths.
//!
//! The control loop owns two [`FileWatcher`]s (build-graph files and source
//! files). Each one is told the complete set of paths it should cover via
//! [`FileWatcher::update_all`] and produces [`WatchEvent`]s on an unbounded
//! channel. Backends:
//!
//! - [`PerPathWatcher`]: one OS watch per path, re-armed after a watched
//!   path is removed or renamed.
//! - [`RecursiveWatcher`]: one recursive subscription on the common ancestor,
//!   filtered back down to the watched set in user space.
//!
//! Both backends only ever emit modifying events; reads and stats are dropped.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};

use notify::EventKind;
use notify::event::ModifyKind;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::errors::Result;
use crate::types::WatcherBackend;

pub mod per_path;
pub mod recursive;

pub use per_path::{NotifyPrimitive, PerPathWatcher, WatchPrimitive};
pub use recursive::RecursiveWatcher;

/// Bitmask of filesystem operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Op(u8);

impl Op {
    pub const CREATE: Op = Op(1);
    pub const WRITE: Op = Op(1 << 1);
    pub const REMOVE: Op = Op(1 << 2);
    pub const RENAME: Op = Op(1 << 3);
    pub const CHMOD: Op = Op(1 << 4);

    /// Operations that change file contents or presence.
    pub const MODIFYING: Op = Op(Self::WRITE.0 | Self::CREATE.0 | Self::RENAME.0 | Self::REMOVE.0);

    pub const fn empty() -> Op {
        Op(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Op) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Op) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_modifying(self) -> bool {
        self.intersects(Op::MODIFYING)
    }
}

impl BitOr for Op {
    type Output = Op;

    fn bitor(self, rhs: Op) -> Op {
        Op(self.0 | rhs.0)
    }
}

impl BitOrAssign for Op {
    fn bitor_assign(&mut self, rhs: Op) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Op, &str); 5] = [
            (Op::CREATE, "CREATE"),
            (Op::WRITE, "WRITE"),
            (Op::REMOVE, "REMOVE"),
            (Op::RENAME, "RENAME"),
            (Op::CHMOD, "CHMOD"),
        ];
        let mut first = true;
        for (op, name) in NAMES {
            if self.contains(op) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("NONE")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub op: Op,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, op: Op) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }
}

/// Map a notify event kind onto our operation mask. Pure accesses map to
/// an empty mask.
pub fn op_from_kind(kind: &EventKind) -> Op {
    match kind {
        EventKind::Create(_) => Op::CREATE,
        EventKind::Remove(_) => Op::REMOVE,
        EventKind::Modify(ModifyKind::Name(_)) => Op::RENAME,
        EventKind::Modify(ModifyKind::Metadata(_)) => Op::CHMOD,
        EventKind::Modify(_) => Op::WRITE,
        EventKind::Any => Op::WRITE,
        EventKind::Access(_) | EventKind::Other => Op::empty(),
    }
}

/// Split a notify event into per-path events, keeping only modifying ones.
pub fn modifying_events(event: &notify::Event) -> Vec<WatchEvent> {
    let op = op_from_kind(&event.kind);
    if !op.is_modifying() {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .map(|path| WatchEvent::new(path.clone(), op))
        .collect()
}

/// A watcher for one logical set of paths.
pub trait FileWatcher: Send {
    /// Replace the watched set with `paths`, adding and removing only the
    /// difference. Returns the number of paths now covered.
    ///
    /// Failures for individual paths are collected into one
    /// [`IbazelError::Watch`](crate::errors::IbazelError::Watch); the watched
    /// set still reflects every path that succeeded.
    fn update_all(&mut self, paths: Vec<PathBuf>) -> Result<usize>;

    fn events(&mut self) -> &mut UnboundedReceiver<WatchEvent>;

    /// Release OS resources. The event stream ends afterwards.
    fn close(&mut self);
}

/// Paths that may legitimately be absent even though queries report them.
///
/// Matching is by trailing path components, so `tools/defaults/BUILD`
/// matches `/ws/tools/defaults/BUILD` but not `/ws/mytools/defaults/BUILD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TolerateList(Vec<PathBuf>);

impl Default for TolerateList {
    fn default() -> Self {
        Self::new(["tools/defaults/BUILD", "tools/defaults"])
    }
}

impl TolerateList {
    pub fn new<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self(entries.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.0.iter().any(|suffix| path.ends_with(suffix))
    }
}

/// Create a watcher for the requested backend.
pub fn new_watcher(backend: WatcherBackend, tolerate: TolerateList) -> Result<Box<dyn FileWatcher>> {
    match backend.resolve() {
        WatcherBackend::Recursive => Ok(Box::new(RecursiveWatcher::new(tolerate)?)),
        _ => Ok(Box::new(PerPathWatcher::new(tolerate)?)),
    }
}
