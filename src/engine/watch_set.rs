// src/engine/watch_set.rs

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::Channel;

/// Files whose changes are acted on, per channel.
///
/// Paths are stored after symlink resolution, so two labels pointing at the
/// same file collapse into one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSet {
    build_graph: HashSet<PathBuf>,
    source: HashSet<PathBuf>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: Channel) -> &HashSet<PathBuf> {
        match channel {
            Channel::BuildGraph => &self.build_graph,
            Channel::Source => &self.source,
        }
    }

    pub fn replace(&mut self, channel: Channel, files: HashSet<PathBuf>) {
        match channel {
            Channel::BuildGraph => self.build_graph = files,
            Channel::Source => self.source = files,
        }
    }

    pub fn contains(&self, channel: Channel, path: &Path) -> bool {
        self.get(channel).contains(path)
    }
}

/// Resolve a file through symlinks. A file that does not exist yet is
/// resolved through its parent directory so creating it later still matches.
pub fn resolve_path(file: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(file) {
        return resolved;
    }
    match (file.parent(), file.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|dir| dir.join(name))
            .unwrap_or_else(|_| file.to_path_buf()),
        _ => file.to_path_buf(),
    }
}

/// Resolve `files` and compute the directories to hand to a watcher.
///
/// Directories are watched instead of files so that editors that save by
/// writing a new file and renaming it over the old one keep being noticed.
/// The directory list is sorted and deduplicated.
pub fn resolve_watch_paths<I>(files: I) -> (HashSet<PathBuf>, Vec<PathBuf>)
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut resolved = HashSet::new();
    let mut dirs = BTreeSet::new();
    for file in files {
        let path = resolve_path(&file);
        if let Some(parent) = path.parent() {
            dirs.insert(parent.to_path_buf());
        }
        resolved.insert(path);
    }
    (resolved, dirs.into_iter().collect())
}
