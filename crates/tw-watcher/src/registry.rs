//! Registry of watched paths.
//!
//! [`PathRegistry`] is a plain map owned by the watch agent. It has no
//! interior locking: the agent is its only reader and writer, and every
//! mutation reaches the agent as a command over its channel.

use camino::{Utf8Path, Utf8PathBuf};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// A path currently registered with the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WatchedPath {
    /// Absolute, normalized path.
    pub path: Utf8PathBuf,
    /// Whether directories under this path are brought under watch.
    pub recursive: bool,
}

/// Mapping of absolute path to watch metadata.
#[derive(Debug, Default)]
pub struct PathRegistry {
    entries: FxHashMap<Utf8PathBuf, WatchedPath>,
}

impl PathRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `path` is registered.
    #[inline]
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Records `path`, replacing any previous entry for it.
    pub fn insert(&mut self, path: Utf8PathBuf, recursive: bool) {
        let entry = WatchedPath {
            path: path.clone(),
            recursive,
        };
        self.entries.insert(path, entry);
    }

    /// Forgets `path`, returning its entry if it was registered.
    pub fn remove(&mut self, path: &Utf8Path) -> Option<WatchedPath> {
        self.entries.remove(path)
    }

    /// Forgets `path` and every registered path beneath it.
    ///
    /// Descendants are only looked for when `path` itself was registered,
    /// so removals of plain files stay O(1).
    pub fn remove_tree(&mut self, path: &Utf8Path) -> Vec<WatchedPath> {
        let Some(root) = self.entries.remove(path) else {
            return Vec::new();
        };

        let descendants: Vec<Utf8PathBuf> = self
            .entries
            .keys()
            .filter(|candidate| candidate.starts_with(path))
            .cloned()
            .collect();

        let mut removed = Vec::with_capacity(descendants.len() + 1);
        removed.push(root);
        removed.extend(
            descendants
                .iter()
                .filter_map(|descendant| self.entries.remove(descendant)),
        );
        removed
    }

    /// Returns the recursive flag of the nearest registered proper ancestor.
    pub fn recursive_for(&self, path: &Utf8Path) -> Option<bool> {
        path.ancestors()
            .skip(1)
            .find_map(|ancestor| self.entries.get(ancestor))
            .map(|entry| entry.recursive)
    }

    /// Returns the number of registered paths.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a copy of every entry, sorted by path.
    pub fn snapshot(&self) -> Vec<WatchedPath> {
        let mut entries: Vec<WatchedPath> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Empties the registry, returning every entry sorted by path.
    pub fn drain(&mut self) -> Vec<WatchedPath> {
        let mut entries: Vec<WatchedPath> = self.entries.drain().map(|(_, entry)| entry).collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }
}
