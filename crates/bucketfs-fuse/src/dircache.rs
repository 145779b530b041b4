//! The directory cache: directory key → immediate child entries.
//!
//! Populated whole on the first listing of a directory and kept consistent
//! by local mutation afterwards, so a cached set is always complete for the
//! directory's children as observed by this process. Local creates and
//! removes under a directory that has not been listed yet are recorded as a
//! pending overlay and merged into the first listing; the store cannot know
//! about entries that exist only in the staging area. Names are normalised
//! (trailing delimiter stripped) so each child appears exactly once even
//! when a listing yields both a placeholder object and a common prefix.

use std::collections::{BTreeMap, HashMap};

/// What kind of child an entry is, as far as the cache can know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    /// A plain object.
    File,
    /// A sub-directory (trailing-delimiter listing entry, or local mkdir).
    Directory,
    /// A locally created symlink.
    Symlink,
}

/// Counters for the directory cache.
#[derive(Debug, Default, Clone)]
pub struct DirCacheStats {
    /// readdirs answered from the cache.
    pub hits: u64,
    /// readdirs that had to list the store.
    pub misses: u64,
    /// Directories currently cached.
    pub dirs: usize,
}

/// Per-directory sets of immediate child names.
#[derive(Default)]
pub struct DirCache {
    dirs: HashMap<String, BTreeMap<String, ChildKind>>,
    // Local mutations against directories not yet listed: Some = created,
    // None = removed. Drained into the set when the listing arrives.
    pending: HashMap<String, BTreeMap<String, Option<ChildKind>>>,
    stats: DirCacheStats,
}

impl DirCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the full child set for a directory from a listing, merging
    /// any pending local mutations recorded before the listing happened.
    ///
    /// Names ending in `/` are sub-directories; the empty name (the
    /// directory's own placeholder) is dropped. A directory marker wins
    /// over a plain object of the same name.
    pub fn populate<I>(&mut self, dir_key: &str, names: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut children = BTreeMap::new();
        for name in names {
            let (name, kind) = match name.strip_suffix('/') {
                Some(stripped) => (stripped.to_string(), ChildKind::Directory),
                None => (name, ChildKind::File),
            };
            if name.is_empty() {
                continue;
            }
            children
                .entry(name)
                .and_modify(|k| {
                    if kind == ChildKind::Directory {
                        *k = ChildKind::Directory;
                    }
                })
                .or_insert(kind);
        }
        if let Some(overlay) = self.pending.remove(dir_key) {
            for (name, change) in overlay {
                match change {
                    Some(kind) => {
                        children.insert(name, kind);
                    }
                    None => {
                        children.remove(&name);
                    }
                }
            }
        }
        self.dirs.insert(dir_key.to_string(), children);
        self.stats.dirs = self.dirs.len();
    }

    /// The cached children of a directory, if the directory is cached.
    pub fn get(&mut self, dir_key: &str) -> Option<Vec<(String, ChildKind)>> {
        match self.dirs.get(dir_key) {
            Some(children) => {
                self.stats.hits += 1;
                Some(children.iter().map(|(n, k)| (n.clone(), *k)).collect())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// True iff the directory's set is cached. Does not count as a lookup.
    pub fn contains(&self, dir_key: &str) -> bool {
        self.dirs.contains_key(dir_key)
    }

    /// Records a locally created child. A cached set is mutated in place;
    /// an unlisted directory remembers the child for its first listing.
    pub fn add_child(&mut self, dir_key: &str, name: &str, kind: ChildKind) {
        let name = name.strip_suffix('/').unwrap_or(name);
        if let Some(children) = self.dirs.get_mut(dir_key) {
            children.insert(name.to_string(), kind);
        } else {
            self.pending
                .entry(dir_key.to_string())
                .or_default()
                .insert(name.to_string(), Some(kind));
        }
    }

    /// Records a locally removed child, in the set or the overlay.
    pub fn remove_child(&mut self, dir_key: &str, name: &str) {
        let name = name.strip_suffix('/').unwrap_or(name);
        if let Some(children) = self.dirs.get_mut(dir_key) {
            children.remove(name);
        } else {
            self.pending
                .entry(dir_key.to_string())
                .or_default()
                .insert(name.to_string(), None);
        }
    }

    /// Drops a directory's cached set and overlay entirely.
    pub fn drop_dir(&mut self, dir_key: &str) {
        self.dirs.remove(dir_key);
        self.pending.remove(dir_key);
        self.stats.dirs = self.dirs.len();
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> DirCacheStats {
        self.stats.clone()
    }
}
