//! Inode ↔ path table for the FUSE bridge.
//!
//! The kernel addresses entries by inode; the dispatcher works on paths.
//! This table owns the mapping, assigns inodes on first lookup, tracks
//! kernel lookup counts, and frees entries on `forget`.

use std::collections::HashMap;

use crate::attr::ROOT_INODE;

/// Bidirectional inode/path mapping.
pub struct InodeTable {
    by_ino: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
    lookups: HashMap<u64, u64>,
    next_ino: u64,
}

impl InodeTable {
    /// Creates a table holding only the root.
    pub fn new() -> Self {
        let mut by_ino = HashMap::new();
        let mut by_path = HashMap::new();
        by_ino.insert(ROOT_INODE, "/".to_string());
        by_path.insert("/".to_string(), ROOT_INODE);
        InodeTable {
            by_ino,
            by_path,
            lookups: HashMap::new(),
            next_ino: ROOT_INODE + 1,
        }
    }

    /// The path behind an inode, if known.
    pub fn path_of(&self, ino: u64) -> Option<&str> {
        self.by_ino.get(&ino).map(String::as_str)
    }

    /// The inode behind a path, if assigned.
    pub fn ino_of(&self, path: &str) -> Option<u64> {
        self.by_path.get(path).copied()
    }

    /// Returns the inode for a path, assigning a fresh one if needed.
    pub fn assign(&mut self, path: &str) -> u64 {
        if let Some(ino) = self.by_path.get(path) {
            return *ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.by_ino.insert(ino, path.to_string());
        self.by_path.insert(path.to_string(), ino);
        ino
    }

    /// Bumps the kernel lookup count for an inode.
    pub fn add_lookup(&mut self, ino: u64) {
        *self.lookups.entry(ino).or_insert(0) += 1;
    }

    /// Drops `nlookup` references; the entry is freed when the count hits
    /// zero. The root is never freed.
    pub fn forget(&mut self, ino: u64, nlookup: u64) {
        if ino == ROOT_INODE {
            return;
        }
        let remaining = {
            let count = self.lookups.entry(ino).or_insert(0);
            *count = count.saturating_sub(nlookup);
            *count
        };
        if remaining == 0 {
            self.lookups.remove(&ino);
            if let Some(path) = self.by_ino.remove(&ino) {
                self.by_path.remove(&path);
            }
        }
    }

    /// Unbinds a path after unlink/rmdir. The inode stays resolvable for
    /// still-open handles until the kernel forgets it.
    pub fn remove_path(&mut self, path: &str) {
        self.by_path.remove(path);
    }

    /// Rewrites a path and its descendants after a rename.
    pub fn rename_path(&mut self, old: &str, new: &str) {
        let old_prefix = format!("{}/", old);
        let moved: Vec<(String, u64)> = self
            .by_path
            .iter()
            .filter(|(path, _)| path.as_str() == old || path.starts_with(&old_prefix))
            .map(|(path, ino)| (path.clone(), *ino))
            .collect();

        for (path, ino) in moved {
            let renamed = if path == old {
                new.to_string()
            } else {
                format!("{}{}", new, &path[old.len()..])
            };
            self.by_path.remove(&path);
            self.by_path.insert(renamed.clone(), ino);
            self.by_ino.insert(ino, renamed);
        }
    }

    /// Number of live mappings.
    pub fn len(&self) -> usize {
        self.by_ino.len()
    }

    /// Never true: the root is always mapped.
    pub fn is_empty(&self) -> bool {
        self.by_ino.is_empty()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
