//! The POSIX operation dispatcher.
//!
//! Each kernel callback lands here as a path-level operation. Fast answers
//! come from the attribute and directory caches, in-flight content from the
//! cache store, and authoritative data from the object store. Remote and
//! disk effects happen before any in-memory cache mutation, so an operation
//! that fails with `EIO` leaves both caches exactly as it found them.

use std::path::Path;
use std::sync::Arc;

use bucketfs_cache::CacheStore;
use bucketfs_store::meta::now_epoch;
use bucketfs_store::{Envelope, ObjectStore, StoreError};
use tracing::debug;

use crate::attr::{Caller, FileAttributes, BLKSIZE};
use crate::attrcache::AttrCache;
use crate::dircache::{ChildKind, DirCache};
use crate::error::{FsError, FsResult};
use crate::mapper::{basename, child_names, key_of, list_prefix_for, parent_key};

/// Fixed synthetic filesystem totals for `statfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    /// Total blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Blocks available to unprivileged callers.
    pub bavail: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub ffree: u64,
    /// Block size.
    pub bsize: u32,
    /// Maximum filename length.
    pub namelen: u32,
    /// Fragment size.
    pub frsize: u32,
}

/// The filesystem core: bucket handle, staging area and both caches.
pub struct FsCore {
    bucket: String,
    store: Arc<dyn ObjectStore>,
    cache: CacheStore,
    attrs: AttrCache,
    dirs: DirCache,
}

impl FsCore {
    /// Builds the dispatcher over a store handle and cache directory.
    pub fn new(bucket: &str, store: Arc<dyn ObjectStore>, cache_dir: &Path) -> FsResult<Self> {
        let cache = CacheStore::new(bucket, cache_dir, store.clone())?;
        Ok(FsCore {
            bucket: bucket.to_string(),
            store,
            cache,
            attrs: AttrCache::new(),
            dirs: DirCache::new(),
        })
    }

    /// The bucket this mount serves.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The staging area (visible for tests and the bridge).
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    fn cached_or_head(&mut self, key: &str) -> FsResult<Envelope> {
        if let Some(env) = self.attrs.get(key) {
            return Ok(env);
        }
        let head = self.store.head(key)?;
        let env = Envelope::from_headers(&head.headers, head.size);
        self.attrs.insert(key, env.clone());
        Ok(env)
    }

    fn child_kind(env: &Envelope) -> ChildKind {
        if env.is_dir() {
            ChildKind::Directory
        } else if env.is_symlink() {
            ChildKind::Symlink
        } else {
            ChildKind::File
        }
    }

    /// Attributes for a path. The root is synthesised; everything else is
    /// served from the attribute cache, falling back to a HEAD.
    pub fn getattr(&mut self, path: &str, caller: Caller) -> FsResult<FileAttributes> {
        let key = key_of(path);
        if key.is_empty() {
            let env = Envelope::new_dir();
            return Ok(FileAttributes::from_envelope(key, &env, caller));
        }
        let env = self.cached_or_head(key)?;
        Ok(FileAttributes::from_envelope(key, &env, caller))
    }

    /// Immediate children of a directory, listing the store on first use.
    pub fn readdir(&mut self, path: &str) -> FsResult<Vec<(String, ChildKind)>> {
        let dir_key = key_of(path);
        if let Some(children) = self.dirs.get(dir_key) {
            return Ok(children);
        }
        let prefix = list_prefix_for(dir_key);
        let listing = self.store.list_prefix(&prefix, "/")?;
        let names = child_names(&prefix, &listing);
        debug!(dir = dir_key, children = names.len(), "populated directory listing");
        self.dirs.populate(dir_key, names);
        Ok(self.dirs.get(dir_key).unwrap_or_default())
    }

    /// Creates a regular file entry locally. The store is not touched; the
    /// object materialises when `release` publishes it.
    pub fn mknod(&mut self, path: &str) -> FsResult<()> {
        let key = key_of(path);
        self.cache.create_empty(key)?;
        self.attrs.insert(key, Envelope::new_file(0));
        self.dirs
            .add_child(parent_key(key), basename(key), ChildKind::File);
        Ok(())
    }

    /// Creates a directory: a zero-byte object marks it in the store.
    pub fn mkdir(&mut self, path: &str) -> FsResult<()> {
        let key = key_of(path);
        if key.is_empty() {
            return Err(FsError::InvalidArgument("empty path"));
        }
        let env = Envelope::new_dir();
        self.store.put(key, b"", &env.to_headers())?;
        self.attrs.insert(key, env);
        self.dirs
            .add_child(parent_key(key), basename(key), ChildKind::Directory);
        // A just-created directory is known empty; seeding its set lets
        // local creates land in it before any listing happens.
        self.dirs.populate(key, Vec::new());
        Ok(())
    }

    /// Removes a file: staged content, remote object, cache entries.
    pub fn unlink(&mut self, path: &str) -> FsResult<()> {
        let key = key_of(path);
        self.cache.clear(key)?;
        match self.store.delete(key) {
            Ok(()) => {
                self.attrs.remove(key);
                self.dirs.remove_child(parent_key(key), basename(key));
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => {
                // The object is gone either way; do not leave a phantom
                // entry behind.
                self.attrs.remove(key);
                self.dirs.remove_child(parent_key(key), basename(key));
                Err(FsError::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a directory's marker object and cached state.
    pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
        let key = key_of(path);
        if key.is_empty() {
            return Err(FsError::InvalidArgument("empty path"));
        }
        match self.store.delete(key) {
            Ok(()) => {
                self.attrs.remove(key);
                self.dirs.drop_dir(key);
                self.dirs.remove_child(parent_key(key), basename(key));
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => {
                self.attrs.remove(key);
                self.dirs.drop_dir(key);
                self.dirs.remove_child(parent_key(key), basename(key));
                Err(FsError::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Truncates the staged copy and updates the cached size.
    pub fn truncate(&mut self, path: &str, length: u64) -> FsResult<()> {
        let key = key_of(path);
        self.cache.ensure_loaded(key)?;
        self.cache.truncate(key, length)?;
        let mut env = self
            .attrs
            .get(key)
            .unwrap_or_else(|| Envelope::new_file(length));
        env.size = length;
        self.attrs.insert(key, env);
        Ok(())
    }

    /// Opens a path. Write modes make sure a staged file exists; reads
    /// need no preparation.
    pub fn open(&mut self, path: &str, flags: i32) -> FsResult<()> {
        let key = key_of(path);
        let accmode = flags & libc::O_ACCMODE;
        if accmode == libc::O_WRONLY || accmode == libc::O_RDWR {
            if !self.cache.exists(key) {
                self.cache.create_empty(key)?;
            }
        }
        Ok(())
    }

    /// Reads bytes: from the staged file when one exists, otherwise a
    /// ranged GET straight from the store. Cold reads do not stage.
    pub fn read(&mut self, path: &str, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        let key = key_of(path);
        if self.cache.exists(key) {
            return Ok(self.cache.read_range(key, offset, size)?);
        }
        let range = format!("bytes={}-{}", offset, offset + size as u64);
        let (_, mut body) = self.store.get_range(key, &range)?;
        body.truncate(size);
        Ok(body)
    }

    /// Writes bytes into the staged file; updates cached size and mtime.
    pub fn write(&mut self, path: &str, data: &[u8], offset: u64) -> FsResult<usize> {
        let key = key_of(path);
        self.cache.ensure_loaded(key)?;
        let written = self.cache.write_range(key, offset, data)?;
        let size = self.cache.file_size(key)?;
        let mut env = self.attrs.get(key).unwrap_or_else(|| Envelope::new_file(size));
        env.size = size;
        env.mtime = now_epoch();
        self.attrs.insert(key, env);
        Ok(written)
    }

    /// No-op; writes persist at `release`.
    pub fn flush(&mut self, _path: &str) -> FsResult<()> {
        Ok(())
    }

    /// Publishes a dirty entry to the uploader by emitting its sidecar.
    pub fn release(&mut self, path: &str) -> FsResult<()> {
        let key = key_of(path);
        if !self.cache.exists(key) {
            return Ok(());
        }
        let mut env = match self.attrs.get(key) {
            Some(env) => env,
            None => Envelope::new_file(self.cache.file_size(key)?),
        };
        env.atime = now_epoch();
        env.acl = "private".to_string();
        env.upload_key = Some(key.to_string());
        self.cache.write_meta(key, &env)?;
        self.attrs.insert(key, env);
        debug!(key, "released dirty entry to uploader");
        Ok(())
    }

    /// No-op; durability happens at `release` plus the uploader's PUT.
    pub fn fsync(&mut self, _path: &str) -> FsResult<()> {
        Ok(())
    }

    /// Renames via server-side copy then delete. Non-atomic: a failed
    /// delete leaves both names.
    pub fn rename(&mut self, old_path: &str, new_path: &str) -> FsResult<()> {
        let old_key = key_of(old_path).to_string();
        let new_key = key_of(new_path).to_string();

        let mut env = self.cached_or_head(&old_key)?;
        env.copy_source = Some(format!("{}/{}", self.bucket, old_key));
        self.store.put(&new_key, b"", &env.to_headers())?;
        env.copy_source = None;

        let kind = Self::child_kind(&env);
        self.attrs.insert(&new_key, env);
        self.dirs
            .add_child(parent_key(&new_key), basename(&new_key), kind);

        self.unlink(old_path)
    }

    /// Creates a symlink: the object's body is the target string.
    pub fn symlink(&mut self, target: &str, link_path: &str) -> FsResult<()> {
        let key = key_of(link_path);
        let env = Envelope::new_symlink(target.len() as u64);
        self.store.put(key, target.as_bytes(), &env.to_headers())?;
        self.attrs.insert(key, env);
        self.dirs
            .add_child(parent_key(key), basename(key), ChildKind::Symlink);
        Ok(())
    }

    /// Reads a symlink target from the object body.
    pub fn readlink(&mut self, path: &str) -> FsResult<Vec<u8>> {
        let key = key_of(path);
        let (head, body) = self.store.get(key)?;
        let env = Envelope::from_headers(&head.headers, head.size);
        self.attrs.insert(key, env);
        Ok(body)
    }

    /// Updates times via a metadata self-copy.
    pub fn utime(&mut self, path: &str, atime: i64, mtime: i64) -> FsResult<()> {
        let key = key_of(path).to_string();
        let mut env = self.cached_or_head(&key)?;
        env.atime = atime;
        env.mtime = mtime;
        env.copy_source = Some(format!("{}/{}", self.bucket, key));
        self.store.put(&key, b"", &env.to_headers())?;
        env.copy_source = None;
        self.attrs.insert(&key, env);
        Ok(())
    }

    /// Accepted but ignored; mode comes from envelope metadata.
    pub fn chmod(&mut self, _path: &str, _mode: u32) -> FsResult<()> {
        Ok(())
    }

    /// Accepted but ignored; ownership comes from the caller context.
    pub fn chown(&mut self, _path: &str, _uid: u32, _gid: u32) -> FsResult<()> {
        Ok(())
    }

    /// Fixed synthetic filesystem totals.
    pub fn statfs(&self) -> StatFs {
        StatFs {
            blocks: 1 << 24,
            bfree: 1 << 24,
            bavail: 1 << 24,
            files: 1 << 20,
            ffree: 1 << 20,
            bsize: BLKSIZE,
            namelen: 255,
            frsize: BLKSIZE,
        }
    }

    /// Hard links are not expressible over the flat key space.
    pub fn link(&mut self, _old_path: &str, _new_path: &str) -> FsResult<()> {
        Err(FsError::Unsupported("link"))
    }

    /// Extended attributes are not supported.
    pub fn setxattr(&mut self, _path: &str, _name: &str) -> FsResult<()> {
        Err(FsError::Unsupported("setxattr"))
    }

    /// Extended attributes are not supported.
    pub fn getxattr(&mut self, _path: &str, _name: &str) -> FsResult<Vec<u8>> {
        Err(FsError::Unsupported("getxattr"))
    }

    /// Extended attributes are not supported.
    pub fn listxattr(&mut self, _path: &str) -> FsResult<Vec<u8>> {
        Err(FsError::Unsupported("listxattr"))
    }

    /// Extended attributes are not supported.
    pub fn removexattr(&mut self, _path: &str, _name: &str) -> FsResult<()> {
        Err(FsError::Unsupported("removexattr"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketfs_store::MemoryStore;

    const CALLER: Caller = Caller { uid: 1000, gid: 1000 };

    fn core() -> (tempfile::TempDir, FsCore, Arc<MemoryStore>) {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryStore::new());
        let core = FsCore::new("demo", remote.clone(), dir.path()).unwrap();
        (dir, core, remote)
    }

    #[test]
    fn test_getattr_root_is_directory() {
        let (_dir, mut core, _) = core();
        let attr = core.getattr("/", CALLER).unwrap();
        assert_eq!(attr.ino, 1);
        assert_eq!(attr.mode, 0o40755);
        assert_eq!(attr.uid, 1000);
    }

    #[test]
    fn test_getattr_missing_is_enoent() {
        let (_dir, mut core, _) = core();
        let err = core.getattr("/no-such", CALLER).unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_getattr_heads_once_then_caches() {
        let (_dir, mut core, remote) = core();
        remote.insert_object("a", b"12345", &[]);

        core.getattr("/a", CALLER).unwrap();
        core.getattr("/a", CALLER).unwrap();
        assert_eq!(remote.stats().heads, 1);
    }

    #[test]
    fn test_mknod_then_getattr_without_network() {
        let (_dir, mut core, remote) = core();
        core.mknod("/f.txt").unwrap();

        let attr = core.getattr("/f.txt", CALLER).unwrap();
        assert_eq!(attr.mode, 0o100644);
        assert_eq!(attr.size, 0);
        assert_eq!(remote.stats().heads, 0);
    }

    #[test]
    fn test_mknod_does_not_touch_store() {
        let (_dir, mut core, remote) = core();
        core.mknod("/f").unwrap();
        assert_eq!(remote.stats().puts, 0);
        assert_eq!(remote.object_count(), 0);
    }

    #[test]
    fn test_write_then_read_same_mount() {
        let (_dir, mut core, _) = core();
        core.mknod("/f").unwrap();

        assert_eq!(core.write("/f", b"hello", 0).unwrap(), 5);
        assert_eq!(core.read("/f", 5, 0).unwrap(), b"hello");
        assert_eq!(core.getattr("/f", CALLER).unwrap().size, 5);
    }

    #[test]
    fn test_write_at_offset_updates_size() {
        let (_dir, mut core, _) = core();
        core.mknod("/f").unwrap();
        core.write("/f", b"xy", 10).unwrap();
        assert_eq!(core.getattr("/f", CALLER).unwrap().size, 12);
    }

    #[test]
    fn test_read_cold_uses_ranged_get() {
        let (_dir, mut core, remote) = core();
        remote.insert_object("f", b"0123456789", &[]);

        assert_eq!(core.read("/f", 4, 3).unwrap(), b"3456");
        assert_eq!(remote.stats().gets, 1);
        assert!(!core.cache().exists("f"));
    }

    #[test]
    fn test_read_missing_is_enoent() {
        let (_dir, mut core, _) = core();
        let err = core.read("/ghost", 1, 0).unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_truncate_sets_size() {
        let (_dir, mut core, _) = core();
        core.mknod("/f").unwrap();
        core.write("/f", b"123456", 0).unwrap();
        core.truncate("/f", 3).unwrap();

        assert_eq!(core.getattr("/f", CALLER).unwrap().size, 3);
        assert_eq!(core.read("/f", 10, 0).unwrap(), b"123");
    }

    #[test]
    fn test_truncate_downloads_pre_existing_object() {
        let (_dir, mut core, remote) = core();
        remote.insert_object("f", b"abcdef", &[]);

        core.truncate("/f", 2).unwrap();
        assert_eq!(core.read("/f", 10, 0).unwrap(), b"ab");
    }

    #[test]
    fn test_release_emits_sidecar_only_when_dirty() {
        let (_dir, mut core, _) = core();
        core.release("/clean").unwrap();
        assert!(!core.cache().has_sidecar("clean"));

        core.mknod("/dirty").unwrap();
        core.write("/dirty", b"x", 0).unwrap();
        core.release("/dirty").unwrap();
        assert!(core.cache().has_sidecar("dirty"));
    }

    #[test]
    fn test_release_sidecar_carries_fn() {
        let (_dir, mut core, _) = core();
        core.mknod("/d/f.txt").unwrap();
        core.release("/d/f.txt").unwrap();

        let env = bucketfs_cache::read_sidecar(&core.cache().meta_path("d/f.txt")).unwrap();
        assert_eq!(env.upload_key.as_deref(), Some("d/f.txt"));
    }

    #[test]
    fn test_mkdir_puts_marker_object() {
        let (_dir, mut core, remote) = core();
        core.mkdir("/d").unwrap();

        assert_eq!(remote.body_of("d").unwrap(), b"");
        let mode: u32 = remote
            .metadata_of("d", "x-amz-meta-s3fs-mode")
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(mode, 0o40755);
    }

    #[test]
    fn test_mkdir_root_is_einval() {
        let (_dir, mut core, _) = core();
        let err = core.mkdir("/").unwrap_err();
        assert_eq!(err.to_errno(), libc::EINVAL);
    }

    #[test]
    fn test_readdir_lists_then_caches() {
        let (_dir, mut core, remote) = core();
        remote.insert_object("d", b"", &[]);
        remote.insert_object("d/x", b"1", &[]);
        remote.insert_object("d/y", b"2", &[]);

        let children = core.readdir("/d").unwrap();
        let names: Vec<&str> = children.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);

        core.readdir("/d").unwrap();
        assert_eq!(remote.stats().lists, 1);
    }

    #[test]
    fn test_mknod_visible_in_unlisted_root_readdir() {
        let (_dir, mut core, remote) = core();
        remote.insert_object("remote.txt", b"1", &[]);
        core.mknod("/a.txt").unwrap();

        let children = core.readdir("/").unwrap();
        let names: Vec<&str> = children.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "remote.txt"]);
    }

    #[test]
    fn test_mknod_merges_into_unlisted_remote_directory() {
        let (_dir, mut core, remote) = core();
        remote.insert_object("d", b"", &Envelope::new_dir().to_headers());
        remote.insert_object("d/old", b"1", &[]);

        core.mknod("/d/new").unwrap();

        let children = core.readdir("/d").unwrap();
        let names: Vec<&str> = children.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["new", "old"]);
    }

    #[test]
    fn test_readdir_after_local_creates() {
        let (_dir, mut core, _remote) = core();
        core.mkdir("/d").unwrap();
        core.readdir("/d").unwrap();
        core.mknod("/d/x").unwrap();

        let children = core.readdir("/d").unwrap();
        assert_eq!(children, vec![("x".to_string(), ChildKind::File)]);
    }

    #[test]
    fn test_unlink_removes_everything() {
        let (_dir, mut core, remote) = core();
        remote.insert_object("f", b"x", &[]);
        core.getattr("/f", CALLER).unwrap();
        core.write("/f", b"y", 0).unwrap();

        core.unlink("/f").unwrap();

        assert!(!remote.contains("f"));
        assert!(!core.cache().exists("f"));
        assert_eq!(core.getattr("/f", CALLER).unwrap_err().to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_unlink_missing_is_enoent() {
        let (_dir, mut core, _) = core();
        let err = core.unlink("/ghost").unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_rmdir_empty_path_is_einval() {
        let (_dir, mut core, _) = core();
        assert_eq!(core.rmdir("/").unwrap_err().to_errno(), libc::EINVAL);
    }

    #[test]
    fn test_rmdir_removes_marker_and_cache() {
        let (_dir, mut core, remote) = core();
        core.mkdir("/d").unwrap();
        core.readdir("/d").unwrap();

        core.rmdir("/d").unwrap();
        assert!(!remote.contains("d"));
        assert_eq!(core.getattr("/d", CALLER).unwrap_err().to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_rename_copies_then_deletes() {
        let (_dir, mut core, remote) = core();
        remote.insert_object("a", b"payload", &[]);

        core.rename("/a", "/b").unwrap();

        assert!(!remote.contains("a"));
        assert_eq!(remote.body_of("b").unwrap(), b"payload");
        assert_eq!(core.getattr("/a", CALLER).unwrap_err().to_errno(), libc::ENOENT);
        assert_eq!(core.getattr("/b", CALLER).unwrap().size, 7);
    }

    #[test]
    fn test_rename_missing_source_is_enoent() {
        let (_dir, mut core, _) = core();
        let err = core.rename("/ghost", "/b").unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_rename_preserves_envelope_times() {
        let (_dir, mut core, remote) = core();
        let mut env = Envelope::new_file(1);
        env.mtime = 777;
        remote.insert_object("a", b"x", &env.to_headers());

        core.rename("/a", "/b").unwrap();
        assert_eq!(core.getattr("/b", CALLER).unwrap().mtime, 777);
    }

    #[test]
    fn test_symlink_and_readlink() {
        let (_dir, mut core, remote) = core();
        core.symlink("target/path", "/ln").unwrap();

        assert_eq!(remote.body_of("ln").unwrap(), b"target/path");
        assert_eq!(core.readlink("/ln").unwrap(), b"target/path");

        let attr = core.getattr("/ln", CALLER).unwrap();
        assert_eq!(attr.mode & libc::S_IFMT, libc::S_IFLNK);
    }

    #[test]
    fn test_readlink_missing_is_enoent() {
        let (_dir, mut core, _) = core();
        assert_eq!(core.readlink("/ghost").unwrap_err().to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_utime_updates_cache_and_store() {
        let (_dir, mut core, remote) = core();
        remote.insert_object("f", b"x", &Envelope::new_file(1).to_headers());

        core.utime("/f", 111, 222).unwrap();

        let attr = core.getattr("/f", CALLER).unwrap();
        assert_eq!(attr.atime, 111);
        assert_eq!(attr.mtime, 222);
        assert_eq!(
            remote.metadata_of("f", "x-amz-meta-s3fs-mtime").unwrap(),
            "222"
        );
        // Self-copy keeps the body.
        assert_eq!(remote.body_of("f").unwrap(), b"x");
    }

    #[test]
    fn test_chmod_chown_accepted_noops() {
        let (_dir, mut core, _) = core();
        core.chmod("/whatever", 0o600).unwrap();
        core.chown("/whatever", 1, 2).unwrap();
    }

    #[test]
    fn test_statfs_fixed_totals() {
        let (_dir, core, _) = core();
        let s = core.statfs();
        assert_eq!(s.bsize, BLKSIZE);
        assert_eq!(s.namelen, 255);
        assert!(s.blocks > 0);
    }

    #[test]
    fn test_unsupported_operations() {
        let (_dir, mut core, _) = core();
        assert_eq!(core.link("/a", "/b").unwrap_err().to_errno(), libc::EOPNOTSUPP);
        assert_eq!(
            core.setxattr("/a", "user.x").unwrap_err().to_errno(),
            libc::EOPNOTSUPP
        );
        assert_eq!(
            core.getxattr("/a", "user.x").unwrap_err().to_errno(),
            libc::EOPNOTSUPP
        );
        assert_eq!(core.listxattr("/a").unwrap_err().to_errno(), libc::EOPNOTSUPP);
        assert_eq!(
            core.removexattr("/a", "user.x").unwrap_err().to_errno(),
            libc::EOPNOTSUPP
        );
    }

    #[test]
    fn test_open_for_write_stages_empty_file() {
        let (_dir, mut core, _) = core();
        core.open("/f", libc::O_WRONLY).unwrap();
        assert!(core.cache().exists("f"));
    }

    #[test]
    fn test_open_read_only_does_not_stage() {
        let (_dir, mut core, _) = core();
        core.open("/f", libc::O_RDONLY).unwrap();
        assert!(!core.cache().exists("f"));
    }

    #[test]
    fn test_flush_and_fsync_are_noops() {
        let (_dir, mut core, _) = core();
        core.flush("/f").unwrap();
        core.fsync("/f").unwrap();
    }

    #[test]
    fn test_eio_on_utime_leaves_caches_clean() {
        let (_dir, mut core, remote) = core();
        remote.insert_object("f", b"x", &Envelope::new_file(1).to_headers());
        let before = core.getattr("/f", CALLER).unwrap();

        // Delete behind the cache's back so the self-copy 404s; the cached
        // envelope must keep its old times.
        remote.delete("f").unwrap();
        core.utime("/f", 1, 2).unwrap_err();

        let after = core.getattr("/f", CALLER).unwrap();
        assert_eq!(after.atime, before.atime);
        assert_eq!(after.mtime, before.mtime);
    }
}
