//! The fuser bridge.
//!
//! Implements `fuser::Filesystem` by translating inode-addressed kernel
//! callbacks into path-level dispatcher operations. The kernel serialises
//! callbacks per mount, so the shared state sits behind one mutex.

use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileType as FuserFileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use tracing::debug;

use crate::attr::{Caller, ROOT_INODE};
use crate::dircache::ChildKind;
use crate::error::FsError;
use crate::inode::InodeTable;
use crate::ops::FsCore;

const TTL: Duration = Duration::from_secs(1);

/// Joins a parent path and a child name.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

fn caller_of(req: &Request<'_>) -> Caller {
    Caller {
        uid: req.uid(),
        gid: req.gid(),
    }
}

fn time_or_now_epoch(t: TimeOrNow) -> i64 {
    match t {
        TimeOrNow::SpecificTime(t) => t
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0),
        TimeOrNow::Now => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0),
    }
}

fn kind_to_fuser(kind: ChildKind) -> FuserFileType {
    match kind {
        ChildKind::File => FuserFileType::RegularFile,
        ChildKind::Directory => FuserFileType::Directory,
        ChildKind::Symlink => FuserFileType::Symlink,
    }
}

struct BridgeState {
    core: FsCore,
    inodes: InodeTable,
}

/// `fuser::Filesystem` over the dispatcher.
pub struct BucketFilesystem {
    state: Arc<Mutex<BridgeState>>,
}

impl BucketFilesystem {
    /// Wraps a dispatcher for mounting.
    pub fn new(core: FsCore) -> Self {
        BucketFilesystem {
            state: Arc::new(Mutex::new(BridgeState {
                core,
                inodes: InodeTable::new(),
            })),
        }
    }
}

macro_rules! lock_state {
    ($self:ident, $reply:ident) => {
        match $self.state.lock() {
            Ok(state) => state,
            Err(_) => {
                $reply.error(libc::EIO);
                return;
            }
        }
    };
}

macro_rules! path_of {
    ($state:ident, $ino:expr, $reply:ident) => {
        match $state.inodes.path_of($ino) {
            Some(path) => path.to_string(),
            None => {
                $reply.error(libc::ENOENT);
                return;
            }
        }
    };
}

impl Filesystem for BucketFilesystem {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = name.to_string_lossy();
        let mut state = lock_state!(self, reply);
        let parent_path = path_of!(state, parent, reply);
        let path = child_path(&parent_path, &name);
        debug!(parent, %path, "lookup");

        match state.core.getattr(&path, caller_of(req)) {
            Ok(attr) => {
                let ino = state.inodes.assign(&path);
                state.inodes.add_lookup(ino);
                reply.entry(&TTL, &attr.to_fuser(ino), 0);
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.inodes.forget(ino, nlookup);
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let mut state = lock_state!(self, reply);
        let path = path_of!(state, ino, reply);
        match state.core.getattr(&path, caller_of(req)) {
            Ok(attr) => reply.attr(&TTL, &attr.to_fuser(ino)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let mut state = lock_state!(self, reply);
        let path = path_of!(state, ino, reply);
        debug!(%path, ?size, ?mode, "setattr");

        if let Some(length) = size {
            if let Err(e) = state.core.truncate(&path, length) {
                reply.error(e.to_errno());
                return;
            }
        }

        if atime.is_some() || mtime.is_some() {
            let current = match state.core.getattr(&path, caller_of(req)) {
                Ok(attr) => attr,
                Err(e) => {
                    reply.error(e.to_errno());
                    return;
                }
            };
            let atime = atime.map(time_or_now_epoch).unwrap_or(current.atime);
            let mtime = mtime.map(time_or_now_epoch).unwrap_or(current.mtime);
            if let Err(e) = state.core.utime(&path, atime, mtime) {
                reply.error(e.to_errno());
                return;
            }
        }

        if let Some(mode) = mode {
            if let Err(e) = state.core.chmod(&path, mode) {
                reply.error(e.to_errno());
                return;
            }
        }
        if uid.is_some() || gid.is_some() {
            if let Err(e) =
                state
                    .core
                    .chown(&path, uid.unwrap_or_default(), gid.unwrap_or_default())
            {
                reply.error(e.to_errno());
                return;
            }
        }

        match state.core.getattr(&path, caller_of(req)) {
            Ok(attr) => reply.attr(&TTL, &attr.to_fuser(ino)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let name = name.to_string_lossy();
        let mut state = lock_state!(self, reply);
        let parent_path = path_of!(state, parent, reply);
        let path = child_path(&parent_path, &name);
        debug!(%path, "mknod");

        if let Err(e) = state.core.mknod(&path) {
            reply.error(e.to_errno());
            return;
        }
        match state.core.getattr(&path, caller_of(req)) {
            Ok(attr) => {
                let ino = state.inodes.assign(&path);
                state.inodes.add_lookup(ino);
                reply.entry(&TTL, &attr.to_fuser(ino), 0);
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let name = name.to_string_lossy();
        let mut state = lock_state!(self, reply);
        let parent_path = path_of!(state, parent, reply);
        let path = child_path(&parent_path, &name);
        debug!(%path, "mkdir");

        if let Err(e) = state.core.mkdir(&path) {
            reply.error(e.to_errno());
            return;
        }
        match state.core.getattr(&path, caller_of(req)) {
            Ok(attr) => {
                let ino = state.inodes.assign(&path);
                state.inodes.add_lookup(ino);
                reply.entry(&TTL, &attr.to_fuser(ino), 0);
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = name.to_string_lossy();
        let mut state = lock_state!(self, reply);
        let parent_path = path_of!(state, parent, reply);
        let path = child_path(&parent_path, &name);
        debug!(%path, "unlink");

        match state.core.unlink(&path) {
            Ok(()) => {
                state.inodes.remove_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = name.to_string_lossy();
        let mut state = lock_state!(self, reply);
        let parent_path = path_of!(state, parent, reply);
        let path = child_path(&parent_path, &name);
        debug!(%path, "rmdir");

        match state.core.rmdir(&path) {
            Ok(()) => {
                state.inodes.remove_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn symlink(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &std::path::Path,
        reply: ReplyEntry,
    ) {
        let name = link_name.to_string_lossy();
        let target = target.to_string_lossy();
        let mut state = lock_state!(self, reply);
        let parent_path = path_of!(state, parent, reply);
        let path = child_path(&parent_path, &name);
        debug!(%path, %target, "symlink");

        if let Err(e) = state.core.symlink(&target, &path) {
            reply.error(e.to_errno());
            return;
        }
        match state.core.getattr(&path, caller_of(req)) {
            Ok(attr) => {
                let ino = state.inodes.assign(&path);
                state.inodes.add_lookup(ino);
                reply.entry(&TTL, &attr.to_fuser(ino), 0);
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let mut state = lock_state!(self, reply);
        let path = path_of!(state, ino, reply);
        match state.core.readlink(&path) {
            Ok(target) => reply.data(&target),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let name = name.to_string_lossy();
        let newname = newname.to_string_lossy();
        let mut state = lock_state!(self, reply);
        let old_parent_path = path_of!(state, parent, reply);
        let new_parent_path = path_of!(state, newparent, reply);
        let old_path = child_path(&old_parent_path, &name);
        let new_path = child_path(&new_parent_path, &newname);
        debug!(%old_path, %new_path, "rename");

        match state.core.rename(&old_path, &new_path) {
            Ok(()) => {
                state.inodes.rename_path(&old_path, &new_path);
                reply.ok();
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let mut state = lock_state!(self, reply);
        let path = path_of!(state, ino, reply);
        match state.core.open(&path, flags) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let name = name.to_string_lossy();
        let mut state = lock_state!(self, reply);
        let parent_path = path_of!(state, parent, reply);
        let path = child_path(&parent_path, &name);
        debug!(%path, "create");

        if let Err(e) = state
            .core
            .mknod(&path)
            .and_then(|()| state.core.open(&path, flags))
        {
            reply.error(e.to_errno());
            return;
        }
        match state.core.getattr(&path, caller_of(req)) {
            Ok(attr) => {
                let ino = state.inodes.assign(&path);
                state.inodes.add_lookup(ino);
                reply.created(&TTL, &attr.to_fuser(ino), 0, 0, flags as u32);
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let mut state = lock_state!(self, reply);
        let path = path_of!(state, ino, reply);
        let offset = offset.max(0) as u64;
        match state.core.read(&path, size as usize, offset) {
            Ok(bytes) => reply.data(&bytes),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let mut state = lock_state!(self, reply);
        let path = path_of!(state, ino, reply);
        let offset = offset.max(0) as u64;
        match state.core.write(&path, data, offset) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        let mut state = lock_state!(self, reply);
        let path = path_of!(state, ino, reply);
        match state.core.flush(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let mut state = lock_state!(self, reply);
        let path = path_of!(state, ino, reply);
        debug!(%path, "release");
        match state.core.release(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn fsync(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _datasync: bool,
        reply: ReplyEmpty,
    ) {
        let mut state = lock_state!(self, reply);
        let path = path_of!(state, ino, reply);
        match state.core.fsync(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn opendir(&mut self, req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let mut state = lock_state!(self, reply);
        let path = path_of!(state, ino, reply);
        match state.core.getattr(&path, caller_of(req)) {
            Ok(attr) if attr.kind() == FuserFileType::Directory => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let mut state = lock_state!(self, reply);
        let path = path_of!(state, ino, reply);
        debug!(%path, offset, "readdir");

        let children = match state.core.readdir(&path) {
            Ok(children) => children,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };

        let parent_path = crate::mapper::parent_key(&path);
        let parent_ino = if parent_path.is_empty() || parent_path == "/" {
            ROOT_INODE
        } else {
            state.inodes.assign(parent_path)
        };

        let mut entries: Vec<(u64, FuserFileType, String)> = vec![
            (ino, FuserFileType::Directory, ".".to_string()),
            (parent_ino, FuserFileType::Directory, "..".to_string()),
        ];
        for (name, kind) in children {
            let entry_path = child_path(&path, &name);
            let entry_ino = state.inodes.assign(&entry_path);
            entries.push((entry_ino, kind_to_fuser(kind), name));
        }

        for (i, (entry_ino, kind, name)) in
            entries.iter().enumerate().skip(offset.max(0) as usize)
        {
            if reply.add(*entry_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let state = lock_state!(self, reply);
        let s = state.core.statfs();
        reply.statfs(
            s.blocks, s.bfree, s.bavail, s.files, s.ffree, s.bsize, s.namelen, s.frsize,
        );
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _newparent: u64,
        _newname: &OsStr,
        reply: ReplyEntry,
    ) {
        reply.error(FsError::Unsupported("link").to_errno());
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(FsError::Unsupported("setxattr").to_errno());
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _name: &OsStr,
        _size: u32,
        reply: ReplyXattr,
    ) {
        reply.error(FsError::Unsupported("getxattr").to_errno());
    }

    fn listxattr(&mut self, _req: &Request<'_>, _ino: u64, _size: u32, reply: ReplyXattr) {
        reply.error(FsError::Unsupported("listxattr").to_errno());
    }

    fn removexattr(&mut self, _req: &Request<'_>, _ino: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(FsError::Unsupported("removexattr").to_errno());
    }

    fn access(&mut self, _req: &Request<'_>, _ino: u64, _mask: i32, reply: ReplyEmpty) {
        // default_permissions puts enforcement in the kernel.
        reply.ok();
    }
}
