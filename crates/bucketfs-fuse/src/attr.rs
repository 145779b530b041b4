//! Attribute replies and the caller context.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bucketfs_store::Envelope;

/// Block size reported on every attribute reply.
pub const BLKSIZE: u32 = 262_144;
/// Synthetic device number.
pub const DEV: u64 = 1;
/// Inode of the bucket root.
pub const ROOT_INODE: u64 = 1;

/// Credentials of the request being served.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    /// Requesting uid.
    pub uid: u32,
    /// Requesting gid.
    pub gid: u32,
}

/// A stat-shaped attribute reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    /// Synthetic device number, fixed.
    pub dev: u64,
    /// Synthetic inode, hashed from the key.
    pub ino: u64,
    /// File-type plus permission bits.
    pub mode: u32,
    /// Link count, fixed at 1.
    pub nlink: u32,
    /// Reported owner uid (the caller's).
    pub uid: u32,
    /// Reported owner gid (the caller's).
    pub gid: u32,
    /// Device id, fixed at 0.
    pub rdev: u32,
    /// Size in bytes.
    pub size: u64,
    /// Access time, seconds since epoch.
    pub atime: i64,
    /// Modification time, seconds since epoch.
    pub mtime: i64,
    /// Change time, seconds since epoch.
    pub ctime: i64,
    /// Preferred I/O block size.
    pub blksize: u32,
    /// Block count at `blksize` granularity.
    pub blocks: u64,
}

/// Synthetic inode for a key: its 64-bit hash truncated to 63 bits. The
/// root (empty key) is pinned to 1.
pub fn key_inode(key: &str) -> u64 {
    if key.is_empty() {
        return ROOT_INODE;
    }
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() & 0x7fff_ffff_ffff_ffff
}

impl FileAttributes {
    /// Builds the reply for a key from its envelope and the caller.
    pub fn from_envelope(key: &str, envelope: &Envelope, caller: Caller) -> Self {
        FileAttributes {
            dev: DEV,
            ino: key_inode(key),
            mode: envelope.mode,
            nlink: 1,
            uid: caller.uid,
            gid: caller.gid,
            rdev: 0,
            size: envelope.size,
            atime: envelope.atime,
            mtime: envelope.mtime,
            ctime: envelope.ctime,
            blksize: BLKSIZE,
            blocks: envelope.size / BLKSIZE as u64,
        }
    }

    /// The fuser file type for this mode.
    pub fn kind(&self) -> fuser::FileType {
        mode_to_kind(self.mode)
    }

    /// Converts to the fuser reply struct under a bridge-assigned inode.
    pub fn to_fuser(&self, ino: u64) -> fuser::FileAttr {
        fuser::FileAttr {
            ino,
            size: self.size,
            blocks: self.blocks,
            atime: epoch_to_system(self.atime),
            mtime: epoch_to_system(self.mtime),
            ctime: epoch_to_system(self.ctime),
            crtime: UNIX_EPOCH,
            kind: self.kind(),
            perm: (self.mode & 0o7777) as u16,
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: self.rdev,
            blksize: self.blksize,
            flags: 0,
        }
    }
}

/// Maps mode file-type bits to the fuser file type.
pub fn mode_to_kind(mode: u32) -> fuser::FileType {
    match mode & libc::S_IFMT {
        libc::S_IFDIR => fuser::FileType::Directory,
        libc::S_IFLNK => fuser::FileType::Symlink,
        _ => fuser::FileType::RegularFile,
    }
}

fn epoch_to_system(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH
    }
}
