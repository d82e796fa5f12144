//! Metadata queries and updates.

use serde::Serialize;

use crate::{
    common::{NodeKind, SfsPermission, SfsTimeSpec},
    inode::{Inode, InodeData, InodeRef},
};

/// Snapshot of a node's metadata, the equivalent of `struct stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeAttr {
    pub ino: u64,
    pub kind: NodeKind,
    /// Kind and permission bits
    pub mode: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u32,
    pub blocks: u64,
    pub atime: SfsTimeSpec,
    pub mtime: SfsTimeSpec,
    pub ctime: SfsTimeSpec,
}

/// Fields to change in [`Inode::setattr`]; `None` leaves a field alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetAttr {
    /// New permission bits, kind bits are ignored
    pub mode: Option<u16>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub atime: Option<SfsTimeSpec>,
    pub mtime: Option<SfsTimeSpec>,
}

/// Operations every kind of node supports.
pub trait NodeOperations {
    fn inode(&self) -> &InodeRef;

    fn getattr(&self) -> NodeAttr {
        self.inode().getattr()
    }
}

impl Inode {
    pub fn getattr(&self) -> NodeAttr {
        let inner = self.lock();
        let rdev = match &inner.data {
            InodeData::Special { rdev: Some(dev) } => dev.encode(),
            _ => 0,
        };
        NodeAttr {
            ino: self.ino(),
            kind: self.kind(),
            mode: inner.mode.bits(),
            nlink: inner.nlink,
            uid: inner.uid,
            gid: inner.gid,
            rdev,
            size: inner.size,
            blksize: self.sb().block_size(),
            blocks: inner.blocks,
            atime: inner.atime,
            mtime: inner.mtime,
            ctime: inner.ctime,
        }
    }

    /// Apply `attr`. The kind never changes; ctime moves when anything did.
    pub fn setattr(&self, attr: SetAttr) {
        if attr == SetAttr::default() {
            return;
        }
        let now = self.sb().now();
        let mut inner = self.lock();
        if let Some(mode) = attr.mode {
            let perm = SfsPermission::from_bits_truncate(mode).without_kind();
            inner.mode = perm | self.kind().kind_bits();
        }
        if let Some(uid) = attr.uid {
            inner.uid = uid;
        }
        if let Some(gid) = attr.gid {
            inner.gid = gid;
        }
        if let Some(atime) = attr.atime {
            inner.atime = atime;
        }
        if let Some(mtime) = attr.mtime {
            inner.mtime = mtime;
        }
        inner.ctime = now;
    }
}
