//! Namespace nodes and the factory that creates them.

use alloc::{
    collections::BTreeMap,
    string::String,
    sync::{Arc, Weak},
    vec::Vec,
};
use core::mem;

use log::debug;
use spin::{Mutex, MutexGuard};

use crate::{
    attr::NodeOperations,
    common::{DeviceId, NodeKind, SfsPermission, SfsTimeSpec},
    namespace::Directory,
    superblock::SuperParams,
    SfsError, SfsResult,
};

pub type InodeRef = Arc<Inode>;

/// A namespace node.
///
/// Directories own their children through the entry map. A child directory
/// only keeps a `Weak` pointer back to its parent.
pub struct Inode {
    sb: Arc<SuperParams>,
    ino: u64,
    kind: NodeKind,
    inner: Mutex<InodeInner>,
}

pub(crate) struct InodeInner {
    pub(crate) mode: SfsPermission,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    pub(crate) nlink: u32,
    /// Informational only, see `SFS_BOGO_DIRENT_SIZE`
    pub(crate) size: u64,
    pub(crate) blocks: u64,
    pub(crate) atime: SfsTimeSpec,
    pub(crate) mtime: SfsTimeSpec,
    pub(crate) ctime: SfsTimeSpec,
    pub(crate) data: InodeData,
}

pub(crate) enum InodeData {
    /// Contents live in the storage layer
    File,
    Directory {
        entries: BTreeMap<String, InodeRef>,
        parent: Weak<Inode>,
    },
    Symlink {
        target: String,
    },
    /// `rdev` is only set for char and block devices
    Special {
        rdev: Option<DeviceId>,
    },
}

impl InodeInner {
    pub(crate) fn entries(&self) -> &BTreeMap<String, InodeRef> {
        match &self.data {
            InodeData::Directory { entries, .. } => entries,
            _ => unreachable!("entries() on a non-directory node"),
        }
    }

    pub(crate) fn entries_mut(&mut self) -> &mut BTreeMap<String, InodeRef> {
        match &mut self.data {
            InodeData::Directory { entries, .. } => entries,
            _ => unreachable!("entries_mut() on a non-directory node"),
        }
    }

    pub(crate) fn set_parent(&mut self, new_parent: &InodeRef) {
        if let InodeData::Directory { parent, .. } = &mut self.data {
            *parent = Arc::downgrade(new_parent);
        }
    }

    /// Detach every child of a directory, leaving it empty.
    fn take_children(&mut self) -> Vec<InodeRef> {
        match &mut self.data {
            InodeData::Directory { entries, .. } => mem::take(entries).into_values().collect(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn drop_nlink(&mut self) {
        self.nlink = self.nlink.saturating_sub(1);
    }

    pub(crate) fn touch_dir(&mut self, now: SfsTimeSpec) {
        self.mtime = now;
        self.ctime = now;
    }
}

impl Inode {
    /// Allocate a node of `kind`.
    ///
    /// Owner and group come from the caller's effective identity, the three
    /// timestamps from a single clock sample. Kind bits in `perm` are replaced
    /// by those of `kind`. Nothing is created when the storage layer refuses
    /// the allocation.
    pub(crate) fn new_inode(
        sb: &Arc<SuperParams>,
        kind: NodeKind,
        perm: SfsPermission,
        rdev: Option<DeviceId>,
    ) -> SfsResult<InodeRef> {
        let ino = sb.storage.allocate_node()?;
        let creds = sb.storage.current_credentials();
        let now = sb.now();

        let (nlink, data) = match kind {
            // "." plus the entry in the parent
            NodeKind::Directory => (
                2,
                InodeData::Directory {
                    entries: BTreeMap::new(),
                    parent: Weak::new(),
                },
            ),
            NodeKind::Regular => (1, InodeData::File),
            NodeKind::Symlink => (
                1,
                InodeData::Symlink {
                    target: String::new(),
                },
            ),
            NodeKind::CharDevice | NodeKind::BlockDevice => (
                1,
                InodeData::Special {
                    rdev: Some(rdev.unwrap_or_default()),
                },
            ),
            NodeKind::Fifo | NodeKind::Socket => (1, InodeData::Special { rdev: None }),
        };

        debug!("samplefs: new {:?} inode {}", kind, ino);
        Ok(Arc::new(Self {
            sb: sb.clone(),
            ino,
            kind,
            inner: Mutex::new(InodeInner {
                mode: perm.without_kind() | kind.kind_bits(),
                uid: creds.uid,
                gid: creds.gid,
                nlink,
                size: 0,
                blocks: 0,
                atime: now,
                mtime: now,
                ctime: now,
                data,
            }),
        }))
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn nlink(&self) -> u32 {
        self.lock().nlink
    }

    pub(crate) fn sb(&self) -> &Arc<SuperParams> {
        &self.sb
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, InodeInner> {
        self.inner.lock()
    }

    pub(crate) fn same_volume(&self, other: &Inode) -> bool {
        Arc::ptr_eq(&self.sb, &other.sb)
    }

    /// Parent of a directory. The root, and directories whose parent is
    /// already gone, report themselves.
    pub(crate) fn parent(self: &Arc<Self>) -> InodeRef {
        let parent = match &self.lock().data {
            InodeData::Directory { parent, .. } => parent.upgrade(),
            _ => None,
        };
        parent.unwrap_or_else(|| self.clone())
    }

    /// Whether `self` is `node` or one of its ancestors.
    pub(crate) fn is_ancestor_of(self: &Arc<Self>, node: &InodeRef) -> bool {
        let mut cur = node.clone();
        loop {
            if Arc::ptr_eq(self, &cur) {
                return true;
            }
            let parent = cur.parent();
            if Arc::ptr_eq(&parent, &cur) {
                return false;
            }
            cur = parent;
        }
    }

    /// Capability view matching the node's kind.
    pub fn ops(self: &Arc<Self>) -> NodeOps<'_> {
        match self.kind {
            NodeKind::Regular => NodeOps::Regular(RegularFile(self)),
            NodeKind::Directory => NodeOps::Directory(Directory::new(self)),
            NodeKind::Symlink => NodeOps::Symlink(Symlink(self)),
            _ => NodeOps::Special(SpecialNode(self)),
        }
    }

    pub fn as_dir(self: &Arc<Self>) -> SfsResult<Directory<'_>> {
        match self.ops() {
            NodeOps::Directory(dir) => Ok(dir),
            _ => Err(SfsError::NotDir),
        }
    }

    pub fn as_symlink(self: &Arc<Self>) -> SfsResult<Symlink<'_>> {
        match self.ops() {
            NodeOps::Symlink(link) => Ok(link),
            _ => Err(SfsError::InvalidOperation),
        }
    }
}

impl Drop for Inode {
    fn drop(&mut self) {
        debug!("samplefs: releasing inode {}", self.ino);
        self.sb.storage.release_node(self.ino);

        // Children whose last reference we hold are emptied here before they
        // drop, so tearing down a deep tree never nests one drop in another.
        let mut pending = self.inner.get_mut().take_children();
        while let Some(child) = pending.pop() {
            if let Ok(mut child) = Arc::try_unwrap(child) {
                pending.extend(child.inner.get_mut().take_children());
            }
        }
    }
}

/// Per-kind operations of a node. Each variant only carries what makes sense
/// for its kind; byte I/O on regular files belongs to the storage layer.
pub enum NodeOps<'a> {
    Regular(RegularFile<'a>),
    Directory(Directory<'a>),
    Symlink(Symlink<'a>),
    Special(SpecialNode<'a>),
}

pub struct RegularFile<'a>(&'a InodeRef);

impl NodeOperations for RegularFile<'_> {
    fn inode(&self) -> &InodeRef {
        self.0
    }
}

pub struct Symlink<'a>(&'a InodeRef);

impl Symlink<'_> {
    pub fn readlink(&self) -> String {
        match &self.0.lock().data {
            InodeData::Symlink { target } => target.clone(),
            _ => unreachable!("symlink view over a non-symlink node"),
        }
    }
}

impl NodeOperations for Symlink<'_> {
    fn inode(&self) -> &InodeRef {
        self.0
    }
}

/// Device, fifo or socket node.
pub struct SpecialNode<'a>(&'a InodeRef);

impl SpecialNode<'_> {
    pub fn rdev(&self) -> Option<DeviceId> {
        match &self.0.lock().data {
            InodeData::Special { rdev } => *rdev,
            _ => None,
        }
    }
}

impl NodeOperations for SpecialNode<'_> {
    fn inode(&self) -> &InodeRef {
        self.0
    }
}
