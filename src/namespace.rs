//! Directory-mutating operations.
//!
//! Every operation here works on the [`Directory`] view of a directory node and
//! holds that directory's lock for the whole mutation. `rename` also takes the
//! volume-wide rename lock and locks both parents, lower inode number first.
//! Parents are always locked before their children.

use alloc::{string::String, sync::Arc, vec, vec::Vec};
use core::ptr;

use bitflags::bitflags;
use log::{debug, warn};
use serde::Serialize;
use spin::MutexGuard;

use crate::{
    attr::NodeOperations,
    common::{
        check_name, DeviceId, NodeKind, SfsPermission, SFS_BOGO_DIRENT_SIZE, SFS_NAME_MAX,
        SFS_PATH_MAX,
    },
    inode::{Inode, InodeData, InodeInner, InodeRef},
    SfsError, SfsResult,
};

bitflags! {
    pub struct RenameFlags: u32 {
        /// Fail instead of replacing an existing target
        const NOREPLACE = 1 << 0;
        /// Atomically swap source and target
        const EXCHANGE = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub ino: u64,
    pub kind: NodeKind,
}

/// Directory view of a node.
pub struct Directory<'a> {
    inode: &'a InodeRef,
}

impl NodeOperations for Directory<'_> {
    fn inode(&self) -> &InodeRef {
        self.inode
    }
}

impl<'a> Directory<'a> {
    pub(crate) fn new(inode: &'a InodeRef) -> Self {
        Self { inode }
    }

    /// Create a node named `name` of `kind`.
    ///
    /// A set-group-id directory hands its group to the new node, and its
    /// set-group-id bit to new directories. Creating a directory adds the
    /// child's `..` link to this directory.
    pub fn make_node(
        &self,
        name: &str,
        kind: NodeKind,
        perm: SfsPermission,
        rdev: Option<DeviceId>,
    ) -> SfsResult<InodeRef> {
        check_name(name)?;
        let sb = self.inode.sb();
        let mut dir = self.inode.lock();
        check_live(&dir)?;
        if dir.entries().contains_key(name) {
            return Err(SfsError::AlreadyExists);
        }

        let node = Inode::new_inode(sb, kind, perm, rdev).map_err(|e| {
            warn!("samplefs: no inode for {}: {}", name, e);
            SfsError::NoSpace
        })?;
        {
            let mut child = node.lock();
            if dir.mode.contains(SfsPermission::S_ISGID) {
                child.gid = dir.gid;
                if kind.is_dir() {
                    child.mode |= SfsPermission::S_ISGID;
                }
            }
            if kind.is_dir() {
                child.set_parent(self.inode);
            }
        }

        dir.entries_mut().insert(String::from(name), node.clone());
        dir.touch_dir(sb.now());
        dir.size += SFS_BOGO_DIRENT_SIZE;
        if kind.is_dir() {
            dir.nlink += 1;
        }
        debug!(
            "samplefs: mknod {} -> {:?} inode {} in {}",
            name,
            kind,
            node.ino(),
            self.inode.ino()
        );
        Ok(node)
    }

    pub fn create(&self, name: &str, perm: SfsPermission) -> SfsResult<InodeRef> {
        self.make_node(name, NodeKind::Regular, perm, None)
    }

    pub fn make_directory(&self, name: &str, perm: SfsPermission) -> SfsResult<InodeRef> {
        self.make_node(name, NodeKind::Directory, perm, None)
    }

    /// Create a symlink to `target`.
    ///
    /// The target is persisted by the storage layer before the entry becomes
    /// visible. If that fails the fresh node is released and the directory is
    /// left as it was.
    pub fn make_symlink(&self, name: &str, target: &str) -> SfsResult<InodeRef> {
        check_name(name)?;
        if target.is_empty() {
            return Err(SfsError::InvalidName);
        }
        if target.len() >= SFS_PATH_MAX {
            return Err(SfsError::NameTooLong);
        }
        let sb = self.inode.sb();
        let mut dir = self.inode.lock();
        check_live(&dir)?;
        if dir.entries().contains_key(name) {
            return Err(SfsError::AlreadyExists);
        }

        let node = Inode::new_inode(sb, NodeKind::Symlink, SfsPermission::S_IRWXUGO, None)
            .map_err(|_| SfsError::NoSpace)?;
        if let Err(e) = sb.storage.persist_symlink_target(node.ino(), target) {
            warn!(
                "samplefs: symlink {} lost its target ({}), dropping inode {}",
                name,
                e,
                node.ino()
            );
            drop(node);
            return Err(e);
        }
        {
            let mut link = node.lock();
            link.data = InodeData::Symlink {
                target: String::from(target),
            };
            link.size = target.len() as u64;
            if dir.mode.contains(SfsPermission::S_ISGID) {
                link.gid = dir.gid;
            }
        }

        dir.entries_mut().insert(String::from(name), node.clone());
        dir.touch_dir(sb.now());
        debug!("samplefs: symlink {} -> {}", name, target);
        Ok(node)
    }

    /// Add another name for `existing`.
    pub fn link(&self, existing: &InodeRef, name: &str) -> SfsResult<()> {
        check_name(name)?;
        if !self.inode.same_volume(existing) {
            return Err(SfsError::CrossVolume);
        }
        if existing.kind().is_dir() {
            return Err(SfsError::InvalidOperation);
        }
        let now = self.inode.sb().now();
        let mut dir = self.inode.lock();
        check_live(&dir)?;
        if dir.entries().contains_key(name) {
            return Err(SfsError::AlreadyExists);
        }
        {
            let mut node = existing.lock();
            // already unlinked everywhere
            if node.nlink == 0 {
                return Err(SfsError::NotFound);
            }
            node.nlink += 1;
            node.ctime = now;
        }
        dir.entries_mut().insert(String::from(name), existing.clone());
        dir.touch_dir(now);
        debug!("samplefs: link {} -> inode {}", name, existing.ino());
        Ok(())
    }

    /// Remove the entry `name`. The node goes back to the storage layer once
    /// its last link and last reference are gone.
    pub fn unlink(&self, name: &str) -> SfsResult<()> {
        check_name(name)?;
        let now = self.inode.sb().now();
        let mut dir = self.inode.lock();
        match dir.entries().get(name) {
            None => return Err(SfsError::NotFound),
            Some(node) if node.kind().is_dir() => return Err(SfsError::IsDir),
            Some(_) => {}
        }
        let node = dir
            .entries_mut()
            .remove(name)
            .ok_or(SfsError::NotFound)?;
        let nlink = {
            let mut inner = node.lock();
            inner.drop_nlink();
            inner.ctime = now;
            inner.nlink
        };
        dir.touch_dir(now);
        drop(dir);
        debug!(
            "samplefs: unlink {} (inode {}, {} links left)",
            name,
            node.ino(),
            nlink
        );
        Ok(())
    }

    /// Remove the empty directory `name`.
    pub fn remove_directory(&self, name: &str) -> SfsResult<()> {
        check_name(name)?;
        let now = self.inode.sb().now();
        let mut dir = self.inode.lock();
        let child = dir.entries().get(name).cloned().ok_or(SfsError::NotFound)?;
        if !child.kind().is_dir() {
            return Err(SfsError::NotDir);
        }
        {
            let mut inner = child.lock();
            if !inner.entries().is_empty() {
                return Err(SfsError::NotEmpty);
            }
            inner.nlink = 0;
            inner.ctime = now;
        }
        dir.entries_mut().remove(name);
        dir.drop_nlink();
        dir.touch_dir(now);
        debug!("samplefs: rmdir {} (inode {})", name, child.ino());
        Ok(())
    }

    /// Move `old_name` in this directory to `new_name` in `new_dir`.
    ///
    /// Cycle checks walk up the tree and so run before the parents are
    /// locked. Once both parents are held the source and target are looked up
    /// again; if either changed in between, the rename starts over.
    pub fn rename(
        &self,
        old_name: &str,
        new_dir: &Directory<'_>,
        new_name: &str,
        flags: RenameFlags,
    ) -> SfsResult<()> {
        check_name(old_name)?;
        check_name(new_name)?;
        if flags.contains(RenameFlags::NOREPLACE | RenameFlags::EXCHANGE) {
            return Err(SfsError::InvalidOperation);
        }
        let old_parent = self.inode;
        let new_parent = new_dir.inode;
        if !old_parent.same_volume(new_parent) {
            return Err(SfsError::CrossVolume);
        }
        let _rename = old_parent.sb().rename_lock.lock();
        let same_dir = Arc::ptr_eq(old_parent, new_parent);

        loop {
            let source = self.lookup(old_name)?;
            if same_dir && old_name == new_name {
                return Ok(());
            }
            let target = new_parent.lock().entries().get(new_name).cloned();
            if source.kind().is_dir() && source.is_ancestor_of(new_parent) {
                return Err(SfsError::InvalidOperation);
            }
            if let Some(target) = &target {
                if flags.contains(RenameFlags::EXCHANGE)
                    && target.kind().is_dir()
                    && target.is_ancestor_of(old_parent)
                {
                    return Err(SfsError::InvalidOperation);
                }
            }

            let mut parents = LockedParents::lock(old_parent, new_parent);
            let source_held = parents
                .old_dir()
                .entries()
                .get(old_name)
                .map_or(false, |node| Arc::ptr_eq(node, &source));
            let target_held = parents.new_dir().entries().get(new_name).map(Arc::as_ptr)
                == target.as_ref().map(Arc::as_ptr);
            if !(source_held && target_held) {
                debug!("samplefs: rename of {} raced a concurrent update, retrying", old_name);
                continue;
            }

            return self.rename_locked(
                &mut parents,
                old_name,
                new_dir,
                new_name,
                flags,
                source,
                target,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rename_locked(
        &self,
        parents: &mut LockedParents<'_>,
        old_name: &str,
        new_dir: &Directory<'_>,
        new_name: &str,
        flags: RenameFlags,
        source: InodeRef,
        target: Option<InodeRef>,
    ) -> SfsResult<()> {
        let old_parent = self.inode;
        let new_parent = new_dir.inode;
        check_live(parents.new_dir())?;
        if let Some(target) = &target {
            if Arc::ptr_eq(target, &source) {
                return Ok(());
            }
        }
        if flags.contains(RenameFlags::EXCHANGE) {
            let target = target.ok_or(SfsError::NotFound)?;
            return self.exchange(parents, old_name, new_dir, new_name, source, target);
        }

        let src_is_dir = source.kind().is_dir();
        if let Some(victim) = &target {
            if flags.contains(RenameFlags::NOREPLACE) {
                return Err(SfsError::AlreadyExists);
            }
            match (src_is_dir, victim.kind().is_dir()) {
                (true, false) => return Err(SfsError::NotDir),
                (false, true) => return Err(SfsError::IsDir),
                // the old parent holds the source, and its lock is ours already
                (true, true)
                    if Arc::ptr_eq(victim, old_parent) || !victim.lock().entries().is_empty() =>
                {
                    return Err(SfsError::NotEmpty)
                }
                _ => {}
            }
        }

        let now = old_parent.sb().now();
        parents.old_dir().entries_mut().remove(old_name);
        let victim = parents
            .new_dir()
            .entries_mut()
            .insert(String::from(new_name), source.clone());

        if let Some(victim) = &victim {
            let mut inner = victim.lock();
            inner.drop_nlink();
            inner.ctime = now;
            if src_is_dir {
                // the victim's "." and the source's ".." leaving the old parent
                inner.drop_nlink();
                parents.old_dir().drop_nlink();
            }
        } else if src_is_dir {
            parents.old_dir().drop_nlink();
            parents.new_dir().nlink += 1;
        }
        {
            let mut inner = source.lock();
            inner.ctime = now;
            if src_is_dir && !Arc::ptr_eq(old_parent, new_parent) {
                inner.set_parent(new_parent);
            }
        }
        parents.old_dir().touch_dir(now);
        parents.new_dir().touch_dir(now);

        debug!(
            "samplefs: rename {}/{} -> {}/{}{}",
            old_parent.ino(),
            old_name,
            new_parent.ino(),
            new_name,
            if victim.is_some() { " (replaced)" } else { "" }
        );
        Ok(())
    }

    fn exchange(
        &self,
        parents: &mut LockedParents<'_>,
        old_name: &str,
        new_dir: &Directory<'_>,
        new_name: &str,
        source: InodeRef,
        target: InodeRef,
    ) -> SfsResult<()> {
        let old_parent = self.inode;
        let new_parent = new_dir.inode;
        let same_dir = Arc::ptr_eq(old_parent, new_parent);
        let src_is_dir = source.kind().is_dir();
        let tgt_is_dir = target.kind().is_dir();
        let now = old_parent.sb().now();

        parents
            .new_dir()
            .entries_mut()
            .insert(String::from(new_name), source.clone());
        parents
            .old_dir()
            .entries_mut()
            .insert(String::from(old_name), target.clone());

        if !same_dir && src_is_dir != tgt_is_dir {
            if src_is_dir {
                parents.old_dir().drop_nlink();
                parents.new_dir().nlink += 1;
            } else {
                parents.new_dir().drop_nlink();
                parents.old_dir().nlink += 1;
            }
        }
        for (node, parent) in [(&source, new_parent), (&target, old_parent)] {
            let mut inner = node.lock();
            inner.ctime = now;
            if !same_dir {
                inner.set_parent(parent);
            }
        }
        parents.old_dir().touch_dir(now);
        parents.new_dir().touch_dir(now);

        debug!(
            "samplefs: exchange {}/{} <-> {}/{}",
            old_parent.ino(),
            old_name,
            new_parent.ino(),
            new_name
        );
        Ok(())
    }

    /// Find `name`. `.` is this directory, `..` its parent.
    pub fn lookup(&self, name: &str) -> SfsResult<InodeRef> {
        match name {
            "." => Ok(self.inode.clone()),
            ".." => Ok(self.inode.parent()),
            _ if name.len() > SFS_NAME_MAX => Err(SfsError::NameTooLong),
            _ => self
                .inode
                .lock()
                .entries()
                .get(name)
                .cloned()
                .ok_or(SfsError::NotFound),
        }
    }

    /// `.`, `..`, then every entry.
    pub fn readdir(&self) -> Vec<DirEntry> {
        let parent = self.inode.parent();
        let mut out = vec![
            DirEntry {
                name: String::from("."),
                ino: self.inode.ino(),
                kind: NodeKind::Directory,
            },
            DirEntry {
                name: String::from(".."),
                ino: parent.ino(),
                kind: NodeKind::Directory,
            },
        ];
        let dir = self.inode.lock();
        out.extend(dir.entries().iter().map(|(name, node)| DirEntry {
            name: name.clone(),
            ino: node.ino(),
            kind: node.kind(),
        }));
        out
    }

    pub fn is_empty(&self) -> bool {
        self.inode.lock().entries().is_empty()
    }
}

/// Removed directories take no new entries.
fn check_live(dir: &InodeInner) -> SfsResult<()> {
    if dir.nlink == 0 {
        return Err(SfsError::NotFound);
    }
    Ok(())
}

/// Locks held on the two parents of a rename.
enum LockedParents<'g> {
    Same(MutexGuard<'g, InodeInner>),
    Pair {
        old: MutexGuard<'g, InodeInner>,
        new: MutexGuard<'g, InodeInner>,
    },
}

impl<'g> LockedParents<'g> {
    fn lock(old: &'g Inode, new: &'g Inode) -> Self {
        if ptr::eq(old, new) {
            return LockedParents::Same(old.lock());
        }
        if old.ino() < new.ino() {
            let old = old.lock();
            let new = new.lock();
            LockedParents::Pair { old, new }
        } else {
            let new = new.lock();
            let old = old.lock();
            LockedParents::Pair { old, new }
        }
    }

    fn old_dir(&mut self) -> &mut InodeInner {
        match self {
            LockedParents::Same(dir) => &mut **dir,
            LockedParents::Pair { old, .. } => &mut **old,
        }
    }

    fn new_dir(&mut self) -> &mut InodeInner {
        match self {
            LockedParents::Same(dir) => &mut **dir,
            LockedParents::Pair { new, .. } => &mut **new,
        }
    }
}
