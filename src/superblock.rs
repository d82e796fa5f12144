//! The mounted volume.

use alloc::{boxed::Box, sync::Arc};
use core::mem::size_of;

use log::{info, warn};
use serde::Serialize;
use spin::Mutex;

use crate::{
    common::{
        DeviceId, NodeKind, SfsPermission, SfsTimeSpec, SFS_MAGIC,
        SFS_MAX_LFS_FILESIZE, SFS_NAME_MAX,
    },
    config::MountOptions,
    inode::{Inode, InodeRef},
    storage::StorageLayer,
    SfsError, SfsResult,
};

/// Volume-wide parameters every node of the volume points at.
pub struct SuperParams {
    pub(crate) storage: Arc<dyn StorageLayer>,
    magic: u32,
    block_size: u32,
    block_size_bits: u8,
    max_bytes: u64,
    /// Timestamp granularity in nanoseconds
    time_gran: u32,
    /// Serializes renames so cycle checks see a stable tree
    pub(crate) rename_lock: Mutex<()>,
}

impl SuperParams {
    pub(crate) fn now(&self) -> SfsTimeSpec {
        self.storage.current_time(self.time_gran)
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }
}

/// Private per-volume state. Only samplefs looks at it.
#[derive(Debug)]
pub struct SfsSbInfo {
    pub options: MountOptions,
    pub mount_flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SfsFsStat {
    pub f_type: u32,
    pub f_bsize: u32,
    pub f_blocks: u64,
    pub f_bfree: u64,
    pub f_bavail: u64,
    pub f_files: u64,
    pub f_ffree: u64,
    pub f_namelen: u32,
}

/// A mounted samplefs volume. Owns the root and through it the whole tree.
pub struct SfsSuperBlock {
    params: Arc<SuperParams>,
    root: Mutex<Option<InodeRef>>,
    fs_info: Mutex<Option<Box<SfsSbInfo>>>,
}

impl SfsSuperBlock {
    /// Set up a fresh volume on `storage`.
    ///
    /// Each step undoes the previous ones when it fails, so a failed mount
    /// leaves nothing allocated behind.
    pub fn fill_super(
        storage: Arc<dyn StorageLayer>,
        mount_flags: u32,
        options: MountOptions,
    ) -> SfsResult<Self> {
        let params = Arc::new(SuperParams {
            storage: storage.clone(),
            magic: SFS_MAGIC,
            block_size: options.block_size(),
            block_size_bits: options.block_size_bits,
            max_bytes: SFS_MAX_LFS_FILESIZE,
            time_gran: options.time_gran,
            rename_lock: Mutex::new(()),
        });

        info!("samplefs: fill super");
        let root = Inode::new_inode(
            &params,
            NodeKind::Directory,
            SfsPermission::S_IFDIR | options.root_perm(),
            None,
        )
        .map_err(|e| {
            warn!("samplefs: no root inode: {}", e);
            SfsError::NoMemory
        })?;
        {
            let mut inner = root.lock();
            if let Some(uid) = options.uid {
                inner.uid = uid;
            }
            if let Some(gid) = options.gid {
                inner.gid = gid;
            }
            inner.set_parent(&root);
        }

        if let Err(e) = storage.allocate_private(size_of::<SfsSbInfo>()) {
            warn!("samplefs: no private state: {}", e);
            drop(root);
            return Err(SfsError::NoMemory);
        }
        let fs_info = Box::new(SfsSbInfo {
            options,
            mount_flags,
        });

        info!("samplefs: about to alloc root handle for inode {}", root.ino());
        if let Err(e) = storage.materialize_root(root.ino()) {
            warn!("samplefs: no root handle: {}", e);
            drop(root);
            drop(fs_info);
            storage.release_private(size_of::<SfsSbInfo>());
            return Err(SfsError::NoMemory);
        }

        Ok(Self {
            params,
            root: Mutex::new(Some(root)),
            fs_info: Mutex::new(Some(fs_info)),
        })
    }

    /// The root directory, `NotMounted` once the volume was torn down.
    pub fn root(&self) -> SfsResult<InodeRef> {
        self.root.lock().clone().ok_or(SfsError::NotMounted)
    }

    /// Node factory entry point: a node that is not linked anywhere yet.
    pub fn new_inode(
        &self,
        kind: NodeKind,
        perm: SfsPermission,
        rdev: Option<DeviceId>,
    ) -> SfsResult<InodeRef> {
        Inode::new_inode(&self.params, kind, perm, rdev)
    }

    /// Release the private state. A no-op when it is already gone.
    pub fn put_super(&self) {
        let Some(fs_info) = self.fs_info.lock().take() else {
            // Empty superblock info passed to unmount
            return;
        };
        drop(fs_info);
        self.params
            .storage
            .release_private(size_of::<SfsSbInfo>());
    }

    /// Tear the volume down: private state first, then the node tree.
    /// Safe to call more than once.
    pub fn kill_sb(&self) {
        self.put_super();
        let root = self.root.lock().take();
        if let Some(root) = root {
            info!("samplefs: unmounting, root inode {}", root.ino());
            self.params.storage.reclaim_tree(root);
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.root.lock().is_some()
    }

    pub fn statfs(&self) -> SfsFsStat {
        SfsFsStat {
            f_type: self.params.magic,
            f_bsize: self.params.block_size,
            f_blocks: 0,
            f_bfree: 0,
            f_bavail: 0,
            f_files: 0,
            f_ffree: 0,
            f_namelen: SFS_NAME_MAX as u32,
        }
    }

    pub fn magic(&self) -> u32 {
        self.params.magic
    }

    pub fn block_size(&self) -> u32 {
        self.params.block_size
    }

    pub fn block_size_bits(&self) -> u8 {
        self.params.block_size_bits
    }

    pub fn max_bytes(&self) -> u64 {
        self.params.max_bytes
    }

    pub fn time_gran(&self) -> u32 {
        self.params.time_gran
    }

    /// Options the volume was mounted with, `None` after `put_super`.
    pub fn mount_options(&self) -> Option<MountOptions> {
        self.fs_info.lock().as_ref().map(|info| info.options.clone())
    }

    pub fn mount_flags(&self) -> Option<u32> {
        self.fs_info.lock().as_ref().map(|info| info.mount_flags)
    }
}

impl Drop for SfsSuperBlock {
    fn drop(&mut self) {
        self.kill_sb();
    }
}
