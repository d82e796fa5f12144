//! samplefs: the namespace core of a minimal hierarchical filesystem.
//!
//! samplefs creates, links and removes nodes inside one mounted volume and
//! manages the volume's root. File contents, caching and block management
//! belong to the [`StorageLayer`] the volume is mounted on.
//!
//! ```ignore
//! let storage = MemStorage::new().into_arc();
//! let registry = FsRegistry::new();
//! let registration = registry.register(Arc::new(SfsFsType::new(storage)))?;
//! let sb = registry.mount(SFS_NAME, 0, b"")?;
//! let root = sb.root()?;
//! root.as_dir()?.make_directory("a", SfsPermission::from_bits_truncate(0o755))?;
//! sb.kill_sb();
//! registration.unregister();
//! ```
#![cfg_attr(not(test), no_std)]
extern crate alloc;

mod attr;
mod common;
mod config;
mod error;
mod fstype;
mod inode;
mod namespace;
pub mod storage;
mod superblock;

#[cfg(test)]
mod mount_test;

pub use attr::{NodeAttr, NodeOperations, SetAttr};
pub use common::{
    Credentials, DeviceId, NodeKind, SfsPermission, SfsTimeSpec, SFS_BOGO_DIRENT_SIZE, SFS_MAGIC,
    SFS_NAME, SFS_NAME_MAX, SFS_PATH_MAX,
};
pub use config::MountOptions;
pub use error::{SfsError, SfsResult};
pub use fstype::{FileSystemType, FsRegistry, Registration, SfsFsType};
pub use inode::{Inode, InodeRef, NodeOps, RegularFile, SpecialNode, Symlink};
pub use namespace::{DirEntry, Directory, RenameFlags};
pub use storage::{MemStorage, StorageFaults, StorageLayer};
pub use superblock::{SfsFsStat, SfsSbInfo, SfsSuperBlock};
