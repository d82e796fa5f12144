//! The storage/caching layer samplefs delegates to.
//!
//! samplefs only manages node metadata and directory structure. Node ids,
//! symlink payloads, the root handle and the final reclaim of a volume's tree
//! are owned by whatever implements [`StorageLayer`]. [`MemStorage`] is a
//! RAM-only implementation with fault injection, used by the tests and the demo.

use alloc::{collections::BTreeMap, string::String, sync::Arc};
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bitflags::bitflags;
use log::debug;
use spin::Mutex;

use crate::{
    common::{Credentials, SfsTimeSpec},
    inode::InodeRef,
    SfsError, SfsResult,
};

pub trait StorageLayer: Send + Sync {
    /// Hand out the id of a fresh node.
    fn allocate_node(&self) -> SfsResult<u64>;
    /// The last reference to node `ino` is gone.
    fn release_node(&self, ino: u64);
    /// Reserve room for a volume's private state.
    fn allocate_private(&self, bytes: usize) -> SfsResult<()>;
    fn release_private(&self, bytes: usize);
    /// Turn the root node into the handle the host mounts.
    fn materialize_root(&self, ino: u64) -> SfsResult<()>;
    fn persist_symlink_target(&self, ino: u64, target: &str) -> SfsResult<()>;
    /// Tear down every node reachable from `root`.
    fn reclaim_tree(&self, root: InodeRef);
    fn current_credentials(&self) -> Credentials;
    /// Current time rounded down to `gran` nanoseconds.
    fn current_time(&self, gran: u32) -> SfsTimeSpec;
}

bitflags! {
    /// Storage calls that [`MemStorage`] should fail until the fault is cleared.
    #[derive(Default)]
    pub struct StorageFaults: u8 {
        const ALLOCATE_NODE = 1 << 0;
        const ALLOCATE_PRIVATE = 1 << 1;
        const MATERIALIZE_ROOT = 1 << 2;
        const PERSIST_SYMLINK = 1 << 3;
    }
}

/// Nanoseconds the logical clock advances per sample.
const CLOCK_STEP: u64 = 1_000_000;
/// 2023-11-14T22:13:20Z
const CLOCK_EPOCH: u64 = 1_700_000_000 * 1_000_000_000;

pub struct MemStorage {
    next_ino: AtomicU64,
    live_nodes: AtomicUsize,
    max_nodes: Option<usize>,
    private_bytes: AtomicUsize,
    materialized_roots: AtomicUsize,
    reclaimed_trees: AtomicUsize,
    symlinks: Mutex<BTreeMap<u64, String>>,
    creds: Mutex<Credentials>,
    clock: AtomicU64,
    faults: Mutex<StorageFaults>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self {
            next_ino: AtomicU64::new(1),
            live_nodes: AtomicUsize::new(0),
            max_nodes: None,
            private_bytes: AtomicUsize::new(0),
            materialized_roots: AtomicUsize::new(0),
            reclaimed_trees: AtomicUsize::new(0),
            symlinks: Mutex::new(BTreeMap::new()),
            creds: Mutex::new(Credentials::default()),
            clock: AtomicU64::new(CLOCK_EPOCH),
            faults: Mutex::new(StorageFaults::empty()),
        }
    }

    /// Refuse allocations once `max` nodes are alive.
    pub fn with_node_limit(mut self, max: usize) -> Self {
        self.max_nodes = Some(max);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn set_credentials(&self, creds: Credentials) {
        *self.creds.lock() = creds;
    }

    pub fn inject(&self, faults: StorageFaults) {
        self.faults.lock().insert(faults);
    }

    pub fn clear(&self, faults: StorageFaults) {
        self.faults.lock().remove(faults);
    }

    pub fn live_nodes(&self) -> usize {
        self.live_nodes.load(Ordering::SeqCst)
    }

    pub fn private_bytes(&self) -> usize {
        self.private_bytes.load(Ordering::SeqCst)
    }

    pub fn materialized_roots(&self) -> usize {
        self.materialized_roots.load(Ordering::SeqCst)
    }

    pub fn reclaimed_trees(&self) -> usize {
        self.reclaimed_trees.load(Ordering::SeqCst)
    }

    /// The target persisted for symlink `ino`, if it is still alive.
    pub fn symlink_target(&self, ino: u64) -> Option<String> {
        self.symlinks.lock().get(&ino).cloned()
    }

    fn failing(&self, fault: StorageFaults) -> bool {
        self.faults.lock().contains(fault)
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageLayer for MemStorage {
    fn allocate_node(&self) -> SfsResult<u64> {
        if self.failing(StorageFaults::ALLOCATE_NODE) {
            return Err(SfsError::NoSpace);
        }
        if let Some(max) = self.max_nodes {
            if self.live_nodes() >= max {
                return Err(SfsError::NoSpace);
            }
        }
        self.live_nodes.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_ino.fetch_add(1, Ordering::SeqCst))
    }

    fn release_node(&self, ino: u64) {
        self.symlinks.lock().remove(&ino);
        self.live_nodes.fetch_sub(1, Ordering::SeqCst);
    }

    fn allocate_private(&self, bytes: usize) -> SfsResult<()> {
        if self.failing(StorageFaults::ALLOCATE_PRIVATE) {
            return Err(SfsError::NoMemory);
        }
        self.private_bytes.fetch_add(bytes, Ordering::SeqCst);
        Ok(())
    }

    fn release_private(&self, bytes: usize) {
        self.private_bytes.fetch_sub(bytes, Ordering::SeqCst);
    }

    fn materialize_root(&self, ino: u64) -> SfsResult<()> {
        if self.failing(StorageFaults::MATERIALIZE_ROOT) {
            return Err(SfsError::NoMemory);
        }
        debug!("root handle for node {}", ino);
        self.materialized_roots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn persist_symlink_target(&self, ino: u64, target: &str) -> SfsResult<()> {
        if self.failing(StorageFaults::PERSIST_SYMLINK) {
            return Err(SfsError::NoSpace);
        }
        self.symlinks.lock().insert(ino, String::from(target));
        Ok(())
    }

    fn reclaim_tree(&self, root: InodeRef) {
        debug!("reclaiming tree under node {}", root.ino());
        self.reclaimed_trees.fetch_add(1, Ordering::SeqCst);
        // Nodes go back through release_node as their last reference drops.
        drop(root);
    }

    fn current_credentials(&self) -> Credentials {
        *self.creds.lock()
    }

    fn current_time(&self, gran: u32) -> SfsTimeSpec {
        let nanos = self.clock.fetch_add(CLOCK_STEP, Ordering::SeqCst);
        SfsTimeSpec::from_nanos(nanos).truncate(gran)
    }
}
