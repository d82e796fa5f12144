//! Filesystem type and its registration with a host.

use alloc::{collections::BTreeMap, string::String, sync::Arc, vec::Vec};

use log::{info, warn};
use spin::Mutex;

use crate::{
    common::SFS_NAME, config::MountOptions, storage::StorageLayer, superblock::SfsSuperBlock,
    SfsError, SfsResult,
};

/// What a host needs from a filesystem type to mount and unmount volumes.
pub trait FileSystemType: Send + Sync {
    fn fs_name(&self) -> &str;

    /// Mount a new volume. `data` is the raw mount-data blob.
    fn mount(&self, flags: u32, data: &[u8]) -> SfsResult<Arc<SfsSuperBlock>>;

    fn kill_sb(&self, sb: &SfsSuperBlock);
}

/// samplefs. Every mount gets its own volume on the shared storage layer.
pub struct SfsFsType {
    storage: Arc<dyn StorageLayer>,
}

impl SfsFsType {
    pub fn new(storage: Arc<dyn StorageLayer>) -> Self {
        Self { storage }
    }
}

impl FileSystemType for SfsFsType {
    fn fs_name(&self) -> &str {
        SFS_NAME
    }

    fn mount(&self, flags: u32, data: &[u8]) -> SfsResult<Arc<SfsSuperBlock>> {
        let options = MountOptions::parse(data)?;
        info!("Mounting samplefs ({:?})", options);
        let sb = SfsSuperBlock::fill_super(self.storage.clone(), flags, options)?;
        Ok(Arc::new(sb))
    }

    fn kill_sb(&self, sb: &SfsSuperBlock) {
        info!("Unmounting samplefs");
        sb.kill_sb();
    }
}

/// Filesystem types known to a host. There is no global instance; hosts
/// create one and pass it around.
#[derive(Default)]
pub struct FsRegistry {
    types: Mutex<BTreeMap<String, Arc<dyn FileSystemType>>>,
}

impl FsRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `fs` mountable by name until the returned handle is released.
    pub fn register(self: &Arc<Self>, fs: Arc<dyn FileSystemType>) -> SfsResult<Registration> {
        let name = String::from(fs.fs_name());
        let mut types = self.types.lock();
        if types.contains_key(&name) {
            return Err(SfsError::AlreadyExists);
        }
        types.insert(name.clone(), fs);
        info!("init {}", name);
        Ok(Registration {
            registry: Some(self.clone()),
            name,
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FileSystemType>> {
        self.types.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.types.lock().keys().cloned().collect()
    }

    pub fn mount(&self, name: &str, flags: u32, data: &[u8]) -> SfsResult<Arc<SfsSuperBlock>> {
        let fs = self.get(name).ok_or(SfsError::NotFound)?;
        fs.mount(flags, data)
    }

    fn unregister(&self, name: &str) {
        if self.types.lock().remove(name).is_none() {
            warn!("{} was not registered", name);
        }
    }
}

/// Keeps a filesystem type registered. Release it with
/// [`Registration::unregister`]; dropping the handle does the same.
pub struct Registration {
    registry: Option<Arc<FsRegistry>>,
    name: String,
}

impl Registration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unregister(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(registry) = self.registry.take() {
            info!("unloading {}", self.name);
            registry.unregister(&self.name);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}
