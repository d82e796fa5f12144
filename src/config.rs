//! Mount options.
//!
//! The host hands the mount-data blob through unchanged; samplefs reads it as a
//! JSON object. Empty data selects the defaults.
//!
//! ```json
//! { "mode": 493, "uid": 1000, "gid": 1000, "block_size_bits": 12, "time_gran": 1 }
//! ```

use alloc::string::ToString;
use serde::{Deserialize, Serialize};

use crate::{
    common::{SfsPermission, NSEC_PER_SEC, SFS_DEFAULT_BLOCK_SIZE_BITS},
    SfsError, SfsResult,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MountOptions {
    /// Permission bits of the root directory
    pub mode: u16,
    /// Owner of the root directory, defaults to the mounting identity
    pub uid: Option<u32>,
    /// Group of the root directory, defaults to the mounting identity
    pub gid: Option<u32>,
    pub block_size_bits: u8,
    /// Timestamp granularity in nanoseconds
    pub time_gran: u32,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            mode: 0o755,
            uid: None,
            gid: None,
            block_size_bits: SFS_DEFAULT_BLOCK_SIZE_BITS,
            time_gran: 1,
        }
    }
}

impl MountOptions {
    /// Parse and validate the raw mount data.
    pub fn parse(data: &[u8]) -> SfsResult<Self> {
        let trimmed = data.trim_ascii();
        let options = if trimmed.is_empty() {
            Self::default()
        } else {
            serde_json::from_slice::<Self>(trimmed)
                .map_err(|e| SfsError::InvalidOptions(e.to_string()))?
        };
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> SfsResult<()> {
        if !(9..=16).contains(&self.block_size_bits) {
            return Err(SfsError::InvalidOptions(alloc::format!(
                "block_size_bits {} out of range 9..=16",
                self.block_size_bits
            )));
        }
        if self.time_gran == 0 || self.time_gran > NSEC_PER_SEC || NSEC_PER_SEC % self.time_gran != 0
        {
            return Err(SfsError::InvalidOptions(alloc::format!(
                "time_gran {} must divide one second",
                self.time_gran
            )));
        }
        if self.mode & !0o7777 != 0 {
            return Err(SfsError::InvalidOptions(alloc::format!(
                "mode {:o} carries kind bits",
                self.mode
            )));
        }
        Ok(())
    }

    pub fn block_size(&self) -> u32 {
        1 << self.block_size_bits
    }

    pub fn root_perm(&self) -> SfsPermission {
        SfsPermission::from_bits_truncate(self.mode)
    }
}
