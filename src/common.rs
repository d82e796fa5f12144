//! Types shared by the node factory, the namespace operations and the volume.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// "samp"
pub const SFS_MAGIC: u32 = 0x73616d70;
/// Name under which the filesystem type registers itself
pub const SFS_NAME: &str = "samplefs";
/// Informational size added to a directory for each entry created in it.
/// It is not a byte count and does not track storage usage.
pub const SFS_BOGO_DIRENT_SIZE: u64 = 0x20;
pub const SFS_NAME_MAX: usize = 255;
pub const SFS_PATH_MAX: usize = 4096;
pub const SFS_DEFAULT_BLOCK_SIZE_BITS: u8 = 12;
pub const SFS_MAX_LFS_FILESIZE: u64 = i64::MAX as u64;
pub const NSEC_PER_SEC: u32 = 1_000_000_000;

bitflags! {
    /// Mode word of a node: kind bits plus permission bits.
    #[derive(Default)]
    pub struct SfsPermission: u16 {
        const S_IFMT = 0o170000;
        const S_IFSOCK = 0o140000;
        const S_IFLNK = 0o120000;
        const S_IFREG = 0o100000;
        const S_IFBLK = 0o060000;
        const S_IFDIR = 0o040000;
        const S_IFCHR = 0o020000;
        const S_IFIFO = 0o010000;

        const S_ISUID = 0o4000;
        const S_ISGID = 0o2000;
        const S_ISVTX = 0o1000;

        const S_IRWXU = 0o700;
        const S_IRUSR = 0o400;
        const S_IWUSR = 0o200;
        const S_IXUSR = 0o100;

        const S_IRWXG = 0o070;
        const S_IRGRP = 0o040;
        const S_IWGRP = 0o020;
        const S_IXGRP = 0o010;

        const S_IRWXO = 0o007;
        const S_IROTH = 0o004;
        const S_IWOTH = 0o002;
        const S_IXOTH = 0o001;

        const S_IRWXUGO = Self::S_IRWXU.bits | Self::S_IRWXG.bits | Self::S_IRWXO.bits;
    }
}

impl SfsPermission {
    /// Everything except the kind bits.
    pub fn without_kind(self) -> Self {
        self - Self::S_IFMT
    }

    /// Decode the kind bits, `None` if they do not name a known kind.
    pub fn kind(self) -> Option<NodeKind> {
        NodeKind::from_mode_bits(self.bits() & Self::S_IFMT.bits())
    }
}

/// Kind of a namespace node. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
}

impl NodeKind {
    /// The `S_IFMT` bits for this kind.
    pub fn kind_bits(self) -> SfsPermission {
        match self {
            NodeKind::Regular => SfsPermission::S_IFREG,
            NodeKind::Directory => SfsPermission::S_IFDIR,
            NodeKind::Symlink => SfsPermission::S_IFLNK,
            NodeKind::CharDevice => SfsPermission::S_IFCHR,
            NodeKind::BlockDevice => SfsPermission::S_IFBLK,
            NodeKind::Fifo => SfsPermission::S_IFIFO,
            NodeKind::Socket => SfsPermission::S_IFSOCK,
        }
    }

    fn from_mode_bits(bits: u16) -> Option<Self> {
        let kind = match bits {
            b if b == SfsPermission::S_IFREG.bits() => NodeKind::Regular,
            b if b == SfsPermission::S_IFDIR.bits() => NodeKind::Directory,
            b if b == SfsPermission::S_IFLNK.bits() => NodeKind::Symlink,
            b if b == SfsPermission::S_IFCHR.bits() => NodeKind::CharDevice,
            b if b == SfsPermission::S_IFBLK.bits() => NodeKind::BlockDevice,
            b if b == SfsPermission::S_IFIFO.bits() => NodeKind::Fifo,
            b if b == SfsPermission::S_IFSOCK.bits() => NodeKind::Socket,
            _ => return None,
        };
        Some(kind)
    }

    /// Device, fifo and socket nodes.
    pub fn is_special(self) -> bool {
        matches!(
            self,
            NodeKind::CharDevice | NodeKind::BlockDevice | NodeKind::Fifo | NodeKind::Socket
        )
    }

    pub fn is_dir(self) -> bool {
        self == NodeKind::Directory
    }
}

/// Major/minor pair of a device node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId {
    pub major: u32,
    pub minor: u32,
}

impl DeviceId {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// glibc `makedev` encoding.
    pub fn encode(self) -> u64 {
        let major = self.major as u64;
        let minor = self.minor as u64;
        ((major & 0xffff_f000) << 32)
            | ((major & 0x0000_0fff) << 8)
            | ((minor & 0xffff_ff00) << 12)
            | (minor & 0x0000_00ff)
    }
}

/// Effective filesystem identity of the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SfsTimeSpec {
    pub sec: u64,
    pub nsec: u32,
}

impl SfsTimeSpec {
    pub fn from_nanos(nanos: u64) -> Self {
        Self {
            sec: nanos / NSEC_PER_SEC as u64,
            nsec: (nanos % NSEC_PER_SEC as u64) as u32,
        }
    }

    /// Round down to a multiple of `gran` nanoseconds.
    pub fn truncate(self, gran: u32) -> Self {
        match gran {
            0 | 1 => self,
            NSEC_PER_SEC => Self { sec: self.sec, nsec: 0 },
            gran => Self {
                sec: self.sec,
                nsec: self.nsec - self.nsec % gran,
            },
        }
    }
}

/// Validate a single path component.
pub(crate) fn check_name(name: &str) -> crate::SfsResult<()> {
    if name.len() > SFS_NAME_MAX {
        return Err(crate::SfsError::NameTooLong);
    }
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(crate::SfsError::InvalidName);
    }
    Ok(())
}
