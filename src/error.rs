//! Error type shared by every samplefs operation.

use alloc::string::String;

/// Errors returned by the namespace core.
#[derive(Debug, Clone, PartialEq, Eq, onlyerror::Error)]
pub enum SfsError {
    /// The name is already taken in the target directory
    #[error("entry already exists")]
    AlreadyExists,
    /// No entry with that name
    #[error("no such entry")]
    NotFound,
    /// The storage layer could not hand out another node
    #[error("no space left for a new node")]
    NoSpace,
    /// Mount-time allocation failed
    #[error("out of memory")]
    NoMemory,
    /// The operation makes no sense for its operands (rename cycle, hard-linked directory, ...)
    #[error("invalid operation")]
    InvalidOperation,
    /// Directory still has entries
    #[error("directory not empty")]
    NotEmpty,
    #[error("not a directory")]
    NotDir,
    #[error("is a directory")]
    IsDir,
    #[error("name too long")]
    NameTooLong,
    /// Empty name, `.`/`..`, or a name containing `/` or NUL
    #[error("invalid name")]
    InvalidName,
    /// Hard link across two volumes
    #[error("node belongs to another volume")]
    CrossVolume,
    /// The volume was already torn down
    #[error("volume is not mounted")]
    NotMounted,
    #[error("invalid mount options: {0}")]
    InvalidOptions(String),
}

pub type SfsResult<T> = Result<T, SfsError>;
