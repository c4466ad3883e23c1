//! Shared vocabulary for the cluster image file system: cluster addressing,
//! entry kinds, on-disk format constants and the error type every layer
//! returns.

use thiserror::Error;

/// Index into the cluster arena; the only addressing unit below the file level.
pub type ClusterId = u64;

pub const ROOT_CLUSTER: ClusterId = 0;

pub const PATH_DELIMITER: char = '/';

pub const SIGNATURE: &[u8; SIGNATURE_SIZE] = b"CLUSTERFS IMG v1";
pub const SIGNATURE_SIZE: usize = 16;
pub const SETTINGS_OFFSET: u64 = 16;
pub const SETTINGS_SIZE: u64 = 16;
pub const FAT_OFFSET: u64 = SETTINGS_OFFSET + SETTINGS_SIZE;

pub const FAT_STATUS_SIZE: u64 = 1;
pub const FAT_NEXT_SIZE: u64 = 8;
pub const FAT_ENTRY_SIZE: u64 = FAT_STATUS_SIZE + FAT_NEXT_SIZE;

pub const NAME_SIZE: usize = 64;
pub const METADATA_SIZE: usize = NAME_SIZE + 8 + 8 + 8 + 1;

/// Images below this size (and cluster sizes below `MIN_CLUSTER_SIZE`) are rejected.
pub const MIN_IMAGE_SIZE: u64 = 16;
pub const MIN_CLUSTER_SIZE: u64 = 8;
/// 16 GiB; larger images need an explicit opt-in.
pub const LARGE_IMAGE_THRESHOLD: u64 = 16 * 1024 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

impl EntryKind {
    pub const fn is_dir(self) -> bool {
        matches!(self, Self::Dir)
    }
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("already exists")]
    AlreadyExists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("no free clusters left")]
    OutOfSpace,
    #[error("cluster {cluster} is outside the table of {entries} entries")]
    InvalidCluster { cluster: ClusterId, entries: u64 },
    #[error("refusing to remove the root, the working directory or one of its ancestors")]
    ProtectedTarget,
    #[error("offset {offset} is past the end of a {size}-byte file")]
    InvalidOffset { offset: u64, size: u64 },
    #[error("image is corrupted: {0}")]
    Corrupted(String),
    #[error("not a cluster image (bad signature)")]
    NotAFileSystem,
    #[error("invalid image settings: {0}")]
    InvalidSettings(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Table corruption and out-of-range cluster indices mean the image (or
    /// the engine) can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidCluster { .. } | Self::Corrupted(_))
    }
}

pub type FsResult<T> = core::result::Result<T, FsError>;

impl From<FsError> for std::io::Error {
    fn from(err: FsError) -> Self {
        match err {
            FsError::Io(inner) => inner,
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}

pub fn corrupted(msg: impl Into<String>) -> FsError {
    FsError::Corrupted(msg.into())
}

pub fn invalid_path(msg: impl Into<String>) -> FsError {
    FsError::InvalidPath(msg.into())
}
