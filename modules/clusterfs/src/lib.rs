//! Single-file cluster image engine: a FAT-managed arena of fixed-size
//! clusters holding self-describing files and directories.

pub mod block;
pub mod chain;
pub mod check;
pub mod codec;
pub mod directory;
pub mod fat;
pub mod fs;
pub mod handler;
pub mod layout;
pub mod metadata;
pub mod mkfs;
pub mod path;

pub use block::{ByteDevice, FileDevice, MemDevice, SharedDevice};
pub use check::CheckReport;
pub use clustervfs::{ClusterId, EntryKind, FsError, FsResult};
pub use fs::{FileSystem, FsInfo};
pub use handler::{Entry, FileReader, FileWriter};
pub use layout::Settings;
pub use metadata::Metadata;
pub use mkfs::make_image;
