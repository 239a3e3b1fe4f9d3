//! Filesystem view of a drive.

mod cache;
mod download;
mod file;
mod filesystem;
pub(crate) mod node;
mod path;
mod resolver;
mod singleflight;
#[cfg(test)]
pub(crate) mod testing;
mod upload;

pub use download::DownloadStream;
pub use file::{DirHandle, File, OpenFlags, WriteHandle, seek_from_raw};
pub use filesystem::{FileSystem, FsOptions};
pub use node::{DEFAULT_PERMISSIONS, FileInfo, NodeKind, ROOT_FILE_ID, RemoteNode};
pub use upload::UploadPipeline;
