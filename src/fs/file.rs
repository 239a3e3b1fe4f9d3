//! Open file handles.

use std::io::SeekFrom;
use std::ops::BitOr;
use std::sync::Arc;

use crate::error::{DriveError, Result};
use crate::fs::download::DownloadStream;
use crate::fs::node::{FileInfo, RemoteNode};
use crate::fs::path::join_path;
use crate::fs::resolver::Resolver;
use crate::fs::upload::UploadPipeline;

/// Open flags, using the Linux `open(2)` bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const READ: Self = Self(0);
    pub const WRITE: Self = Self(0o1);
    pub const READ_WRITE: Self = Self(0o2);
    pub const CREATE: Self = Self(0o100);
    pub const TRUNCATE: Self = Self(0o1000);
    pub const APPEND: Self = Self(0o2000);
    pub const SYNC: Self = Self(0o4010000);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the open asks for any kind of write access.
    pub fn is_write(self) -> bool {
        self.0 & (Self::WRITE.0 | Self::READ_WRITE.0 | Self::CREATE.0 | Self::TRUNCATE.0) != 0
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Convert a raw `(offset, whence)` pair as used by `lseek(2)`.
pub fn seek_from_raw(offset: i64, whence: i32) -> Result<SeekFrom> {
    match whence {
        0 => u64::try_from(offset)
            .map(SeekFrom::Start)
            .map_err(|_| DriveError::InvalidArgument(format!("negative offset {}", offset))),
        1 => Ok(SeekFrom::Current(offset)),
        2 => Ok(SeekFrom::End(offset)),
        _ => Err(DriveError::NotSupported),
    }
}

/// Handle on an open directory.
pub struct DirHandle {
    path: String,
    node: RemoteNode,
    resolver: Arc<Resolver>,
}

impl DirHandle {
    pub(crate) fn new(path: String, node: RemoteNode, resolver: Arc<Resolver>) -> Self {
        Self {
            path,
            node,
            resolver,
        }
    }

    /// Visible children of the directory. Dot-files are left out.
    pub async fn readdir(&self) -> Result<Vec<FileInfo>> {
        let children = self.resolver.list_children(&self.path, &self.node).await?;
        Ok(children
            .iter()
            .filter(|child| !child.name.starts_with('.'))
            .map(RemoteNode::info)
            .collect())
    }

    pub fn stat(&self) -> FileInfo {
        self.node.info()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of a child entry, for follow-up calls on the filesystem.
    pub fn child_path(&self, name: &str) -> String {
        join_path(&self.path, name)
    }
}

/// Handle on a file being written.
pub struct WriteHandle {
    path: String,
    pipeline: UploadPipeline,
    resolver: Arc<Resolver>,
}

impl WriteHandle {
    pub(crate) fn new(path: String, pipeline: UploadPipeline, resolver: Arc<Resolver>) -> Self {
        Self {
            path,
            pipeline,
            resolver,
        }
    }

    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        self.pipeline.write(buf).await
    }

    pub async fn stat(&self) -> FileInfo {
        self.pipeline.stat().await
    }

    /// Commit the upload. The path is re-resolved on next access either way.
    pub async fn close(&self) -> Result<RemoteNode> {
        let result = self.pipeline.close().await;
        self.resolver.invalidate(&self.path);
        result
    }
}

/// An open file or directory.
pub enum File {
    Dir(DirHandle),
    Read(DownloadStream),
    Write(WriteHandle),
}

impl File {
    pub fn is_dir(&self) -> bool {
        matches!(self, File::Dir(_))
    }

    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        match self {
            File::Read(stream) => stream.read(buf).await,
            _ => Err(DriveError::NotSupported),
        }
    }

    pub async fn read_to_end(&self, out: &mut Vec<u8>) -> Result<usize> {
        match self {
            File::Read(stream) => stream.read_to_end(out).await,
            _ => Err(DriveError::NotSupported),
        }
    }

    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        match self {
            File::Write(handle) => handle.write(buf).await,
            _ => Err(DriveError::NotSupported),
        }
    }

    /// Write all of `buf`.
    pub async fn write_all(&self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            buf = &buf[n..];
        }
        Ok(())
    }

    pub async fn seek(&self, pos: SeekFrom) -> Result<u64> {
        match self {
            File::Read(stream) => stream.seek(pos).await,
            _ => Err(DriveError::NotSupported),
        }
    }

    pub async fn readdir(&self) -> Result<Vec<FileInfo>> {
        match self {
            File::Dir(dir) => dir.readdir().await,
            _ => Err(DriveError::NotSupported),
        }
    }

    pub async fn stat(&self) -> Result<FileInfo> {
        Ok(match self {
            File::Dir(dir) => dir.stat(),
            File::Read(stream) => stream.stat(),
            File::Write(handle) => handle.stat().await,
        })
    }

    pub async fn close(&self) -> Result<()> {
        match self {
            File::Dir(_) => Ok(()),
            File::Read(stream) => stream.close().await,
            File::Write(handle) => handle.close().await.map(|_| ()),
        }
    }
}
