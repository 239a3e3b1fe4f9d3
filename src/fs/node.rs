//! Remote node types and the stat view exposed to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File id the service uses for the drive root.
pub const ROOT_FILE_ID: &str = "root";

const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;

/// Permission bits reported for every node.
pub const DEFAULT_PERMISSIONS: u32 = 0o660;

/// Node type as reported by the drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Regular file
    File,
    /// Folder/directory
    Folder,
}

/// A file or folder on the drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteNode {
    #[serde(default)]
    pub drive_id: String,
    /// Unique id within the drive; empty while an upload is being set up.
    pub file_id: String,
    #[serde(default)]
    pub parent_file_id: String,
    #[serde(alias = "file_name")]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// File size in bytes (0 for folders)
    #[serde(default)]
    pub size: u64,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Upper-case hex SHA-1 of the content, for files.
    #[serde(default)]
    pub content_hash: Option<String>,
}

impl RemoteNode {
    /// Synthetic node for the drive root; never fetched from the remote.
    pub fn root(drive_id: &str) -> Self {
        Self {
            drive_id: drive_id.to_string(),
            file_id: ROOT_FILE_ID.to_string(),
            parent_file_id: String::new(),
            name: String::new(),
            kind: NodeKind::Folder,
            size: 0,
            updated_at: Utc::now(),
            content_hash: None,
        }
    }

    /// Stand-in for a file whose upload session is still being created.
    pub fn placeholder(parent: &RemoteNode, name: &str) -> Self {
        Self {
            drive_id: parent.drive_id.clone(),
            file_id: String::new(),
            parent_file_id: parent.file_id.clone(),
            name: name.to_string(),
            kind: NodeKind::File,
            size: 0,
            updated_at: Utc::now(),
            content_hash: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.file_id == ROOT_FILE_ID
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// Whether the remote has assigned this node an id yet.
    pub fn has_remote_id(&self) -> bool {
        !self.file_id.is_empty()
    }

    /// Stat view of this node.
    pub fn info(&self) -> FileInfo {
        FileInfo {
            name: if self.is_root() {
                "/".to_string()
            } else {
                self.name.clone()
            },
            size: if self.is_dir() { 0 } else { self.size },
            modified: self.updated_at,
            is_dir: self.is_dir(),
        }
    }
}

/// What `stat` and `readdir` report for a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
}

impl FileInfo {
    pub fn permissions(&self) -> u32 {
        DEFAULT_PERMISSIONS
    }

    /// Unix mode: type bits plus [`DEFAULT_PERMISSIONS`].
    pub fn mode(&self) -> u32 {
        let kind = if self.is_dir { S_IFDIR } else { S_IFREG };
        kind | DEFAULT_PERMISSIONS
    }
}
