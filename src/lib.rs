//! # adrivefs
//!
//! Virtual filesystem adapter for Aliyun Drive (alipan) accounts, built on the
//! drive's open-platform API.
//!
//! ## Features
//!
//! - **Session**: OAuth refresh-token flow with QR-code login as fallback,
//!   serialized token refresh and a cancellable keep-alive task.
//! - **Paths**: path-to-node resolution with a shared metadata cache, subtree
//!   invalidation and deduplicated folder listings.
//! - **Reads**: seekable download streams over ranged GETs, reopened lazily
//!   after each seek.
//! - **Writes**: streamed multipart uploads with part rollover, SHA-1
//!   verification and rollback of failed files.
//! - **Transport**: bounded retry on 429 and 5xx responses.
//!
//! The five operations a mount-protocol server needs (`mkdir`, `open`,
//! `remove`, `rename`, `stat`) live on [`FileSystem`].
//!
//! ## Example
//!
//! ```no_run
//! use adrivefs::{Config, FileSystem, OpenFlags};
//!
//! # async fn example() -> adrivefs::Result<()> {
//! let config = Config::load("adrivefs.toml")?.apply_env();
//! let fs = FileSystem::connect(&config).await?;
//!
//! let dir = fs.open("/", OpenFlags::READ).await?;
//! for entry in dir.readdir().await? {
//!     println!("{} ({} bytes)", entry.name, entry.size);
//! }
//!
//! let file = fs.open("/notes.txt", OpenFlags::WRITE | OpenFlags::CREATE).await?;
//! file.write_all(b"hello").await?;
//! file.close().await?;
//!
//! fs.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod fs;
pub mod http;
pub mod session;

// Re-export commonly used types
pub use config::{Config, DriveKind};
pub use error::{DriveError, Result};
pub use fs::{File, FileInfo, FileSystem, FsOptions, NodeKind, OpenFlags, RemoteNode};
pub use http::{ContentTransport, HttpClient, RetryPolicy};
pub use session::{SessionManager, SessionState};
