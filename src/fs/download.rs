//! Sequential, seekable reads of a remote file.

use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::api::{DownloadUrl, DriveApi};
use crate::error::{DriveError, Result};
use crate::fs::node::{FileInfo, RemoteNode};
use crate::http::{ByteStream, ContentTransport};

struct Cursor {
    /// Offset of the next byte handed to the caller.
    offset: u64,
    body: Option<ByteStream>,
    /// Received but not yet delivered bytes of the current chunk.
    pending: Bytes,
    url: Option<DownloadUrl>,
}

/// Read handle over one remote file.
///
/// A ranged GET is opened lazily at the current offset and read from until it
/// ends or the handle seeks. The download URL is reused until it expires.
pub struct DownloadStream {
    node: RemoteNode,
    api: Arc<dyn DriveApi>,
    transport: Arc<dyn ContentTransport>,
    cursor: Mutex<Cursor>,
}

impl DownloadStream {
    pub(crate) fn new(
        node: RemoteNode,
        api: Arc<dyn DriveApi>,
        transport: Arc<dyn ContentTransport>,
    ) -> Self {
        Self {
            node,
            api,
            transport,
            cursor: Mutex::new(Cursor {
                offset: 0,
                body: None,
                pending: Bytes::new(),
                url: None,
            }),
        }
    }

    pub fn node(&self) -> &RemoteNode {
        &self.node
    }

    pub fn stat(&self) -> FileInfo {
        self.node.info()
    }

    pub async fn position(&self) -> u64 {
        self.cursor.lock().await.offset
    }

    /// Read up to `buf.len()` bytes. `Ok(0)` signals end of file, after which
    /// the position is back at 0.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut cursor = self.cursor.lock().await;

        loop {
            if !cursor.pending.is_empty() {
                let n = buf.len().min(cursor.pending.len());
                let chunk = cursor.pending.split_to(n);
                buf[..n].copy_from_slice(&chunk);
                cursor.offset += n as u64;
                return Ok(n);
            }

            if cursor.url.as_ref().is_some_and(DownloadUrl::is_expired) {
                debug!(file_id = %self.node.file_id, "download url expired");
                cursor.url = None;
                cursor.body = None;
            }

            if cursor.body.is_none() {
                if cursor.offset >= self.node.size {
                    cursor.offset = 0;
                    return Ok(0);
                }
                let url = self.download_url(&mut cursor).await?;
                let offset = cursor.offset;
                cursor.body = Some(self.transport.open_range(&url, offset).await?);
            }

            let next = match cursor.body.as_mut() {
                Some(body) => body.next().await,
                None => None,
            };
            match next {
                Some(Ok(chunk)) => cursor.pending = chunk,
                Some(Err(e)) => {
                    cursor.body = None;
                    return Err(e);
                }
                None => {
                    info!(file = %self.node.name, "read finished");
                    cursor.body = None;
                    cursor.offset = 0;
                    return Ok(0);
                }
            }
        }
    }

    /// Read from the current position to the end of the file.
    pub async fn read_to_end(&self, out: &mut Vec<u8>) -> Result<usize> {
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }

    /// Move the read position. Any open connection is dropped and the next read
    /// reopens at the new offset.
    pub async fn seek(&self, pos: SeekFrom) -> Result<u64> {
        let mut cursor = self.cursor.lock().await;
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(cursor.offset) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.node.size) + i128::from(delta),
        };
        if target < 0 {
            return Err(DriveError::InvalidArgument(format!(
                "seek to negative position {}",
                target
            )));
        }

        let target = u64::try_from(target)
            .map_err(|_| DriveError::InvalidArgument("seek position overflow".to_string()))?;
        cursor.offset = target;
        cursor.body = None;
        cursor.pending = Bytes::new();
        Ok(target)
    }

    /// Release the connection. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        let mut cursor = self.cursor.lock().await;
        cursor.body = None;
        cursor.pending = Bytes::new();
        Ok(())
    }

    async fn download_url(&self, cursor: &mut Cursor) -> Result<String> {
        if let Some(url) = cursor.url.as_ref().filter(|u| !u.is_expired()) {
            return Ok(url.url.clone());
        }
        let url = self.api.get_download_url(&self.node.file_id).await?;
        debug!(file_id = %self.node.file_id, expiration = %url.expiration, "fetched download url");
        let link = url.url.clone();
        cursor.url = Some(url);
        Ok(link)
    }
}
