//! Streaming multipart upload of a new file.
//!
//! Bytes written to an [`UploadPipeline`] are piped straight into the HTTP body
//! of the current part, so a write returns as soon as the bytes are queued.
//! Parts are capped at the configured part size; the next part is only opened
//! once more bytes arrive for a full one, so no empty trailing part is created.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use chrono::Utc;
use sha1::{Digest, Sha1};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::DriveApi;
use crate::error::{DriveError, Result};
use crate::fs::node::{FileInfo, NodeKind, RemoteNode};
use crate::http::ContentTransport;

/// Chunks queued between a writer and its part upload.
const PIPE_DEPTH: usize = 8;

/// Body of one part upload, fed through a channel.
struct PartWriter {
    part_number: u32,
    tx: mpsc::Sender<Bytes>,
    task: Option<JoinHandle<Result<()>>>,
    written: u64,
    limit: u64,
    cancel: CancellationToken,
}

impl PartWriter {
    fn start(
        transport: Arc<dyn ContentTransport>,
        url: String,
        part_number: u32,
        limit: u64,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(PIPE_DEPTH);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                result = transport.upload_part(&url, rx) => result,
                _ = token.cancelled() => Err(DriveError::Cancelled),
            }
        });
        Self {
            part_number,
            tx,
            task: Some(task),
            written: 0,
            limit,
            cancel,
        }
    }

    fn is_full(&self) -> bool {
        self.written >= self.limit
    }

    /// Queue as much of `buf` as fits in this part.
    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let room = self.limit - self.written;
        let n = (buf.len() as u64).min(room) as usize;
        if n == 0 {
            return Ok(0);
        }
        if self.tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
            // The transfer ended before taking all of its body.
            return Err(match self.task.take() {
                Some(task) => match join(task).await {
                    Ok(()) => DriveError::Custom(format!(
                        "upload of part {} closed early",
                        self.part_number
                    )),
                    Err(e) => e,
                },
                None => DriveError::Cancelled,
            });
        }
        self.written += n as u64;
        Ok(n)
    }

    /// End the body and wait for the server's answer.
    async fn finish(self) -> Result<()> {
        let PartWriter {
            part_number,
            tx,
            task,
            written,
            ..
        } = self;
        drop(tx);
        let task = task.ok_or(DriveError::Cancelled)?;
        join(task).await?;
        debug!(part_number, bytes = written, "part uploaded");
        Ok(())
    }

    fn abort(self) {
        self.cancel.cancel();
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

async fn join(task: JoinHandle<Result<()>>) -> Result<()> {
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(DriveError::Cancelled),
        Err(e) => Err(DriveError::Custom(format!("upload task failed: {}", e))),
    }
}

struct UploadState {
    node: RemoteNode,
    part_number: u32,
    part: Option<PartWriter>,
    hasher: Sha1,
    /// Set once the upload is committed; stays `None` after a rollback.
    committed: Option<RemoteNode>,
}

/// Write handle for a file being uploaded.
pub struct UploadPipeline {
    api: Arc<dyn DriveApi>,
    transport: Arc<dyn ContentTransport>,
    file_id: String,
    upload_id: String,
    part_size: u64,
    cancel: CancellationToken,
    finished: AtomicBool,
    state: Mutex<UploadState>,
}

impl UploadPipeline {
    /// Create the remote file and open its first part.
    ///
    /// If the first part cannot be opened the new file is deleted again.
    pub(crate) async fn create(
        api: Arc<dyn DriveApi>,
        transport: Arc<dyn ContentTransport>,
        parent: &RemoteNode,
        name: &str,
        part_size: u64,
    ) -> Result<Self> {
        let created = api.create_file(&parent.file_id, name).await?;
        info!(name, file_id = %created.file_id, "created upload");

        let node = RemoteNode {
            drive_id: created.drive_id,
            file_id: created.file_id.clone(),
            parent_file_id: parent.file_id.clone(),
            name: name.to_string(),
            kind: NodeKind::File,
            size: 0,
            updated_at: Utc::now(),
            content_hash: None,
        };

        let pipeline = Self {
            api,
            transport,
            file_id: created.file_id,
            upload_id: created.upload_id,
            part_size: part_size.max(1),
            cancel: CancellationToken::new(),
            finished: AtomicBool::new(false),
            state: Mutex::new(UploadState {
                node,
                part_number: 0,
                part: None,
                hasher: Sha1::new(),
                committed: None,
            }),
        };

        let opened = {
            let mut state = pipeline.state.lock().await;
            pipeline.open_next_part(&mut state).await
        };
        if let Err(e) = opened {
            error!(name, error = %e, "failed to open first upload part");
            pipeline.finished.store(true, Ordering::SeqCst);
            pipeline.rollback().await;
            return Err(e);
        }
        Ok(pipeline)
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Current view of the file, with the size written so far.
    pub async fn node(&self) -> RemoteNode {
        self.state.lock().await.node.clone()
    }

    pub async fn stat(&self) -> FileInfo {
        self.state.lock().await.node.info()
    }

    async fn open_next_part(&self, state: &mut UploadState) -> Result<()> {
        let part_number = state.part_number + 1;
        let part = self
            .api
            .get_upload_url(&self.file_id, &self.upload_id, part_number)
            .await?;
        debug!(file_id = %self.file_id, part_number, "opened upload part");
        state.part_number = part_number;
        state.part = Some(PartWriter::start(
            Arc::clone(&self.transport),
            part.upload_url,
            part_number,
            self.part_size,
            self.cancel.child_token(),
        ));
        Ok(())
    }

    /// Queue `buf` for upload, rolling over to a new part when the current one
    /// is full. On failure the remote file is rolled back.
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(DriveError::InvalidArgument(
                "write to a closed upload".to_string(),
            ));
        }
        let mut state = self.state.lock().await;
        match self.write_locked(&mut state, buf).await {
            Ok(n) => Ok(n),
            Err(e) => {
                error!(file_id = %self.file_id, error = %e, "upload write failed");
                self.finished.store(true, Ordering::SeqCst);
                if let Some(part) = state.part.take() {
                    part.abort();
                }
                drop(state);
                self.rollback().await;
                Err(e)
            }
        }
    }

    async fn write_locked(&self, state: &mut UploadState, buf: &[u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if state.part.as_ref().is_none_or(PartWriter::is_full) {
                if let Some(full) = state.part.take() {
                    full.finish().await?;
                }
                self.open_next_part(state).await?;
            }
            let part = state
                .part
                .as_mut()
                .ok_or_else(|| DriveError::Custom("no open upload part".to_string()))?;
            let n = part.write(&buf[written..]).await?;
            state.hasher.update(&buf[written..written + n]);
            state.node.size += n as u64;
            written += n;
        }
        Ok(written)
    }

    /// Finish the last part and commit the upload.
    ///
    /// Returns the stored node. A content hash mismatch is logged but does not
    /// fail the upload. Closing again returns the same node, or an error if the
    /// upload was rolled back.
    pub async fn close(&self) -> Result<RemoteNode> {
        let mut state = self.state.lock().await;
        if self.finished.swap(true, Ordering::SeqCst) {
            return state.committed.clone().ok_or_else(|| {
                DriveError::Custom(format!("upload of {} was rolled back", state.node.name))
            });
        }

        match self.commit(&mut state).await {
            Ok(node) => {
                state.node = node.clone();
                state.committed = Some(node.clone());
                Ok(node)
            }
            Err(e) => {
                error!(file_id = %self.file_id, error = %e, "upload failed, rolling back");
                if let Some(part) = state.part.take() {
                    part.abort();
                }
                drop(state);
                self.rollback().await;
                Err(e)
            }
        }
    }

    async fn commit(&self, state: &mut UploadState) -> Result<RemoteNode> {
        if let Some(part) = state.part.take() {
            part.finish().await?;
        }
        let mut completed = self
            .api
            .complete_upload(&self.file_id, &self.upload_id)
            .await?;

        let local = hex::encode_upper(state.hasher.clone().finalize());
        match completed.content_hash.as_deref() {
            Some(remote) if remote.eq_ignore_ascii_case(&local) => {
                debug!(file_id = %self.file_id, hash = %local, "content hash verified");
            }
            Some(remote) => {
                warn!(file_id = %self.file_id, local = %local, remote, "content hash mismatch");
            }
            None => warn!(file_id = %self.file_id, "remote returned no content hash"),
        }

        if completed.name.is_empty() {
            completed.name = state.node.name.clone();
        }
        if completed.parent_file_id.is_empty() {
            completed.parent_file_id = state.node.parent_file_id.clone();
        }
        info!(
            file_id = %self.file_id,
            size = state.node.size,
            parts = state.part_number,
            "upload completed"
        );
        Ok(completed)
    }

    /// Stop the transfer and delete the remote file.
    pub async fn abort(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        if let Some(part) = self.state.lock().await.part.take() {
            part.abort();
        }
        self.rollback().await;
    }

    async fn rollback(&self) {
        match self.api.delete(&self.file_id).await {
            Ok(()) => info!(file_id = %self.file_id, "rolled back partial upload"),
            Err(e) => error!(file_id = %self.file_id, error = %e, "rollback failed"),
        }
    }
}

impl Drop for UploadPipeline {
    fn drop(&mut self) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        warn!(file_id = %self.file_id, "upload dropped before close, rolling back");
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let api = Arc::clone(&self.api);
        let file_id = std::mem::take(&mut self.file_id);
        handle.spawn(async move {
            if let Err(e) = api.delete(&file_id).await {
                error!(file_id = %file_id, error = %e, "rollback failed");
            }
        });
    }
}
