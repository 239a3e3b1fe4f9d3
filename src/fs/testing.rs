//! In-memory drive used by the filesystem tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use sha1::{Digest, Sha1};
use tokio::sync::mpsc;

use crate::api::DriveApi;
use crate::api::types::{CreatedFile, DownloadUrl, DriveInfo, ListPage, UploadPart};
use crate::error::{DriveError, Result};
use crate::fs::node::{NodeKind, ROOT_FILE_ID, RemoteNode};
use crate::http::{ByteStream, ContentTransport};

const DRIVE_ID: &str = "drive-1";

#[derive(Default)]
struct Upload {
    file_id: String,
    parts: BTreeMap<u32, Vec<u8>>,
}

#[derive(Default)]
struct DriveState {
    nodes: HashMap<String, RemoteNode>,
    contents: HashMap<String, Vec<u8>>,
    uploads: HashMap<String, Upload>,
    part_log: HashMap<String, Vec<usize>>,
    next_id: u64,
    calls: HashMap<&'static str, usize>,
    failing: HashSet<&'static str>,
    page_size: usize,
    chunk_size: usize,
    list_delay: Duration,
    list_lag: Duration,
    corrupt_hash: bool,
}

impl DriveState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn children(&self, parent_id: &str) -> Vec<RemoteNode> {
        let mut children: Vec<RemoteNode> = self
            .nodes
            .values()
            .filter(|n| n.parent_file_id == parent_id)
            .cloned()
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }

    fn is_folder(&self, id: &str) -> bool {
        id == ROOT_FILE_ID || self.nodes.get(id).is_some_and(|n| n.is_dir())
    }

    fn ensure_free(&self, parent_id: &str, name: &str) -> Result<()> {
        if self.children(parent_id).iter().any(|n| n.name == name) {
            return Err(DriveError::Api {
                status: 409,
                code: "AlreadyExist.File".to_string(),
                message: format!("{} already exists", name),
            });
        }
        Ok(())
    }

    fn insert(&mut self, parent_id: &str, name: &str, kind: NodeKind, content: &[u8]) -> String {
        let id = self.next_id("file");
        let node = RemoteNode {
            drive_id: DRIVE_ID.to_string(),
            file_id: id.clone(),
            parent_file_id: parent_id.to_string(),
            name: name.to_string(),
            kind,
            size: content.len() as u64,
            updated_at: Utc::now(),
            content_hash: (kind == NodeKind::File).then(|| sha1_hex(content)),
        };
        self.nodes.insert(id.clone(), node);
        if kind == NodeKind::File {
            self.contents.insert(id.clone(), content.to_vec());
        }
        id
    }

    fn remove_tree(&mut self, id: &str) {
        let children: Vec<String> = self
            .nodes
            .values()
            .filter(|n| n.parent_file_id == id)
            .map(|n| n.file_id.clone())
            .collect();
        for child in children {
            self.remove_tree(&child);
        }
        self.nodes.remove(id);
        self.contents.remove(id);
    }
}

fn sha1_hex(data: &[u8]) -> String {
    hex::encode_upper(Sha1::digest(data))
}

fn not_found(what: &str) -> DriveError {
    DriveError::NotFound(what.to_string())
}

/// A drive kept entirely in memory, with call counters and failure injection.
pub(crate) struct MemoryDrive {
    state: Mutex<DriveState>,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DriveState {
                page_size: 100,
                chunk_size: 64 * 1024,
                ..DriveState::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DriveState> {
        self.state.lock().unwrap()
    }

    /// Count the call and fail it if `op` was marked failing.
    fn enter(&self, op: &'static str) -> Result<()> {
        let mut state = self.state();
        *state.calls.entry(op).or_default() += 1;
        if state.failing.contains(op) {
            return Err(DriveError::Api {
                status: 500,
                code: "InternalError".to_string(),
                message: format!("{} failed", op),
            });
        }
        Ok(())
    }

    pub fn add_folder(&self, parent_id: &str, name: &str) -> String {
        self.state().insert(parent_id, name, NodeKind::Folder, &[])
    }

    pub fn add_file(&self, parent_id: &str, name: &str, content: &[u8]) -> String {
        self.state().insert(parent_id, name, NodeKind::File, content)
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state().calls.get(op).copied().unwrap_or(0)
    }

    pub fn fail(&self, op: &'static str) {
        self.state().failing.insert(op);
    }

    pub fn set_page_size(&self, size: usize) {
        self.state().page_size = size;
    }

    pub fn set_chunk_size(&self, size: usize) {
        self.state().chunk_size = size;
    }

    pub fn set_list_delay(&self, delay: Duration) {
        self.state().list_delay = delay;
    }

    /// Delay listing replies after their contents were taken.
    pub fn set_list_lag(&self, lag: Duration) {
        self.state().list_lag = lag;
    }

    pub fn corrupt_hashes(&self) {
        self.state().corrupt_hash = true;
    }

    pub fn node(&self, id: &str) -> Option<RemoteNode> {
        self.state().nodes.get(id).cloned()
    }

    pub fn child(&self, parent_id: &str, name: &str) -> Option<RemoteNode> {
        self.state()
            .children(parent_id)
            .into_iter()
            .find(|n| n.name == name)
    }

    pub fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.state().contents.get(id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.state().nodes.len()
    }

    /// Sizes of the parts a completed upload of `file_id` was assembled from.
    pub fn part_sizes(&self, file_id: &str) -> Vec<usize> {
        self.state()
            .part_log
            .get(file_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DriveApi for MemoryDrive {
    async fn drive_info(&self) -> Result<DriveInfo> {
        self.enter("drive_info")?;
        Ok(DriveInfo {
            user_id: "user-1".to_string(),
            name: "tester".to_string(),
            default_drive_id: DRIVE_ID.to_string(),
            resource_drive_id: None,
            backup_drive_id: None,
        })
    }

    async fn drive_id(&self) -> Result<String> {
        Ok(DRIVE_ID.to_string())
    }

    async fn list(&self, parent_file_id: &str, marker: Option<&str>) -> Result<ListPage> {
        self.enter("list")?;
        let delay = self.state().list_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (page, lag) = {
            let state = self.state();
            if !state.is_folder(parent_file_id) {
                return Err(not_found(parent_file_id));
            }
            let start: usize = marker.and_then(|m| m.parse().ok()).unwrap_or(0);
            let children = state.children(parent_file_id);
            let end = (start + state.page_size).min(children.len());
            let page = ListPage {
                items: children[start.min(end)..end].to_vec(),
                next_marker: if end < children.len() {
                    end.to_string()
                } else {
                    String::new()
                },
            };
            (page, state.list_lag)
        };
        if !lag.is_zero() {
            tokio::time::sleep(lag).await;
        }
        Ok(page)
    }

    async fn get_by_path(&self, path: &str) -> Result<RemoteNode> {
        self.enter("get_by_path")?;
        let state = self.state();
        let mut current: Option<RemoteNode> = None;
        for name in path.split('/').filter(|s| !s.is_empty()) {
            let parent = current.as_ref().map_or(ROOT_FILE_ID, |n| n.file_id.as_str());
            let next = state
                .children(parent)
                .into_iter()
                .find(|n| n.name == name)
                .ok_or_else(|| not_found(path))?;
            current = Some(next);
        }
        current.ok_or_else(|| not_found(path))
    }

    async fn create_folder(&self, parent_file_id: &str, name: &str) -> Result<RemoteNode> {
        self.enter("create_folder")?;
        let mut state = self.state();
        if !state.is_folder(parent_file_id) {
            return Err(not_found(parent_file_id));
        }
        state.ensure_free(parent_file_id, name)?;
        let id = state.insert(parent_file_id, name, NodeKind::Folder, &[]);
        state.nodes.get(&id).cloned().ok_or_else(|| not_found(&id))
    }

    async fn create_file(&self, parent_file_id: &str, name: &str) -> Result<CreatedFile> {
        self.enter("create_file")?;
        let mut state = self.state();
        if !state.is_folder(parent_file_id) {
            return Err(not_found(parent_file_id));
        }
        state.ensure_free(parent_file_id, name)?;
        let file_id = state.insert(parent_file_id, name, NodeKind::File, &[]);
        let upload_id = state.next_id("upload");
        state.uploads.insert(
            upload_id.clone(),
            Upload {
                file_id: file_id.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(CreatedFile {
            drive_id: DRIVE_ID.to_string(),
            file_id,
            parent_file_id: parent_file_id.to_string(),
            file_name: name.to_string(),
            upload_id,
            part_info_list: Vec::new(),
        })
    }

    async fn get_upload_url(
        &self,
        file_id: &str,
        upload_id: &str,
        part_number: u32,
    ) -> Result<UploadPart> {
        self.enter("get_upload_url")?;
        let state = self.state();
        match state.uploads.get(upload_id) {
            Some(upload) if upload.file_id == file_id => Ok(UploadPart {
                part_number,
                upload_url: format!("mem://upload/{}/{}", upload_id, part_number),
            }),
            _ => Err(not_found(upload_id)),
        }
    }

    async fn complete_upload(&self, file_id: &str, upload_id: &str) -> Result<RemoteNode> {
        self.enter("complete_upload")?;
        let mut state = self.state();
        let upload = state
            .uploads
            .remove(upload_id)
            .filter(|u| u.file_id == file_id)
            .ok_or_else(|| not_found(upload_id))?;
        state.part_log.insert(
            file_id.to_string(),
            upload.parts.values().map(Vec::len).collect(),
        );
        let data: Vec<u8> = upload.parts.into_values().flatten().collect();
        let hash = if state.corrupt_hash {
            "0".repeat(40)
        } else {
            sha1_hex(&data)
        };

        let node = state.nodes.get_mut(file_id).ok_or_else(|| not_found(file_id))?;
        node.size = data.len() as u64;
        node.content_hash = Some(hash);
        node.updated_at = Utc::now();
        let node = node.clone();
        state.contents.insert(file_id.to_string(), data);
        Ok(node)
    }

    async fn get_download_url(&self, file_id: &str) -> Result<DownloadUrl> {
        self.enter("get_download_url")?;
        let state = self.state();
        match state.nodes.get(file_id) {
            Some(node) if node.is_file() => Ok(DownloadUrl {
                url: format!("mem://download/{}", file_id),
                expiration: Utc::now() + chrono::Duration::minutes(15),
            }),
            _ => Err(not_found(file_id)),
        }
    }

    async fn trash(&self, file_id: &str) -> Result<()> {
        self.enter("trash")?;
        let mut state = self.state();
        if !state.nodes.contains_key(file_id) {
            return Err(not_found(file_id));
        }
        state.remove_tree(file_id);
        Ok(())
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        self.enter("delete")?;
        let mut state = self.state();
        if !state.nodes.contains_key(file_id) {
            return Err(not_found(file_id));
        }
        state.remove_tree(file_id);
        Ok(())
    }

    async fn move_to(
        &self,
        file_id: &str,
        to_parent_file_id: &str,
        new_name: &str,
    ) -> Result<()> {
        self.enter("move_to")?;
        let mut state = self.state();
        if !state.is_folder(to_parent_file_id) {
            return Err(not_found(to_parent_file_id));
        }
        state.ensure_free(to_parent_file_id, new_name)?;
        let node = state.nodes.get_mut(file_id).ok_or_else(|| not_found(file_id))?;
        node.parent_file_id = to_parent_file_id.to_string();
        node.name = new_name.to_string();
        Ok(())
    }

    async fn rename(&self, file_id: &str, new_name: &str) -> Result<()> {
        self.enter("rename")?;
        let mut state = self.state();
        let parent = state
            .nodes
            .get(file_id)
            .map(|n| n.parent_file_id.clone())
            .ok_or_else(|| not_found(file_id))?;
        state.ensure_free(&parent, new_name)?;
        if let Some(node) = state.nodes.get_mut(file_id) {
            node.name = new_name.to_string();
        }
        Ok(())
    }
}

#[async_trait]
impl ContentTransport for MemoryDrive {
    async fn open_range(&self, url: &str, offset: u64) -> Result<ByteStream> {
        self.enter("open_range")?;
        let file_id = url
            .strip_prefix("mem://download/")
            .ok_or_else(|| not_found(url))?;
        let state = self.state();
        let content = state.contents.get(file_id).ok_or_else(|| not_found(file_id))?;
        let offset = offset as usize;
        if offset > content.len() {
            return Err(DriveError::HttpStatus {
                status: 416,
                body: "range not satisfiable".to_string(),
            });
        }

        let chunks: Vec<Result<Bytes>> = content[offset..]
            .chunks(state.chunk_size.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn upload_part(&self, url: &str, mut body: mpsc::Receiver<Bytes>) -> Result<()> {
        self.enter("upload_part")?;
        let (upload_id, part) = url
            .strip_prefix("mem://upload/")
            .and_then(|rest| rest.split_once('/'))
            .and_then(|(id, part)| Some((id.to_string(), part.parse::<u32>().ok()?)))
            .ok_or_else(|| not_found(url))?;

        let mut data = Vec::new();
        while let Some(chunk) = body.recv().await {
            data.extend_from_slice(&chunk);
        }

        let mut state = self.state();
        let upload = state
            .uploads
            .get_mut(&upload_id)
            .ok_or_else(|| not_found(&upload_id))?;
        upload.parts.insert(part, data);
        Ok(())
    }
}
