//! File operations against the open API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::info;

use crate::api::client::ApiClient;
use crate::api::types::{
    CHECK_NAME_MODE_REFUSE, CompleteRequest, CreateRequest, CreatedFile, DOWNLOAD_URL_EXPIRE_SEC,
    DownloadUrl, DownloadUrlRequest, DriveInfo, Empty, FileRef, GetByPathRequest,
    LIST_PAGE_LIMIT, ListPage, ListRequest, MoveRequest, PartNumber, UpdateRequest, UploadPart,
    UploadUrlRequest, UploadUrlResponse,
};
use crate::config::DriveKind;
use crate::error::{DriveError, Result};
use crate::fs::{NodeKind, RemoteNode};
use crate::session::SessionManager;

/// Remote file operations the filesystem is built on.
///
/// All creates, moves and renames refuse to overwrite an existing sibling.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// User and drive ids of the signed-in account.
    async fn drive_info(&self) -> Result<DriveInfo>;

    /// Id of the drive being served.
    async fn drive_id(&self) -> Result<String>;

    /// One page of a folder listing.
    async fn list(&self, parent_file_id: &str, marker: Option<&str>) -> Result<ListPage>;

    async fn get_by_path(&self, path: &str) -> Result<RemoteNode>;

    async fn create_folder(&self, parent_file_id: &str, name: &str) -> Result<RemoteNode>;

    /// Register an empty file and open its multipart upload.
    async fn create_file(&self, parent_file_id: &str, name: &str) -> Result<CreatedFile>;

    async fn get_upload_url(
        &self,
        file_id: &str,
        upload_id: &str,
        part_number: u32,
    ) -> Result<UploadPart>;

    /// Finalize a multipart upload, returning the stored file.
    async fn complete_upload(&self, file_id: &str, upload_id: &str) -> Result<RemoteNode>;

    async fn get_download_url(&self, file_id: &str) -> Result<DownloadUrl>;

    /// Move a node to the recycle bin.
    async fn trash(&self, file_id: &str) -> Result<()>;

    /// Delete a node permanently.
    async fn delete(&self, file_id: &str) -> Result<()>;

    async fn move_to(&self, file_id: &str, to_parent_file_id: &str, new_name: &str)
    -> Result<()>;

    async fn rename(&self, file_id: &str, new_name: &str) -> Result<()>;

    /// Every child of a folder, following pagination markers.
    async fn list_all(&self, parent_file_id: &str) -> Result<Vec<RemoteNode>> {
        let mut items = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = self.list(parent_file_id, marker.as_deref()).await?;
            items.extend(page.items);
            if page.next_marker.is_empty() {
                return Ok(items);
            }
            marker = Some(page.next_marker);
        }
    }
}

/// [`DriveApi`] over HTTP, authenticated through a [`SessionManager`].
pub struct DriveClient {
    api: ApiClient,
    session: Arc<SessionManager>,
    kind: DriveKind,
    drive_id: OnceCell<String>,
}

impl DriveClient {
    pub fn new(api: ApiClient, session: Arc<SessionManager>, kind: DriveKind) -> Self {
        Self {
            api,
            session,
            kind,
            drive_id: OnceCell::new(),
        }
    }

    async fn call<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let token = self.session.access_token().await?;
        self.api.post(path, Some(&token), body).await
    }
}

#[async_trait]
impl DriveApi for DriveClient {
    async fn drive_info(&self) -> Result<DriveInfo> {
        self.call("/adrive/v1.0/user/getDriveInfo", &Empty::default())
            .await
    }

    async fn drive_id(&self) -> Result<String> {
        self.drive_id
            .get_or_try_init(|| async {
                let id = self.drive_info().await?.drive_id_for(self.kind)?;
                info!(drive_id = %id, kind = ?self.kind, "selected drive");
                Ok::<String, DriveError>(id)
            })
            .await
            .cloned()
    }

    async fn list(&self, parent_file_id: &str, marker: Option<&str>) -> Result<ListPage> {
        let drive_id = self.drive_id().await?;
        self.call(
            "/adrive/v1.0/openFile/list",
            &ListRequest {
                drive_id: &drive_id,
                parent_file_id,
                limit: LIST_PAGE_LIMIT,
                marker,
            },
        )
        .await
    }

    async fn get_by_path(&self, path: &str) -> Result<RemoteNode> {
        let drive_id = self.drive_id().await?;
        self.call(
            "/adrive/v1.0/openFile/get_by_path",
            &GetByPathRequest {
                drive_id: &drive_id,
                file_path: path,
            },
        )
        .await
        .map_err(|e| {
            if e.is_not_found() {
                DriveError::NotFound(path.to_string())
            } else {
                e
            }
        })
    }

    async fn create_folder(&self, parent_file_id: &str, name: &str) -> Result<RemoteNode> {
        let drive_id = self.drive_id().await?;
        let created: CreatedFile = self
            .call(
                "/adrive/v1.0/openFile/create",
                &CreateRequest {
                    drive_id: &drive_id,
                    parent_file_id,
                    name,
                    kind: "folder",
                    check_name_mode: CHECK_NAME_MODE_REFUSE,
                    size: None,
                },
            )
            .await?;

        Ok(RemoteNode {
            drive_id: created.drive_id,
            file_id: created.file_id,
            parent_file_id: parent_file_id.to_string(),
            name: name.to_string(),
            kind: NodeKind::Folder,
            size: 0,
            updated_at: Utc::now(),
            content_hash: None,
        })
    }

    async fn create_file(&self, parent_file_id: &str, name: &str) -> Result<CreatedFile> {
        let drive_id = self.drive_id().await?;
        self.call(
            "/adrive/v1.0/openFile/create",
            &CreateRequest {
                drive_id: &drive_id,
                parent_file_id,
                name,
                kind: "file",
                check_name_mode: CHECK_NAME_MODE_REFUSE,
                size: Some(0),
            },
        )
        .await
    }

    async fn get_upload_url(
        &self,
        file_id: &str,
        upload_id: &str,
        part_number: u32,
    ) -> Result<UploadPart> {
        let drive_id = self.drive_id().await?;
        let response: UploadUrlResponse = self
            .call(
                "/adrive/v1.0/openFile/getUploadUrl",
                &UploadUrlRequest {
                    drive_id: &drive_id,
                    file_id,
                    upload_id,
                    part_info_list: vec![PartNumber { part_number }],
                },
            )
            .await?;

        response
            .part_info_list
            .into_iter()
            .find(|p| p.part_number == part_number && !p.upload_url.is_empty())
            .ok_or_else(|| {
                DriveError::Custom(format!("No upload url returned for part {}", part_number))
            })
    }

    async fn complete_upload(&self, file_id: &str, upload_id: &str) -> Result<RemoteNode> {
        let drive_id = self.drive_id().await?;
        self.call(
            "/adrive/v1.0/openFile/complete",
            &CompleteRequest {
                drive_id: &drive_id,
                file_id,
                upload_id,
            },
        )
        .await
    }

    async fn get_download_url(&self, file_id: &str) -> Result<DownloadUrl> {
        let drive_id = self.drive_id().await?;
        self.call(
            "/adrive/v1.0/openFile/getDownloadUrl",
            &DownloadUrlRequest {
                drive_id: &drive_id,
                file_id,
                expire_sec: DOWNLOAD_URL_EXPIRE_SEC,
            },
        )
        .await
    }

    async fn trash(&self, file_id: &str) -> Result<()> {
        let drive_id = self.drive_id().await?;
        let _: Empty = self
            .call(
                "/adrive/v1.0/openFile/recyclebin/trash",
                &FileRef {
                    drive_id: &drive_id,
                    file_id,
                },
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        let drive_id = self.drive_id().await?;
        let _: Empty = self
            .call(
                "/adrive/v1.0/openFile/delete",
                &FileRef {
                    drive_id: &drive_id,
                    file_id,
                },
            )
            .await?;
        Ok(())
    }

    async fn move_to(
        &self,
        file_id: &str,
        to_parent_file_id: &str,
        new_name: &str,
    ) -> Result<()> {
        let drive_id = self.drive_id().await?;
        let _: Empty = self
            .call(
                "/adrive/v1.0/openFile/move",
                &MoveRequest {
                    drive_id: &drive_id,
                    file_id,
                    to_parent_file_id,
                    new_name,
                    check_name_mode: CHECK_NAME_MODE_REFUSE,
                },
            )
            .await?;
        Ok(())
    }

    async fn rename(&self, file_id: &str, new_name: &str) -> Result<()> {
        let drive_id = self.drive_id().await?;
        let _: Empty = self
            .call(
                "/adrive/v1.0/openFile/update",
                &UpdateRequest {
                    drive_id: &drive_id,
                    file_id,
                    name: new_name,
                    check_name_mode: CHECK_NAME_MODE_REFUSE,
                },
            )
            .await?;
        Ok(())
    }
}
