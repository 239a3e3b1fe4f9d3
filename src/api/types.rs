//! Request and response bodies of the drive open API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DriveKind;
use crate::error::{DriveError, Result};

/// Name-collision policy sent with every create/move/rename.
pub const CHECK_NAME_MODE_REFUSE: &str = "refuse";

/// Page size used when listing a folder.
pub const LIST_PAGE_LIMIT: u32 = 100;

/// Lifetime requested for download URLs, in seconds.
pub const DOWNLOAD_URL_EXPIRE_SEC: u32 = 900;

/// OAuth application credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

/// What is traded in for a new token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    RefreshToken(String),
    AuthorizationCode(String),
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub grant_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<&'a str>,
}

impl<'a> TokenRequest<'a> {
    pub fn new(credentials: &'a Credentials, grant: &'a TokenGrant) -> Self {
        let (grant_type, code, refresh_token) = match grant {
            TokenGrant::RefreshToken(token) => ("refresh_token", None, Some(token.as_str())),
            TokenGrant::AuthorizationCode(code) => ("authorization_code", Some(code.as_str()), None),
        };
        Self {
            client_id: &credentials.client_id,
            client_secret: &credentials.client_secret,
            grant_type,
            code,
            refresh_token,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub token_type: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct QrCodeRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub scopes: &'a [&'a str],
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QrCodeResponse {
    #[serde(rename = "qrCodeUrl", default)]
    pub qr_code_url: String,
    pub sid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum QrCodeStatus {
    WaitLogin,
    ScanSuccess,
    LoginSuccess,
    #[serde(rename = "QRCodeExpired")]
    Expired,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QrCodeStatusResponse {
    pub status: QrCodeStatus,
    #[serde(rename = "authCode", default)]
    pub auth_code: Option<String>,
}

/// Account and drive ids of the signed-in user.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveInfo {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    pub default_drive_id: String,
    #[serde(default)]
    pub resource_drive_id: Option<String>,
    #[serde(default)]
    pub backup_drive_id: Option<String>,
}

impl DriveInfo {
    /// Pick the drive id to mount.
    pub fn drive_id_for(&self, kind: DriveKind) -> Result<String> {
        let id = match kind {
            DriveKind::Default => Some(&self.default_drive_id),
            DriveKind::Resource => self.resource_drive_id.as_ref(),
            DriveKind::Backup => self.backup_drive_id.as_ref(),
        };
        id.filter(|id| !id.is_empty())
            .cloned()
            .ok_or_else(|| DriveError::Custom(format!("Account has no {:?} drive", kind)))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ListRequest<'a> {
    pub drive_id: &'a str,
    pub parent_file_id: &'a str,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<&'a str>,
}

/// One page of a folder listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ListPage {
    #[serde(default)]
    pub items: Vec<crate::fs::RemoteNode>,
    #[serde(default)]
    pub next_marker: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct GetByPathRequest<'a> {
    pub drive_id: &'a str,
    pub file_path: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRequest<'a> {
    pub drive_id: &'a str,
    pub parent_file_id: &'a str,
    pub name: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub check_name_mode: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartNumber {
    pub part_number: u32,
}

/// Pre-signed upload target for one part.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadPart {
    pub part_number: u32,
    #[serde(default)]
    pub upload_url: String,
}

/// Response to a create call, for folders and files alike.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedFile {
    pub drive_id: String,
    pub file_id: String,
    #[serde(default)]
    pub parent_file_id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub upload_id: String,
    #[serde(default)]
    pub part_info_list: Vec<UploadPart>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadUrlRequest<'a> {
    pub drive_id: &'a str,
    pub file_id: &'a str,
    pub upload_id: &'a str,
    pub part_info_list: Vec<PartNumber>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UploadUrlResponse {
    #[serde(default)]
    pub part_info_list: Vec<UploadPart>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CompleteRequest<'a> {
    pub drive_id: &'a str,
    pub file_id: &'a str,
    pub upload_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DownloadUrlRequest<'a> {
    pub drive_id: &'a str,
    pub file_id: &'a str,
    pub expire_sec: u32,
}

/// Short-lived download link.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadUrl {
    pub url: String,
    pub expiration: DateTime<Utc>,
}

impl DownloadUrl {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expiration
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct FileRef<'a> {
    pub drive_id: &'a str,
    pub file_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct MoveRequest<'a> {
    pub drive_id: &'a str,
    pub file_id: &'a str,
    pub to_parent_file_id: &'a str,
    pub new_name: &'a str,
    pub check_name_mode: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateRequest<'a> {
    pub drive_id: &'a str,
    pub file_id: &'a str,
    pub name: &'a str,
    pub check_name_mode: &'a str,
}

/// Body of calls whose response carries nothing of interest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_request_for_refresh() {
        let credentials = Credentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        };
        let grant = TokenGrant::RefreshToken("rt".to_string());
        let body = serde_json::to_value(TokenRequest::new(&credentials, &grant)).unwrap();

        assert_eq!(body["grant_type"], "refresh_token");
        assert_eq!(body["refresh_token"], "rt");
        assert!(body.get("code").is_none());
    }

    #[test]
    fn test_token_request_for_code() {
        let credentials = Credentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        };
        let grant = TokenGrant::AuthorizationCode("abc".to_string());
        let body = serde_json::to_value(TokenRequest::new(&credentials, &grant)).unwrap();

        assert_eq!(body["grant_type"], "authorization_code");
        assert_eq!(body["code"], "abc");
        assert!(body.get("refresh_token").is_none());
    }

    #[test]
    fn test_qrcode_status_parsing() {
        let status: QrCodeStatusResponse =
            serde_json::from_str(r#"{"status":"LoginSuccess","authCode":"c0de"}"#).unwrap();
        assert_eq!(status.status, QrCodeStatus::LoginSuccess);
        assert_eq!(status.auth_code.as_deref(), Some("c0de"));

        let expired: QrCodeStatusResponse =
            serde_json::from_str(r#"{"status":"QRCodeExpired"}"#).unwrap();
        assert_eq!(expired.status, QrCodeStatus::Expired);
    }

    #[test]
    fn test_drive_id_selection() {
        let info: DriveInfo = serde_json::from_str(
            r#"{"user_id":"u1","name":"me","default_drive_id":"d1","resource_drive_id":"d2"}"#,
        )
        .unwrap();

        assert_eq!(info.drive_id_for(DriveKind::Default).unwrap(), "d1");
        assert_eq!(info.drive_id_for(DriveKind::Resource).unwrap(), "d2");
        assert!(info.drive_id_for(DriveKind::Backup).is_err());
    }

    #[test]
    fn test_create_request_shape() {
        let body = serde_json::to_value(CreateRequest {
            drive_id: "d1",
            parent_file_id: "root",
            name: "a.txt",
            kind: "file",
            check_name_mode: CHECK_NAME_MODE_REFUSE,
            size: Some(0),
        })
        .unwrap();

        assert_eq!(body["type"], "file");
        assert_eq!(body["check_name_mode"], "refuse");
        assert_eq!(body["size"], 0);
    }

    #[test]
    fn test_empty_body_serializes_as_object() {
        assert_eq!(serde_json::to_string(&Empty::default()).unwrap(), "{}");
        let parsed: Empty = serde_json::from_str(r#"{"ignored":1}"#).unwrap();
        assert_eq!(serde_json::to_value(parsed).unwrap(), serde_json::json!({}));
    }
}
