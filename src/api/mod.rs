//! Drive open API client and types.

pub mod auth;
pub mod client;
pub mod drive;
pub mod error;
pub mod types;

pub use auth::AuthApi;
pub use client::ApiClient;
pub use drive::{DriveApi, DriveClient};
pub use error::ApiErrorCode;
pub use types::{Credentials, DownloadUrl, DriveInfo, TokenGrant, TokenResponse};
