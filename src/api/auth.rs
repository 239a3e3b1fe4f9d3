//! OAuth endpoints: token exchange and QR-code login.

use async_trait::async_trait;

use crate::api::client::ApiClient;
use crate::api::types::{
    Credentials, QrCodeRequest, QrCodeResponse, QrCodeStatusResponse, TokenGrant, TokenRequest,
    TokenResponse,
};
use crate::error::Result;

const TOKEN_PATH: &str = "/oauth/access_token";
const QRCODE_PATH: &str = "/oauth/authorize/qrcode";

/// Scopes requested during interactive login.
pub const LOGIN_SCOPES: &[&str] = &["user:base", "file:all:read", "file:all:write"];

/// Authentication calls used by the session manager.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Trade a refresh token or authorization code for a new token pair.
    async fn exchange_token(
        &self,
        credentials: &Credentials,
        grant: &TokenGrant,
    ) -> Result<TokenResponse>;

    /// Start a QR-code login session.
    async fn qrcode(&self, credentials: &Credentials) -> Result<QrCodeResponse>;

    /// Poll a QR-code login session.
    async fn qrcode_status(&self, sid: &str) -> Result<QrCodeStatusResponse>;
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn exchange_token(
        &self,
        credentials: &Credentials,
        grant: &TokenGrant,
    ) -> Result<TokenResponse> {
        self.post(TOKEN_PATH, None, &TokenRequest::new(credentials, grant))
            .await
    }

    async fn qrcode(&self, credentials: &Credentials) -> Result<QrCodeResponse> {
        let body = QrCodeRequest {
            client_id: &credentials.client_id,
            client_secret: &credentials.client_secret,
            scopes: LOGIN_SCOPES,
            width: 430,
            height: 430,
        };
        self.post(QRCODE_PATH, None, &body).await
    }

    async fn qrcode_status(&self, sid: &str) -> Result<QrCodeStatusResponse> {
        self.get(&format!("/oauth/qrcode/{}/status", sid), None).await
    }
}
