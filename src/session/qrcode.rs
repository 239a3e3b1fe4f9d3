//! Interactive QR-code login.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::api::AuthApi;
use crate::api::types::{Credentials, QrCodeStatus};
use crate::error::{DriveError, Result};

/// Page the user opens (or scans) to approve the login.
pub const AUTHORIZE_URL: &str = "https://www.aliyundrive.com/o/oauth/authorize?sid=";

/// Called once per login with the URL the user has to visit.
pub type LoginPrompt = Arc<dyn Fn(&str) + Send + Sync>;

/// Polls a QR-code session until the user approves it or it expires.
#[derive(Clone)]
pub struct QrLogin {
    poll_interval: Duration,
    prompt: LoginPrompt,
}

impl fmt::Debug for QrLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QrLogin")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl QrLogin {
    /// Login that reports the URL through the log.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            prompt: Arc::new(|url: &str| info!(url, "scan the QR code or open the url to log in")),
        }
    }

    pub fn with_prompt(mut self, prompt: LoginPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    /// Run the login, returning the authorization code.
    pub async fn authorize(&self, auth: &dyn AuthApi, credentials: &Credentials) -> Result<String> {
        let session = auth.qrcode(credentials).await?;
        (self.prompt)(&format!("{}{}", AUTHORIZE_URL, session.sid));

        let mut scanned = false;
        loop {
            let status = auth.qrcode_status(&session.sid).await?;
            match status.status {
                QrCodeStatus::WaitLogin => debug!("waiting for QR code scan"),
                QrCodeStatus::ScanSuccess => {
                    if !scanned {
                        info!("QR code scanned, waiting for confirmation");
                        scanned = true;
                    }
                }
                QrCodeStatus::LoginSuccess => {
                    info!("QR code login confirmed");
                    return status.auth_code.filter(|c| !c.is_empty()).ok_or_else(|| {
                        DriveError::Auth("Login succeeded without an authorization code".into())
                    });
                }
                QrCodeStatus::Expired => {
                    return Err(DriveError::Auth("QR code expired".to_string()));
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
