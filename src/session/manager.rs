//! Token lifecycle: refresh, interactive login and background keep-alive.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::AuthApi;
use crate::api::types::{Credentials, TokenGrant, TokenResponse};
use crate::error::{DriveError, Result};
use crate::session::qrcode::QrLogin;
use crate::session::store::TokenStore;

/// Access tokens are treated as expired this long before the server says so.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Where the session is in its token lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No access token obtained yet.
    Unauthenticated,
    /// Interactive login in progress.
    Authenticating,
    /// Holding a valid access token.
    Authenticated,
    /// Exchanging the refresh token.
    Refreshing,
    /// The last keep-alive refresh failed.
    Expired,
}

#[derive(Debug)]
struct Tokens {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<Instant>,
    state: SessionState,
}

impl Tokens {
    fn valid_access_token(&self) -> Option<&str> {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(at)) if Instant::now() < at => Some(token.as_str()),
            _ => None,
        }
    }
}

/// Owns the token pair and keeps it fresh.
///
/// Refreshes are serialized: concurrent callers that find the access token
/// stale wait for the one refresh in flight and reuse its result.
pub struct SessionManager {
    auth: Arc<dyn AuthApi>,
    credentials: Credentials,
    store: Arc<dyn TokenStore>,
    login: QrLogin,
    tokens: RwLock<Tokens>,
    refresh_lock: Mutex<()>,
}

impl SessionManager {
    /// Create a manager, seeding the refresh token from `store`.
    pub fn new(
        auth: Arc<dyn AuthApi>,
        credentials: Credentials,
        store: Arc<dyn TokenStore>,
        login: QrLogin,
    ) -> Result<Self> {
        let refresh_token = store.load()?;
        Ok(Self {
            auth,
            credentials,
            store,
            login,
            tokens: RwLock::new(Tokens {
                access_token: None,
                refresh_token,
                expires_at: None,
                state: SessionState::Unauthenticated,
            }),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.tokens.read().await.state
    }

    /// Whether a refresh token is known, persisted or obtained this run.
    pub async fn has_refresh_token(&self) -> bool {
        self.tokens.read().await.refresh_token.is_some()
    }

    /// A valid access token, refreshing or logging in first if needed.
    ///
    /// Interactive login only runs when no refresh token is known; a rejected
    /// refresh surfaces as [`DriveError::Auth`].
    pub async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.tokens.read().await.valid_access_token() {
            return Ok(token.to_string());
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        let refresh_token = {
            let tokens = self.tokens.read().await;
            if let Some(token) = tokens.valid_access_token() {
                return Ok(token.to_string());
            }
            tokens.refresh_token.clone()
        };

        match refresh_token {
            Some(refresh_token) => self.refresh_locked(refresh_token).await,
            None => self.login_locked().await,
        }
    }

    /// Exchange the refresh token for a new pair.
    ///
    /// On failure the previous tokens stay in place and the error is returned.
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        let refresh_token = self
            .tokens
            .read()
            .await
            .refresh_token
            .clone()
            .ok_or_else(|| DriveError::Auth("No refresh token available".to_string()))?;
        self.refresh_locked(refresh_token).await.map(|_| ())
    }

    async fn refresh_locked(&self, refresh_token: String) -> Result<String> {
        let previous = self.set_state(SessionState::Refreshing).await;
        debug!("refreshing access token");

        let grant = TokenGrant::RefreshToken(refresh_token);
        match self.auth.exchange_token(&self.credentials, &grant).await {
            Ok(response) => Ok(self.install(response).await),
            Err(e) => {
                error!(error = %e, "refresh token failed");
                self.set_state(previous).await;
                Err(into_auth_error(e))
            }
        }
    }

    async fn login_locked(&self) -> Result<String> {
        let previous = self.set_state(SessionState::Authenticating).await;
        info!("no refresh token, starting interactive login");

        let result = async {
            let code = self
                .login
                .authorize(self.auth.as_ref(), &self.credentials)
                .await?;
            let grant = TokenGrant::AuthorizationCode(code);
            self.auth.exchange_token(&self.credentials, &grant).await
        }
        .await;

        match result {
            Ok(response) => Ok(self.install(response).await),
            Err(e) => {
                error!(error = %e, "interactive login failed");
                self.set_state(previous).await;
                Err(into_auth_error(e))
            }
        }
    }

    async fn install(&self, response: TokenResponse) -> String {
        if let Err(e) = self.store.save(&response.refresh_token) {
            warn!(error = %e, "failed to persist refresh token");
        }

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(EXPIRY_MARGIN);
        let mut tokens = self.tokens.write().await;
        tokens.access_token = Some(response.access_token.clone());
        tokens.refresh_token = Some(response.refresh_token);
        tokens.expires_at = Some(Instant::now() + lifetime);
        tokens.state = SessionState::Authenticated;
        info!(expires_in = response.expires_in, "session authenticated");
        response.access_token
    }

    async fn set_state(&self, state: SessionState) -> SessionState {
        let mut tokens = self.tokens.write().await;
        std::mem::replace(&mut tokens.state, state)
    }

    /// One keep-alive round: refresh if possible, otherwise log in.
    async fn keep_alive(&self) -> Result<()> {
        if self.has_refresh_token().await {
            self.refresh().await
        } else {
            self.access_token().await.map(|_| ())
        }
    }

    /// Refresh the session every `interval` until `cancel` fires.
    pub fn spawn_keepalive(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("keep-alive stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match session.keep_alive().await {
                            Ok(()) => debug!("keep-alive refreshed session"),
                            Err(e) => {
                                error!(error = %e, "keep-alive failed");
                                session.set_state(SessionState::Expired).await;
                            }
                        }
                    }
                }
            }
        })
    }
}

fn into_auth_error(e: DriveError) -> DriveError {
    match e {
        DriveError::Auth(_) => e,
        other => DriveError::Auth(other.to_string()),
    }
}
