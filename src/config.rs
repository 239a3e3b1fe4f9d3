//! Adapter configuration.
//!
//! Values are read from a TOML file; OAuth credentials can also come from the
//! environment so they stay out of checked-in config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{DriveError, Result};

/// Open-platform API host.
pub const DEFAULT_API_HOST: &str = "https://openapi.alipan.com";

/// Referer sent with every request that does not set its own.
pub const DEFAULT_REFERER: &str = "https://www.aliyundrive.com/";

/// Per-part upload ceiling: 4 GiB, below the service's documented 5 GiB part limit.
pub const DEFAULT_PART_SIZE: u64 = 4 * 1024 * 1024 * 1024;

const ENV_CLIENT_ID: &str = "ADRIVE_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "ADRIVE_CLIENT_SECRET";

/// Which of the account's drives gets mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveKind {
    #[default]
    Default,
    Resource,
    Backup,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    /// Remote directory that appears as `/` to clients.
    pub root_dir: String,
    /// Reject every mutating operation with a permission error.
    pub read_only: bool,
    pub api_host: String,
    pub referer: String,
    pub drive: DriveKind,
    pub part_size: u64,
    pub keepalive_interval_secs: u64,
    pub token_store: PathBuf,
    pub cache_ttl_secs: Option<u64>,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    pub login_poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            root_dir: "/".to_string(),
            read_only: false,
            api_host: DEFAULT_API_HOST.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            drive: DriveKind::Default,
            part_size: DEFAULT_PART_SIZE,
            keepalive_interval_secs: 3600,
            token_store: PathBuf::from("./adrivefs-token.json"),
            cache_ttl_secs: None,
            request_timeout_secs: 30,
            retry_attempts: 3,
            login_poll_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Load a TOML config file. Missing keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override credentials from `ADRIVE_CLIENT_ID` / `ADRIVE_CLIENT_SECRET`.
    pub fn apply_env(mut self) -> Self {
        if let Ok(id) = std::env::var(ENV_CLIENT_ID) {
            self.client_id = id;
        }
        if let Ok(secret) = std::env::var(ENV_CLIENT_SECRET) {
            self.client_secret = secret;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(DriveError::InvalidArgument(
                "client_id and client_secret are required".to_string(),
            ));
        }
        if self.part_size == 0 {
            return Err(DriveError::InvalidArgument(
                "part_size must be positive".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(DriveError::InvalidArgument(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn login_poll_interval(&self) -> Duration {
        Duration::from_millis(self.login_poll_interval_ms)
    }
}
