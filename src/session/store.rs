//! Persistent storage for the refresh token.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{DriveError, Result};

/// Key the refresh token is stored under.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Where the refresh token survives restarts.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, refresh_token: &str) -> Result<()>;
}

/// JSON key/value file holding the refresh token.
///
/// Unknown keys already in the file are preserved on save.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let json = std::fs::read_to_string(&self.path)?;
        if json.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&json)
            .map_err(|e| DriveError::Custom(format!("Failed to parse token store: {}", e)))
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>> {
        let token = self
            .read_map()?
            .remove(REFRESH_TOKEN_KEY)
            .filter(|t| !t.is_empty());
        debug!(path = %self.path.display(), found = token.is_some(), "loaded token store");
        Ok(token)
    }

    fn save(&self, refresh_token: &str) -> Result<()> {
        let mut map = self.read_map().unwrap_or_default();
        map.insert(REFRESH_TOKEN_KEY.to_string(), refresh_token.to_string());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&map)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "saved refresh token");
        Ok(())
    }
}

/// In-process store, for callers that manage the token themselves.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new(refresh_token: Option<&str>) -> Self {
        Self {
            token: Mutex::new(refresh_token.map(str::to_string)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn save(&self, refresh_token: &str) -> Result<()> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(refresh_token.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("token.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_file_store_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");
        let store = FileTokenStore::new(&path);

        store.save("rt-1").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("rt-1"));

        store.save("rt-2").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("rt-2"));

        let raw: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.get("refreshToken").map(String::as_str), Some("rt-2"));
    }

    #[test]
    fn test_file_store_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"other":"value"}"#).unwrap();

        let store = FileTokenStore::new(&path);
        store.save("rt").unwrap();

        let raw: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.get("other").map(String::as_str), Some("value"));
        assert_eq!(raw.get("refreshToken").map(String::as_str), Some("rt"));
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileTokenStore::new(&path);
        assert!(store.load().is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryTokenStore::new(None);
        assert_eq!(store.load().unwrap(), None);
        store.save("abc").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("abc"));
    }
}
