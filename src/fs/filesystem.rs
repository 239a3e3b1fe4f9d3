//! The filesystem facade: path operations over the drive.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::types::Credentials;
use crate::api::{ApiClient, DriveApi, DriveClient};
use crate::config::{Config, DEFAULT_PART_SIZE};
use crate::error::{DriveError, Result};
use crate::fs::download::DownloadStream;
use crate::fs::file::{DirHandle, File, OpenFlags, WriteHandle};
use crate::fs::node::{FileInfo, RemoteNode};
use crate::fs::path::{is_within, normalize_path, split_path, validate_name, with_root};
use crate::fs::resolver::Resolver;
use crate::fs::upload::UploadPipeline;
use crate::http::{ContentTransport, HttpClient, RetryPolicy};
use crate::session::{FileTokenStore, QrLogin, SessionManager, TokenStore};

/// Mount options.
#[derive(Debug, Clone)]
pub struct FsOptions {
    /// Remote folder presented as `/`.
    pub root_dir: String,
    pub read_only: bool,
    /// Upload part ceiling in bytes.
    pub part_size: u64,
    /// Metadata cache lifetime; `None` keeps entries until invalidated.
    pub cache_ttl: Option<Duration>,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            root_dir: "/".to_string(),
            read_only: false,
            part_size: DEFAULT_PART_SIZE,
            cache_ttl: None,
        }
    }
}

impl From<&Config> for FsOptions {
    fn from(config: &Config) -> Self {
        Self {
            root_dir: config.root_dir.clone(),
            read_only: config.read_only,
            part_size: config.part_size,
            cache_ttl: config.cache_ttl(),
        }
    }
}

/// A drive mounted as a filesystem.
///
/// Paths are client paths: they are normalized and placed below
/// [`FsOptions::root_dir`] before being resolved remotely.
pub struct FileSystem {
    api: Arc<dyn DriveApi>,
    transport: Arc<dyn ContentTransport>,
    resolver: Arc<Resolver>,
    options: FsOptions,
    session: Option<Arc<SessionManager>>,
    cancel: CancellationToken,
    keepalive: Mutex<Option<JoinHandle<()>>>,
}

impl FileSystem {
    /// Mount an already selected drive. No remote call is made.
    pub fn new(
        api: Arc<dyn DriveApi>,
        transport: Arc<dyn ContentTransport>,
        drive_id: &str,
        options: FsOptions,
    ) -> Self {
        let resolver = Arc::new(Resolver::new(
            Arc::clone(&api),
            RemoteNode::root(drive_id),
            options.cache_ttl,
        ));
        Self {
            api,
            transport,
            resolver,
            options,
            session: None,
            cancel: CancellationToken::new(),
            keepalive: Mutex::new(None),
        }
    }

    /// Build the whole client stack from `config` and sign in.
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;

        let http = HttpClient::new(
            &config.referer,
            RetryPolicy::with_attempts(config.retry_attempts),
        )?;
        let client = ApiClient::new(http.clone(), &config.api_host, config.request_timeout());
        let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(&config.token_store));
        let credentials = Credentials {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        };
        let session = Arc::new(SessionManager::new(
            Arc::new(client.clone()),
            credentials,
            store,
            QrLogin::new(config.login_poll_interval()),
        )?);
        let drive = Arc::new(DriveClient::new(client, Arc::clone(&session), config.drive));

        let keepalive = (config.keepalive_interval_secs > 0).then(|| config.keepalive_interval());
        Self::bootstrap(session, drive, Arc::new(http), FsOptions::from(config), keepalive).await
    }

    /// Obtain a token, look up the drive and start the keep-alive task.
    ///
    /// Fails with [`DriveError::Auth`] when neither refresh nor login succeeds.
    pub async fn bootstrap(
        session: Arc<SessionManager>,
        api: Arc<dyn DriveApi>,
        transport: Arc<dyn ContentTransport>,
        options: FsOptions,
        keepalive: Option<Duration>,
    ) -> Result<Self> {
        session.access_token().await.map_err(|e| match e {
            DriveError::Auth(_) => e,
            other => DriveError::Auth(other.to_string()),
        })?;

        let info = api.drive_info().await?;
        info!(user = %info.name, user_id = %info.user_id, "signed in");
        let drive_id = api.drive_id().await?;

        let mut fs = Self::new(api, transport, &drive_id, options);
        if let Some(interval) = keepalive.filter(|i| !i.is_zero()) {
            let handle = session.spawn_keepalive(interval, fs.cancel.child_token());
            fs.keepalive = Mutex::new(Some(handle));
        }
        fs.session = Some(session);
        Ok(fs)
    }

    pub fn options(&self) -> &FsOptions {
        &self.options
    }

    pub fn session(&self) -> Option<&Arc<SessionManager>> {
        self.session.as_ref()
    }

    /// Stop the keep-alive task and wait for it to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .keepalive
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "keep-alive task ended abnormally");
            }
        }
    }

    fn remote_path(&self, path: &str) -> String {
        with_root(&self.options.root_dir, path)
    }

    fn check_writable(&self) -> Result<()> {
        if self.options.read_only {
            return Err(DriveError::PermissionDenied);
        }
        Ok(())
    }

    async fn resolve_dir(&self, path: &str) -> Result<RemoteNode> {
        let node = self.resolver.resolve(path).await?;
        if !node.is_dir() {
            return Err(DriveError::NotFound(path.to_string()));
        }
        Ok(node)
    }

    /// Create a folder. Fails if the name is already taken.
    pub async fn mkdir(&self, path: &str) -> Result<FileInfo> {
        self.check_writable()?;
        let full = self.remote_path(path);
        let (parent_path, name) = split_path(&full);
        validate_name(name)?;

        let parent = self.resolve_dir(parent_path).await?;
        let node = self.api.create_folder(&parent.file_id, name).await?;
        info!(path = %full, file_id = %node.file_id, "created folder");

        self.resolver.invalidate(&full);
        self.resolver.remember(&full, node.clone());
        Ok(node.info())
    }

    /// Open a file or directory.
    ///
    /// `CREATE` or `TRUNCATE` start a fresh upload; `TRUNCATE` removes whatever
    /// is at the path first. Without them the node must exist and is opened for
    /// reading. Files cannot be modified in place.
    pub async fn open(&self, path: &str, flags: OpenFlags) -> Result<File> {
        if flags.contains(OpenFlags::APPEND) || flags.contains(OpenFlags::SYNC) {
            return Err(DriveError::NotSupported);
        }
        let full = self.remote_path(path);

        if flags.contains(OpenFlags::CREATE) || flags.contains(OpenFlags::TRUNCATE) {
            self.check_writable()?;
            return self.create(full, flags).await;
        }
        if flags.is_write() {
            self.check_writable()?;
            return Err(DriveError::NotSupported);
        }

        let node = self.resolver.resolve(&full).await?;
        debug!(path = %full, file_id = %node.file_id, "open");
        if node.is_dir() {
            Ok(File::Dir(DirHandle::new(
                full,
                node,
                Arc::clone(&self.resolver),
            )))
        } else {
            Ok(File::Read(DownloadStream::new(
                node,
                Arc::clone(&self.api),
                Arc::clone(&self.transport),
            )))
        }
    }

    async fn create(&self, full: String, flags: OpenFlags) -> Result<File> {
        let (parent_path, name) = split_path(&full);
        validate_name(name)?;

        if flags.contains(OpenFlags::TRUNCATE) {
            match self.remove_node(&full).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() && flags.contains(OpenFlags::CREATE) => {}
                Err(e) => return Err(e),
            }
        }

        let parent = self.resolve_dir(parent_path).await?;
        // Visible as an empty file with no id until the remote create returns.
        self.resolver
            .remember(&full, RemoteNode::placeholder(&parent, name));

        let pipeline = match UploadPipeline::create(
            Arc::clone(&self.api),
            Arc::clone(&self.transport),
            &parent,
            name,
            self.options.part_size,
        )
        .await
        {
            Ok(pipeline) => pipeline,
            Err(e) => {
                self.resolver.invalidate(&full);
                return Err(e);
            }
        };

        self.resolver.remember(&full, pipeline.node().await);
        Ok(File::Write(WriteHandle::new(
            full,
            pipeline,
            Arc::clone(&self.resolver),
        )))
    }

    /// Remove a file, or a folder with everything below it.
    ///
    /// The drive root and files still being created are left alone.
    pub async fn remove(&self, path: &str) -> Result<()> {
        self.check_writable()?;
        if normalize_path(path) == "/" {
            return Err(DriveError::CannotRemoveRoot);
        }
        let full = self.remote_path(path);
        self.remove_node(&full).await
    }

    async fn remove_node(&self, full: &str) -> Result<()> {
        let node = self.resolver.resolve(full).await?;
        if node.is_root() || !node.has_remote_id() {
            debug!(path = %full, "nothing to remove");
            return Ok(());
        }

        self.api.trash(&node.file_id).await?;
        info!(path = %full, file_id = %node.file_id, "removed");
        self.resolver.invalidate(full);
        Ok(())
    }

    /// Rename or move a node. The target name must be free.
    pub async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.check_writable()?;
        let old_full = self.remote_path(old_path);
        let new_full = self.remote_path(new_path);
        if old_full == new_full {
            self.resolver.resolve(&old_full).await?;
            return Ok(());
        }
        if normalize_path(old_path) == "/" || is_within(&new_full, &old_full) {
            return Err(DriveError::InvalidArgument(format!(
                "cannot move {} into {}",
                old_path, new_path
            )));
        }

        let (old_parent, _) = split_path(&old_full);
        let (new_parent, new_name) = split_path(&new_full);
        validate_name(new_name)?;

        let node = self.resolver.resolve(&old_full).await?;
        let result = if old_parent == new_parent {
            self.api.rename(&node.file_id, new_name).await
        } else {
            let parent = self.resolve_dir(new_parent).await?;
            self.api
                .move_to(&node.file_id, &parent.file_id, new_name)
                .await
        };

        self.resolver.invalidate(&old_full);
        self.resolver.invalidate(&new_full);
        result?;
        info!(from = %old_full, to = %new_full, "renamed");
        Ok(())
    }

    pub async fn stat(&self, path: &str) -> Result<FileInfo> {
        let full = self.remote_path(path);
        Ok(self.resolver.resolve(&full).await?.info())
    }
}

impl Drop for FileSystem {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
