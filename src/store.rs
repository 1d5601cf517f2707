use std::path::{Path, PathBuf};
use std::sync::Arc;

use std::io::Write;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::VersionControlBackend;
use crate::config::{StoreConfig, SyncConfig};
use crate::dirs::{self, SearchOption};
use crate::encoding::{split_lines, TextEncoding};
use crate::error::{Error, Result};
use crate::git::Git2Backend;
use crate::lock::{acquire, blocking, LockHold};
use crate::paths::{self, ensure_parent_dir};
use crate::sync::SyncCoordinator;
use crate::types::{CredentialsProvider, PullReport, PushOutcome};

/// State guarded by the store lock.
#[derive(Default)]
struct StoreState {
    /// Validated on the first pull or push, then reused.
    sync_config: Option<Arc<SyncConfig>>,
}

/// Internal state shared via `Arc`.
struct GitStoreInner {
    root: PathBuf,
    config: StoreConfig,
    coordinator: SyncCoordinator,
    state: Arc<Mutex<StoreState>>,
}

/// A file store whose working directory mirrors one branch of a remote git
/// repository.
///
/// Every operation, reads included, runs under a single exclusive lock, so
/// concurrent callers observe the operations in some total order and never
/// see a pull or push interleaved with a file write. Work already started
/// on the blocking pool keeps the lock until it finishes, even when the
/// caller's future is dropped. File operations stay
/// local; only [`pull_from_remote`](Self::pull_from_remote) and
/// [`push_to_remote`](Self::push_to_remote) talk to the remote.
///
/// Paths are relative to the local directory, or absolute paths inside it.
///
/// Cheap to clone (`Arc` internally).
#[derive(Clone)]
pub struct GitStore {
    inner: Arc<GitStoreInner>,
}

/// Builder for a [`GitStore`] with a custom backend or credentials.
pub struct GitStoreBuilder {
    config: StoreConfig,
    backend: Option<Arc<dyn VersionControlBackend>>,
    credentials: Option<Arc<dyn CredentialsProvider>>,
}

impl GitStoreBuilder {
    /// Use `backend` instead of the libgit2 backend.
    pub fn backend(mut self, backend: Arc<dyn VersionControlBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Ask `provider` for credentials instead of using the configured
    /// username and password.
    pub fn credentials(mut self, provider: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// # Errors
    /// Returns a configuration error if `local_directory` is not assigned.
    /// Remote settings are checked on the first pull or push.
    pub fn build(self) -> Result<GitStore> {
        let root = self.config.local_directory()?.to_path_buf();
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(Git2Backend::new()));
        Ok(GitStore {
            inner: Arc::new(GitStoreInner {
                root,
                config: self.config,
                coordinator: SyncCoordinator::new(backend, self.credentials),
                state: Arc::new(Mutex::new(StoreState::default())),
            }),
        })
    }
}

impl GitStore {
    /// Create a store backed by libgit2.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: StoreConfig) -> GitStoreBuilder {
        GitStoreBuilder {
            config,
            backend: None,
            credentials: None,
        }
    }

    /// The local working directory.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        paths::resolve(&self.inner.root, path)
    }

    async fn lock(&self, cancel: &CancellationToken) -> Result<LockHold> {
        Ok(LockHold::new(acquire(&self.inner.state, cancel).await?))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Read a file as text. Returns `None` if no file exists at `path`.
    pub async fn get_text(
        &self,
        path: impl AsRef<Path>,
        encoding: TextEncoding,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let full = self.resolve(path)?;
        let hold = self.lock(cancel).await?;
        blocking(&hold, move || match read_file(&full)? {
            Some(bytes) => Ok(Some(encoding.decode(&bytes, &full.to_string_lossy())?)),
            None => Ok(None),
        })
        .await
    }

    /// Read a file's raw bytes. Returns `None` if no file exists at `path`.
    pub async fn get_bytes(
        &self,
        path: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>> {
        let full = self.resolve(path)?;
        let hold = self.lock(cancel).await?;
        blocking(&hold, move || read_file(&full)).await
    }

    /// Read a file as lines. Returns `None` if no file exists at `path`.
    ///
    /// The whole file is read and decoded while the lock is held; the
    /// returned lines do not refer back to the file.
    pub async fn get_text_lines(
        &self,
        path: impl AsRef<Path>,
        encoding: TextEncoding,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<String>>> {
        Ok(self
            .get_text(path, encoding, cancel)
            .await?
            .map(|text| split_lines(&text)))
    }

    /// Whether a file or directory exists at `path`.
    pub async fn exists(&self, path: impl AsRef<Path>, cancel: &CancellationToken) -> Result<bool> {
        let full = self.resolve(path)?;
        let hold = self.lock(cancel).await?;
        blocking(&hold, move || full.try_exists().map_err(|e| Error::io(&full, e))).await
    }

    /// List files in `dir` whose names match `pattern` (`*` and `?`).
    ///
    /// Returns absolute paths, sorted. An empty list if `dir` does not exist.
    pub async fn search_files(
        &self,
        dir: impl AsRef<Path>,
        pattern: &str,
        option: SearchOption,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>> {
        let full = self.resolve(dir)?;
        let pattern = pattern.to_string();
        let hold = self.lock(cancel).await?;
        blocking(&hold, move || dirs::search(&full, &pattern, option)).await
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Append text to a file, creating it and its parent directories.
    ///
    /// A byte-order mark is written only when the file is created.
    pub async fn append(
        &self,
        path: impl AsRef<Path>,
        content: &str,
        encoding: TextEncoding,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let full = self.resolve(path)?;
        let content = content.to_string();
        let hold = self.lock(cancel).await?;
        blocking(&hold, move || {
            ensure_parent_dir(&full)?;
            let is_new = !full.try_exists().map_err(|e| Error::io(&full, e))?;
            let bytes = if is_new {
                encoding.encode(&content)
            } else {
                encoding.encode_body(&content)
            };

            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&full)
                .map_err(|e| Error::io(&full, e))?;
            file.write_all(&bytes).map_err(|e| Error::io(&full, e))?;
            debug!(path = %full.display(), bytes = bytes.len(), "appended");
            Ok(())
        })
        .await
    }

    /// Replace a file's contents with `content`, creating parent directories.
    pub async fn insert_or_update_text(
        &self,
        path: impl AsRef<Path>,
        content: &str,
        encoding: TextEncoding,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.insert_or_update_bytes(path, &encoding.encode(content), cancel)
            .await
    }

    /// Replace a file's contents with `bytes`, creating parent directories.
    pub async fn insert_or_update_bytes(
        &self,
        path: impl AsRef<Path>,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let full = self.resolve(path)?;
        let bytes = bytes.to_vec();
        let hold = self.lock(cancel).await?;
        blocking(&hold, move || {
            ensure_parent_dir(&full)?;
            std::fs::write(&full, &bytes).map_err(|e| Error::io(&full, e))?;
            debug!(path = %full.display(), bytes = bytes.len(), "written");
            Ok(())
        })
        .await
    }

    /// Delete the file or directory tree at `path`.
    ///
    /// Does nothing if `path` does not exist. The store root itself cannot be
    /// deleted.
    pub async fn delete(&self, path: impl AsRef<Path>, cancel: &CancellationToken) -> Result<()> {
        let full = self.resolve(path)?;
        if full == self.inner.root {
            return Err(Error::invalid_path("refusing to delete the store root"));
        }
        let hold = self.lock(cancel).await?;
        blocking(&hold, move || {
            dirs::force_delete(&full)?;
            debug!(path = %full.display(), "deleted");
            Ok(())
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------------

    /// Discard the local directory and clone the configured branch afresh.
    ///
    /// # Errors
    /// Configuration errors are returned before anything on disk changes.
    /// Clone failures are retried with backoff; after the last attempt the
    /// clone error is returned and the store has no working directory.
    pub async fn pull_from_remote(&self, cancel: &CancellationToken) -> Result<PullReport> {
        let mut state = acquire(&self.inner.state, cancel).await?;
        let cfg = sync_config(&self.inner.config, &mut state)?;
        let hold = LockHold::new(state);
        self.inner.coordinator.pull(&cfg, &hold, cancel).await
    }

    /// Commit all local changes with `message` and push them.
    ///
    /// A clean working tree, or a missing working directory, is a no-op.
    pub async fn push_to_remote(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<PushOutcome> {
        let mut state = acquire(&self.inner.state, cancel).await?;
        let cfg = sync_config(&self.inner.config, &mut state)?;
        let hold = LockHold::new(state);
        self.inner.coordinator.push(&cfg, message, &hold, cancel).await
    }
}

/// The validated sync settings, computed once and kept in the lock state.
fn sync_config(config: &StoreConfig, state: &mut StoreState) -> Result<Arc<SyncConfig>> {
    if let Some(cfg) = &state.sync_config {
        return Ok(Arc::clone(cfg));
    }
    let cfg = Arc::new(config.validate()?);
    state.sync_config = Some(Arc::clone(&cfg));
    Ok(cfg)
}

/// Read a regular file, or `None` if there is none at `path`.
fn read_file(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Ok(None),
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
            ) =>
        {
            return Ok(None)
        }
        Err(e) => return Err(Error::io(path, e)),
    }
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(Some(bytes))
}
