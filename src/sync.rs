//! The pull/push protocol against the remote.
//!
//! The coordinator itself takes no lock; [`crate::GitStore`] calls it only
//! while holding the store lock, and passes that hold along to every piece
//! of blocking work.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::VersionControlBackend;
use crate::config::SyncConfig;
use crate::dirs;
use crate::error::{Error, Result};
use crate::lock::{blocking, checkpoint, LockHold};
use crate::paths::ensure_parent_dir;
use crate::types::{CredentialsProvider, PullReport, PushOutcome};

pub(crate) struct SyncCoordinator {
    backend: Arc<dyn VersionControlBackend>,
    credentials: Option<Arc<dyn CredentialsProvider>>,
}

impl SyncCoordinator {
    pub(crate) fn new(
        backend: Arc<dyn VersionControlBackend>,
        credentials: Option<Arc<dyn CredentialsProvider>>,
    ) -> Self {
        Self {
            backend,
            credentials,
        }
    }

    /// An installed provider wins over the configured username/password.
    fn credentials_for(&self, cfg: &SyncConfig) -> Arc<dyn CredentialsProvider> {
        match &self.credentials {
            Some(provider) => Arc::clone(provider),
            None => Arc::new(cfg.credentials.clone()),
        }
    }

    /// Replace the working directory with a fresh clone of the branch.
    ///
    /// Clone failures are retried per `cfg.retry`; the last failure is
    /// returned once the attempts run out.
    pub(crate) async fn pull(
        &self,
        cfg: &Arc<SyncConfig>,
        hold: &LockHold,
        cancel: &CancellationToken,
    ) -> Result<PullReport> {
        self.wipe(cfg, hold).await?;

        let policy = cfg.retry;
        let mut attempt = 0;
        loop {
            checkpoint(cancel)?;
            attempt += 1;
            match self.clone_once(cfg, hold).await {
                Ok(()) => break,
                Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        url = %cfg.remote_url,
                        attempt,
                        max_attempts = policy.max_attempts,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "clone failed, retrying"
                    );
                    self.wipe(cfg, hold).await?;
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => {
                    warn!(
                        url = %cfg.remote_url,
                        attempt,
                        error = %err,
                        "clone failed, giving up"
                    );
                    self.wipe(cfg, hold).await?;
                    return Err(err);
                }
            }
        }

        let backend = Arc::clone(&self.backend);
        let sync = Arc::clone(cfg);
        blocking(hold, move || {
            backend.configure_identity(&sync.local_directory, &sync.committer)
        })
        .await?;

        info!(
            url = %cfg.remote_url,
            branch = %cfg.branch,
            path = %cfg.local_directory.display(),
            attempts = attempt,
            "pulled from remote"
        );
        Ok(PullReport { attempts: attempt })
    }

    async fn clone_once(&self, cfg: &Arc<SyncConfig>, hold: &LockHold) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let credentials = self.credentials_for(cfg);
        let sync = Arc::clone(cfg);
        blocking(hold, move || {
            backend.clone_repo(
                &sync.remote_url,
                &sync.branch,
                &sync.local_directory,
                Some(&*credentials),
            )
        })
        .await
    }

    /// Remove the working directory, leaving its parent in place.
    async fn wipe(&self, cfg: &Arc<SyncConfig>, hold: &LockHold) -> Result<()> {
        let dir = cfg.local_directory.clone();
        blocking(hold, move || {
            ensure_parent_dir(&dir)?;
            dirs::force_delete(&dir)
        })
        .await
    }

    /// Stage everything, then commit and push only if the tree changed.
    ///
    /// Nothing here is retried. A failed push leaves the commit in place; the
    /// next push finds the tree clean but the branch ahead of its remote, and
    /// pushes that commit without creating another.
    pub(crate) async fn push(
        &self,
        cfg: &Arc<SyncConfig>,
        message: &str,
        hold: &LockHold,
        cancel: &CancellationToken,
    ) -> Result<PushOutcome> {
        let dir = &cfg.local_directory;
        let backend = Arc::clone(&self.backend);
        let sync = Arc::clone(cfg);
        let status = blocking(hold, move || {
            let dir = &sync.local_directory;
            if !dir.try_exists().map_err(|e| Error::io(dir, e))? {
                return Ok(None);
            }
            backend.stage_all(&sync.local_directory)?;
            if backend.is_working_tree_dirty(&sync.local_directory)? {
                return Ok(Some((true, None)));
            }
            let unpushed = backend.unpushed_commit(&sync.local_directory, &sync.branch)?;
            Ok(Some((false, unpushed)))
        })
        .await?;
        let Some((dirty, unpushed)) = status else {
            info!(path = %dir.display(), "no working directory, nothing to push");
            return Ok(PushOutcome::NoWorkingDirectory);
        };
        checkpoint(cancel)?;

        let commit = match (dirty, unpushed) {
            (true, _) => {
                let backend = Arc::clone(&self.backend);
                let sync = Arc::clone(cfg);
                let message = message.to_string();
                let commit = blocking(hold, move || {
                    backend.commit(
                        &sync.local_directory,
                        &message,
                        &sync.author,
                        &sync.committer,
                        chrono::Local::now(),
                    )
                })
                .await?;
                checkpoint(cancel)?;
                commit
            }
            (false, Some(commit)) => {
                info!(commit = %commit, "working tree clean, pushing earlier commit");
                commit
            }
            (false, None) => {
                info!(path = %dir.display(), "working tree clean, nothing to push");
                return Ok(PushOutcome::Clean);
            }
        };

        let backend = Arc::clone(&self.backend);
        let credentials = self.credentials_for(cfg);
        let sync = Arc::clone(cfg);
        blocking(hold, move || {
            backend.push(&sync.local_directory, &sync.branch, Some(&*credentials))
        })
        .await?;

        info!(branch = %cfg.branch, commit = %commit, "pushed to remote");
        Ok(PushOutcome::Pushed { commit })
    }
}
