//! The version-control capability the sync layer drives.

use std::path::Path;

use chrono::{DateTime, Local};

use crate::error::Result;
use crate::types::{CredentialsProvider, Signature};

/// Repository operations against a local working directory and its remote.
///
/// Implementations are blocking; the store runs them on the blocking thread
/// pool while it holds its lock, so no two calls overlap for one store.
pub trait VersionControlBackend: Send + Sync {
    /// Clone `url` at `branch` into `dest`, which does not exist yet.
    ///
    /// Failures are reported as [`crate::Error::Clone`].
    fn clone_repo(
        &self,
        url: &str,
        branch: &str,
        dest: &Path,
        credentials: Option<&dyn CredentialsProvider>,
    ) -> Result<()>;

    /// Record `identity` as the clone's local `user.name`/`user.email`.
    fn configure_identity(&self, _workdir: &Path, _identity: &Signature) -> Result<()> {
        Ok(())
    }

    /// Whether the working tree or index differs from `HEAD`.
    fn is_working_tree_dirty(&self, workdir: &Path) -> Result<bool>;

    /// The local head of `branch` when it is ahead of the last pushed state.
    ///
    /// Lets a push retry after a commit whose push failed.
    fn unpushed_commit(&self, _workdir: &Path, _branch: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Stage every addition, modification and deletion.
    fn stage_all(&self, workdir: &Path) -> Result<()>;

    /// Commit the index on the current branch and return the commit id.
    fn commit(
        &self,
        workdir: &Path,
        message: &str,
        author: &Signature,
        committer: &Signature,
        time: DateTime<Local>,
    ) -> Result<String>;

    /// Push `branch` to the clone's origin.
    fn push(
        &self,
        workdir: &Path,
        branch: &str,
        credentials: Option<&dyn CredentialsProvider>,
    ) -> Result<()>;
}
