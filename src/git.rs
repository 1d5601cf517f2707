//! [`VersionControlBackend`] implemented with libgit2.
//!
//! Every call takes its arguments as discrete values; nothing is ever
//! composed into a shell command line.

use std::cell::RefCell;
use std::path::Path;

use chrono::{DateTime, Local};
use git2::build::RepoBuilder;
use git2::{
    ConfigLevel, Cred, CredentialType, ErrorCode, FetchOptions, IndexAddOption, PushOptions,
    RemoteCallbacks, Repository, Status, StatusOptions,
};
use tracing::debug;

use crate::backend::VersionControlBackend;
use crate::error::{Error, Result};
use crate::types::{CredentialsProvider, Signature};

const REMOTE: &str = "origin";

/// libgit2 re-asks for credentials after a rejection; give up after this many.
const MAX_CREDENTIAL_REQUESTS: u32 = 3;

/// Native git backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct Git2Backend;

impl Git2Backend {
    pub fn new() -> Self {
        Self
    }
}

fn open(workdir: &Path) -> Result<Repository> {
    Repository::open(workdir).map_err(Error::git)
}

/// Build callbacks that ask `provider` for credentials on every request.
fn remote_callbacks<'a>(provider: Option<&'a dyn CredentialsProvider>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    let Some(provider) = provider else {
        return callbacks;
    };

    let mut requests = 0u32;
    callbacks.credentials(move |url, username_from_url, allowed| {
        requests += 1;
        if requests > MAX_CREDENTIAL_REQUESTS {
            return Err(git2::Error::from_str("authentication rejected by remote"));
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if let Some(creds) = provider.credentials(url) {
                return Cred::userpass_plaintext(&creds.username, &creds.password);
            }
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            if let Some(user) = username_from_url {
                return Cred::ssh_key_from_agent(user);
            }
        }
        Cred::default()
    });
    callbacks
}

impl VersionControlBackend for Git2Backend {
    fn clone_repo(
        &self,
        url: &str,
        branch: &str,
        dest: &Path,
        credentials: Option<&dyn CredentialsProvider>,
    ) -> Result<()> {
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(remote_callbacks(credentials));

        let repo = RepoBuilder::new()
            .branch(branch)
            .fetch_options(fetch)
            .clone(url, dest)
            .map_err(Error::clone_failed)?;
        debug!(
            path = %dest.display(),
            head = ?repo.head().ok().and_then(|h| h.target()),
            "cloned"
        );
        Ok(())
    }

    fn configure_identity(&self, workdir: &Path, identity: &Signature) -> Result<()> {
        let repo = open(workdir)?;
        let mut config = repo
            .config()
            .and_then(|c| c.open_level(ConfigLevel::Local))
            .map_err(Error::git)?;
        config.set_str("user.name", &identity.name).map_err(Error::git)?;
        config.set_str("user.email", &identity.email).map_err(Error::git)?;
        Ok(())
    }

    fn is_working_tree_dirty(&self, workdir: &Path) -> Result<bool> {
        let repo = open(workdir)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts)).map_err(Error::status)?;
        let dirty = statuses
            .iter()
            .any(|entry| entry.status() != Status::CURRENT && !entry.status().is_ignored());
        Ok(dirty)
    }

    fn unpushed_commit(&self, workdir: &Path, branch: &str) -> Result<Option<String>> {
        let repo = open(workdir)?;
        let local = match repo.refname_to_id(&format!("refs/heads/{}", branch)) {
            Ok(oid) => oid,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(Error::git(e)),
        };
        let tracking = format!("refs/remotes/{}/{}", REMOTE, branch);
        match repo.refname_to_id(&tracking) {
            Ok(remote) if remote == local => Ok(None),
            Ok(_) => Ok(Some(local.to_string())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(Some(local.to_string())),
            Err(e) => Err(Error::git(e)),
        }
    }

    fn stage_all(&self, workdir: &Path) -> Result<()> {
        let repo = open(workdir)?;
        let mut index = repo.index().map_err(Error::stage)?;
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .map_err(Error::stage)?;
        // add_all does not pick up removals
        index.update_all(["*"].iter(), None).map_err(Error::stage)?;
        index.write().map_err(Error::stage)?;
        Ok(())
    }

    fn commit(
        &self,
        workdir: &Path,
        message: &str,
        author: &Signature,
        committer: &Signature,
        time: DateTime<Local>,
    ) -> Result<String> {
        let repo = open(workdir)?;
        let mut index = repo.index().map_err(Error::commit)?;
        let tree_oid = index.write_tree().map_err(Error::commit)?;
        let tree = repo.find_tree(tree_oid).map_err(Error::commit)?;

        let when = git2::Time::new(time.timestamp(), time.offset().local_minus_utc() / 60);
        let author = git2::Signature::new(&author.name, &author.email, &when)
            .map_err(Error::commit)?;
        let committer = git2::Signature::new(&committer.name, &committer.email, &when)
            .map_err(Error::commit)?;

        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit().map_err(Error::commit)?),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
            Err(e) => return Err(Error::commit(e)),
        };
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let oid = repo
            .commit(Some("HEAD"), &author, &committer, message, &tree, &parents)
            .map_err(Error::commit)?;
        Ok(oid.to_string())
    }

    fn push(
        &self,
        workdir: &Path,
        branch: &str,
        credentials: Option<&dyn CredentialsProvider>,
    ) -> Result<()> {
        let repo = open(workdir)?;
        let mut remote = repo.find_remote(REMOTE).map_err(Error::push)?;
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);

        // The server reports per-ref rejections (e.g. non-fast-forward) here
        // rather than through the push result.
        let rejection: RefCell<Option<String>> = RefCell::new(None);
        {
            let mut callbacks = remote_callbacks(credentials);
            callbacks.push_update_reference(|refname, status| {
                if let Some(msg) = status {
                    *rejection.borrow_mut() = Some(format!("{}: {}", refname, msg));
                }
                Ok(())
            });
            let mut opts = PushOptions::new();
            opts.remote_callbacks(callbacks);
            remote
                .push(&[refspec.as_str()], Some(&mut opts))
                .map_err(Error::push)?;
        }

        if let Some(msg) = rejection.into_inner() {
            return Err(Error::push(msg));
        }
        Ok(())
    }
}
