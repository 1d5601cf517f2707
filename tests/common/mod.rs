#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use gitstore::*;
use tokio_util::sync::CancellationToken;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gitstore=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn cancel() -> CancellationToken {
    CancellationToken::new()
}

/// A store with only a local directory, for file operations.
pub fn local_store(dir: &Path) -> GitStore {
    GitStore::open(StoreConfig {
        local_directory: dir.join("work"),
        ..Default::default()
    })
    .unwrap()
}

/// Full sync configuration pointing at `remote_url`.
pub fn sync_config(dir: &Path, remote_url: &str) -> StoreConfig {
    StoreConfig {
        remote_url: remote_url.into(),
        branch: "main".into(),
        local_directory: dir.join("work"),
        committer_name: "tester".into(),
        committer_email: "tester@example.com".into(),
        clone_backoff_ms: 1,
        clone_backoff_max_ms: 5,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

/// In-memory backend that records every call.
#[derive(Default)]
pub struct ScriptedBackend {
    /// Number of clone calls that fail before one succeeds.
    pub clone_failures: AtomicU32,
    /// Files written into the destination on a successful clone.
    pub seed: Vec<(String, Vec<u8>)>,
    /// Blocking delay inside each clone call.
    pub clone_delay: Duration,
    pub dirty: AtomicBool,
    pub unpushed: Mutex<Option<String>>,
    pub fail_push: AtomicBool,
    pub cloning: AtomicBool,
    pub calls: Mutex<Vec<String>>,
    pub credentials_seen: Mutex<Vec<Option<Credentials>>>,
    pub identity: Mutex<Option<Signature>>,
    pub commits: Mutex<Vec<(String, Signature, Signature)>>,
}

impl ScriptedBackend {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }
}

impl VersionControlBackend for ScriptedBackend {
    fn clone_repo(
        &self,
        url: &str,
        _branch: &str,
        dest: &Path,
        credentials: Option<&dyn CredentialsProvider>,
    ) -> Result<()> {
        self.record("clone");
        self.credentials_seen
            .lock()
            .unwrap()
            .push(credentials.and_then(|c| c.credentials(url)));
        self.cloning.store(true, Ordering::SeqCst);
        std::thread::sleep(self.clone_delay);
        self.cloning.store(false, Ordering::SeqCst);

        let remaining = self.clone_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.clone_failures.store(remaining - 1, Ordering::SeqCst);
            // Leave a partial checkout behind, as an interrupted clone would.
            std::fs::create_dir_all(dest.join(".git")).unwrap();
            return Err(Error::clone_failed("connection reset"));
        }

        std::fs::create_dir_all(dest.join(".git")).unwrap();
        for (path, data) in &self.seed {
            let full = dest.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, data).unwrap();
        }
        self.record("clone:end");
        Ok(())
    }

    fn configure_identity(&self, _workdir: &Path, identity: &Signature) -> Result<()> {
        *self.identity.lock().unwrap() = Some(identity.clone());
        Ok(())
    }

    fn is_working_tree_dirty(&self, _workdir: &Path) -> Result<bool> {
        self.record("status");
        Ok(self.dirty.load(Ordering::SeqCst))
    }

    fn unpushed_commit(&self, _workdir: &Path, _branch: &str) -> Result<Option<String>> {
        Ok(self.unpushed.lock().unwrap().clone())
    }

    fn stage_all(&self, _workdir: &Path) -> Result<()> {
        self.record("stage");
        Ok(())
    }

    fn commit(
        &self,
        _workdir: &Path,
        message: &str,
        author: &Signature,
        committer: &Signature,
        _time: chrono::DateTime<chrono::Local>,
    ) -> Result<String> {
        self.record("commit");
        self.commits
            .lock()
            .unwrap()
            .push((message.to_string(), author.clone(), committer.clone()));
        self.dirty.store(false, Ordering::SeqCst);
        *self.unpushed.lock().unwrap() = Some("c0ffee".into());
        Ok("c0ffee".into())
    }

    fn push(
        &self,
        _workdir: &Path,
        _branch: &str,
        _credentials: Option<&dyn CredentialsProvider>,
    ) -> Result<()> {
        self.record("push");
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(Error::push("non-fast-forward"));
        }
        *self.unpushed.lock().unwrap() = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Local bare remotes
// ---------------------------------------------------------------------------

/// Create a bare repository whose `main` branch holds the top-level `files`.
pub fn init_remote(dir: &Path, files: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join("remote.git");
    let repo = git2::Repository::init_bare(&path).unwrap();

    let mut builder = repo.treebuilder(None).unwrap();
    for (name, data) in files {
        let oid = repo.blob(data).unwrap();
        builder.insert(name, oid, 0o100644).unwrap();
    }
    let tree_oid = builder.write().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let sig = git2::Signature::now("seed", "seed@example.com").unwrap();
    repo.commit(Some("refs/heads/main"), &sig, &sig, "seed", &tree, &[])
        .unwrap();
    repo.set_head("refs/heads/main").unwrap();
    path
}

pub fn remote_url(remote: &Path) -> String {
    remote.to_string_lossy().into_owned()
}

/// Commit id at the tip of `main` in a bare remote.
pub fn remote_head(remote: &Path) -> git2::Oid {
    let repo = git2::Repository::open_bare(remote).unwrap();
    repo.refname_to_id("refs/heads/main").unwrap()
}

/// Contents of `path` at the tip of `main`, if present.
pub fn remote_file(remote: &Path, path: &str) -> Option<Vec<u8>> {
    let repo = git2::Repository::open_bare(remote).unwrap();
    let commit = repo.find_commit(remote_head(remote)).unwrap();
    let tree = commit.tree().unwrap();
    let entry = tree.get_path(Path::new(path)).ok()?;
    let blob = repo.find_blob(entry.id()).unwrap();
    Some(blob.content().to_vec())
}

/// The tip commit of `main` in a bare remote.
pub fn remote_commit(remote: &Path) -> (String, String, String) {
    let repo = git2::Repository::open_bare(remote).unwrap();
    let commit = repo.find_commit(remote_head(remote)).unwrap();
    let author = commit.author().name().unwrap_or_default().to_string();
    let committer = commit.committer().name().unwrap_or_default().to_string();
    let message = commit.message().unwrap_or_default().to_string();
    (message, author, committer)
}
