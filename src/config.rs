//! Store configuration and its validation.
//!
//! [`StoreConfig`] is the raw options object as bound from a file or the
//! environment. [`StoreConfig::validate`] turns it into a [`SyncConfig`]: the
//! normalized form the sync layer runs against, with the committer/author
//! fallbacks applied.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::{Credentials, Signature};

/// Prefix for environment variables, e.g. `GITSTORE_REMOTE_URL`.
pub const ENV_PREFIX: &str = "GITSTORE";

pub const DEFAULT_CLONE_ATTEMPTS: u32 = 4;
pub const DEFAULT_CLONE_BACKOFF_MS: u64 = 500;
pub const DEFAULT_CLONE_BACKOFF_MAX_MS: u64 = 8_000;

/// Raw store options. Empty strings count as "not assigned".
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub remote_url: String,
    pub branch: String,
    pub local_directory: PathBuf,
    pub committer_name: String,
    pub committer_email: String,
    pub author_name: String,
    pub author_email: String,
    pub username: String,
    pub password: Option<String>,
    /// Total clone attempts per pull, first attempt included.
    pub clone_attempts: u32,
    pub clone_backoff_ms: u64,
    pub clone_backoff_max_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            remote_url: String::new(),
            branch: String::new(),
            local_directory: PathBuf::new(),
            committer_name: String::new(),
            committer_email: String::new(),
            author_name: String::new(),
            author_email: String::new(),
            username: String::new(),
            password: None,
            clone_attempts: DEFAULT_CLONE_ATTEMPTS,
            clone_backoff_ms: DEFAULT_CLONE_BACKOFF_MS,
            clone_backoff_max_ms: DEFAULT_CLONE_BACKOFF_MAX_MS,
        }
    }
}

impl StoreConfig {
    /// Bind options from an optional TOML file, then `GITSTORE_*` variables.
    ///
    /// Environment values override the file.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Bind options from TOML text.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// The local working directory, which every store operation needs.
    ///
    /// # Errors
    /// Returns a configuration error when the directory is not assigned.
    pub fn local_directory(&self) -> Result<&Path> {
        if self.local_directory.as_os_str().is_empty() {
            return Err(Error::missing("local_directory"));
        }
        Ok(&self.local_directory)
    }

    /// Validate the options needed for pull/push and apply the identity
    /// fallbacks.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first missing field.
    pub fn validate(&self) -> Result<SyncConfig> {
        let local_directory = self.local_directory()?.to_path_buf();
        if self.branch.trim().is_empty() {
            return Err(Error::missing("branch"));
        }
        if self.remote_url.trim().is_empty() {
            return Err(Error::missing("remote_url"));
        }

        let (committer_name, author_name) =
            fallback_pair(&self.committer_name, &self.author_name, "committer_name/author_name")?;
        let (committer_email, author_email) = fallback_pair(
            &self.committer_email,
            &self.author_email,
            "committer_email/author_email",
        )?;

        if self.clone_attempts == 0 {
            return Err(Error::config("clone_attempts", "must be at least 1"));
        }

        Ok(SyncConfig {
            remote_url: self.remote_url.trim().to_string(),
            branch: self.branch.trim().to_string(),
            local_directory,
            committer: Signature::new(committer_name, committer_email),
            author: Signature::new(author_name, author_email),
            credentials: Credentials {
                username: self.username.clone(),
                password: self.password.clone().unwrap_or_default(),
            },
            retry: RetryPolicy {
                max_attempts: self.clone_attempts,
                base_backoff: Duration::from_millis(self.clone_backoff_ms),
                max_backoff: Duration::from_millis(self.clone_backoff_max_ms),
            },
        })
    }
}

/// Each side of the pair falls back to the other; both empty is an error.
fn fallback_pair(primary: &str, secondary: &str, field: &'static str) -> Result<(String, String)> {
    let primary = primary.trim();
    let secondary = secondary.trim();
    match (primary.is_empty(), secondary.is_empty()) {
        (true, true) => Err(Error::missing(field)),
        (true, false) => Ok((secondary.to_string(), secondary.to_string())),
        (false, true) => Ok((primary.to_string(), primary.to_string())),
        (false, false) => Ok((primary.to_string(), secondary.to_string())),
    }
}

/// Validated, normalized configuration for the sync layer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub remote_url: String,
    pub branch: String,
    pub local_directory: PathBuf,
    pub committer: Signature,
    pub author: Signature,
    pub credentials: Credentials,
    pub retry: RetryPolicy,
}

/// Bounded retry with exponential backoff for clone attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_CLONE_ATTEMPTS,
            base_backoff: Duration::from_millis(DEFAULT_CLONE_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_CLONE_BACKOFF_MAX_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> StoreConfig {
        StoreConfig {
            remote_url: "https://example.com/data.git".into(),
            branch: "main".into(),
            local_directory: "/tmp/gitstore".into(),
            committer_name: "x".into(),
            committer_email: "x@example.com".into(),
            ..Default::default()
        }
    }

    #[test]
    fn author_falls_back_to_committer() {
        let cfg = base().validate().unwrap();
        assert_eq!(cfg.author.name, "x");
        assert_eq!(cfg.author.email, "x@example.com");
    }

    #[test]
    fn committer_falls_back_to_author() {
        let cfg = StoreConfig {
            committer_name: String::new(),
            committer_email: String::new(),
            author_name: "a".into(),
            author_email: "a@example.com".into(),
            ..base()
        }
        .validate()
        .unwrap();
        assert_eq!(cfg.committer.name, "a");
        assert_eq!(cfg.committer.email, "a@example.com");
    }

    #[test]
    fn distinct_identities_are_kept() {
        let cfg = StoreConfig {
            author_name: "a".into(),
            author_email: "a@example.com".into(),
            ..base()
        }
        .validate()
        .unwrap();
        assert_eq!(cfg.committer.name, "x");
        assert_eq!(cfg.author.name, "a");
    }

    #[test]
    fn both_names_missing() {
        let err = StoreConfig {
            committer_name: String::new(),
            ..base()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.config_field(), Some("committer_name/author_name"));
    }

    #[test]
    fn both_emails_missing() {
        let err = StoreConfig {
            committer_email: "  ".into(),
            ..base()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.config_field(), Some("committer_email/author_email"));
    }

    #[test]
    fn required_fields() {
        let err = StoreConfig { branch: String::new(), ..base() }.validate().unwrap_err();
        assert_eq!(err.config_field(), Some("branch"));

        let err = StoreConfig { remote_url: String::new(), ..base() }.validate().unwrap_err();
        assert_eq!(err.config_field(), Some("remote_url"));

        let err = StoreConfig { local_directory: PathBuf::new(), ..base() }
            .validate()
            .unwrap_err();
        assert_eq!(err.config_field(), Some("local_directory"));
    }

    #[test]
    fn password_defaults_to_empty() {
        let cfg = base().validate().unwrap();
        assert_eq!(cfg.credentials.password, "");
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = StoreConfig { clone_attempts: 0, ..base() }.validate().unwrap_err();
        assert_eq!(err.config_field(), Some("clone_attempts"));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(300));
        assert_eq!(policy.backoff(30), Duration::from_millis(300));
    }

    #[test]
    fn from_toml() {
        let cfg = StoreConfig::from_toml_str(
            r#"
            remote_url = "file:///srv/data.git"
            branch = "unit-test"
            local_directory = "/var/lib/gitstore"
            author_name = "bot"
            committer_email = "bot@example.com"
            clone_attempts = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.branch, "unit-test");
        assert_eq!(cfg.clone_attempts, 2);
        assert_eq!(cfg.clone_backoff_ms, DEFAULT_CLONE_BACKOFF_MS);
        assert!(cfg.password.is_none());

        let sync = cfg.validate().unwrap();
        assert_eq!(sync.committer.name, "bot");
        assert_eq!(sync.author.email, "bot@example.com");
        assert_eq!(sync.retry.max_attempts, 2);
    }

    #[test]
    fn load_from_environment() {
        std::env::set_var("GITSTORE_BRANCH", "env-branch");
        std::env::set_var("GITSTORE_LOCAL_DIRECTORY", "/tmp/env-store");
        std::env::set_var("GITSTORE_CLONE_ATTEMPTS", "3");
        let cfg = StoreConfig::load(None).unwrap();
        std::env::remove_var("GITSTORE_BRANCH");
        std::env::remove_var("GITSTORE_LOCAL_DIRECTORY");
        std::env::remove_var("GITSTORE_CLONE_ATTEMPTS");

        assert_eq!(cfg.branch, "env-branch");
        assert_eq!(cfg.local_directory, PathBuf::from("/tmp/env-store"));
        assert_eq!(cfg.clone_attempts, 3);
    }
}
