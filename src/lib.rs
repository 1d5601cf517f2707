//! A serialized file store backed by a remote git repository.
//!
//! `gitstore` keeps a local checkout of one branch of a remote repository
//! and exposes it as a small key/value store: read, write, append, delete
//! and search files, then [`GitStore::push_to_remote`] to commit and publish
//! the changes, or [`GitStore::pull_from_remote`] to replace the checkout
//! with a fresh clone.
//!
//! # Key types
//!
//! - [`GitStore`]: the store. Every operation takes one exclusive lock, so
//!   it is safe to share between tasks.
//! - [`StoreConfig`]: remote, branch, local directory, identities and
//!   credentials, bound from TOML and `GITSTORE_*` environment variables.
//! - [`VersionControlBackend`]: the git operations the store drives;
//!   [`Git2Backend`] implements them with libgit2.
//!
//! # Quick example
//!
//! ```rust,no_run
//! use gitstore::{GitStore, StoreConfig, TextEncoding};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> gitstore::Result<()> {
//! let store = GitStore::open(StoreConfig::load(None)?)?;
//! let cancel = CancellationToken::new();
//!
//! store.pull_from_remote(&cancel).await?;
//! store
//!     .insert_or_update_text("settings/app.json", "{}", TextEncoding::Utf8, &cancel)
//!     .await?;
//! let text = store.get_text("settings/app.json", TextEncoding::Utf8, &cancel).await?;
//! assert_eq!(text.as_deref(), Some("{}"));
//!
//! store.push_to_remote("update settings", &cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod dirs;
pub mod encoding;
pub mod error;
pub mod git;
pub mod glob;
mod lock;
pub mod paths;
pub mod store;
mod sync;
pub mod types;

// Re-export primary public types at crate root.
pub use backend::VersionControlBackend;
pub use config::{RetryPolicy, StoreConfig, SyncConfig};
pub use dirs::SearchOption;
pub use encoding::TextEncoding;
pub use error::{Error, Result};
pub use git::Git2Backend;
pub use store::{GitStore, GitStoreBuilder};
pub use types::*;
