use std::path::PathBuf;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// All errors produced by gitstore.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {field}: {message}")]
    Config {
        field: &'static str,
        message: String,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("clone failed: {0}")]
    Clone(#[source] BoxError),

    #[error("stage failed: {0}")]
    Stage(#[source] BoxError),

    #[error("status check failed: {0}")]
    Status(#[source] BoxError),

    #[error("commit failed: {0}")]
    Commit(#[source] BoxError),

    #[error("push failed: {0}")]
    Push(#[source] BoxError),

    #[error("git error: {0}")]
    Git(#[source] BoxError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("cannot decode {path}: {message}")]
    Encoding { path: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Convenience constructors
// ---------------------------------------------------------------------------

impl Error {
    pub fn config(field: &'static str, message: impl Into<String>) -> Self {
        Self::Config {
            field,
            message: message.into(),
        }
    }

    /// A required configuration field was left empty.
    pub fn missing(field: &'static str) -> Self {
        Self::config(field, "is not assigned")
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn clone_failed(err: impl Into<BoxError>) -> Self {
        Self::Clone(err.into())
    }

    pub fn stage(err: impl Into<BoxError>) -> Self {
        Self::Stage(err.into())
    }

    pub fn status(err: impl Into<BoxError>) -> Self {
        Self::Status(err.into())
    }

    pub fn commit(err: impl Into<BoxError>) -> Self {
        Self::Commit(err.into())
    }

    pub fn push(err: impl Into<BoxError>) -> Self {
        Self::Push(err.into())
    }

    pub fn git(err: impl Into<BoxError>) -> Self {
        Self::Git(err.into())
    }

    pub fn encoding(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encoding {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.into().display(), err),
        ))
    }

    /// Whether the sync layer may retry the failed operation.
    ///
    /// Only clone failures qualify; commit and push failures are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Clone(_))
    }

    /// The configuration field named by a [`Error::Config`], if any.
    pub fn config_field(&self) -> Option<&'static str> {
        match self {
            Self::Config { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::config("config", err.to_string())
    }
}
