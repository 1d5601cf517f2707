use std::fmt;

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Author/committer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Username/password pair presented to the remote.
///
/// For token authentication the token usually goes in `username` with an
/// empty password.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `true` when no username is configured (anonymous access).
    pub fn is_empty(&self) -> bool {
        self.username.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials each time the remote asks for them.
///
/// Called once per authentication request, so implementations can refresh
/// short-lived tokens. Returning `None` means anonymous access.
pub trait CredentialsProvider: Send + Sync {
    fn credentials(&self, url: &str) -> Option<Credentials>;
}

impl CredentialsProvider for Credentials {
    fn credentials(&self, _url: &str) -> Option<Credentials> {
        if self.is_empty() {
            None
        } else {
            Some(self.clone())
        }
    }
}

/// Adapts a closure into a [`CredentialsProvider`].
pub struct CredentialsFn<F>(pub F);

impl<F> CredentialsProvider for CredentialsFn<F>
where
    F: Fn(&str) -> Option<Credentials> + Send + Sync,
{
    fn credentials(&self, url: &str) -> Option<Credentials> {
        (self.0)(url)
    }
}

// ---------------------------------------------------------------------------
// Sync outcomes
// ---------------------------------------------------------------------------

/// Result of a successful pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullReport {
    /// Clone attempts made, the successful one included.
    pub attempts: u32,
}

/// Result of a successful push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// A commit was created and pushed.
    Pushed { commit: String },
    /// The working tree had no changes; nothing was committed.
    Clean,
    /// The working directory does not exist yet; nothing to push.
    NoWorkingDirectory,
}

impl PushOutcome {
    /// `true` when a commit was pushed.
    pub fn pushed(&self) -> bool {
        matches!(self, Self::Pushed { .. })
    }
}
