//! Repository handles and credentials.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::config::Options;

/// Opaque authentication value handed to a backend.
///
/// The secret is stored as a `SecretString`, zeroized on drop and
/// redacted from `Debug` output. The contract never inspects it.
#[derive(Clone)]
pub struct Credential {
    username: Option<String>,
    secret: Arc<SecretString>,
}

impl Credential {
    /// Create a credential from a secret alone (token, password, passphrase).
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            username: None,
            secret: Arc::new(SecretString::from(secret.into())),
        }
    }

    /// Create a credential with an accompanying username.
    #[must_use]
    pub fn with_username(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::new(secret)
        }
    }

    /// Username, if one was supplied.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Expose the secret to a backend.
    #[must_use]
    pub fn expose_secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Bound identity of a repository: remote, working copy, credential, options.
///
/// Immutable once built; binding a different remote produces a new handle.
#[derive(Debug, Clone)]
pub struct RepositoryHandle {
    remote: Option<String>,
    local_dir: PathBuf,
    credential: Option<Credential>,
    options: Options,
}

impl RepositoryHandle {
    /// Bind a remote location to a local directory.
    #[must_use]
    pub fn new(remote: impl Into<String>, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            remote: Some(remote.into()),
            ..Self::local(local_dir)
        }
    }

    /// Bind a local directory with no remote.
    ///
    /// Network operations fail until a remote is bound with [`Self::rebind`].
    #[must_use]
    pub fn local(local_dir: impl Into<PathBuf>) -> Self {
        Self {
            remote: None,
            local_dir: local_dir.into(),
            credential: None,
            options: Options::default(),
        }
    }

    /// Attach a credential.
    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Attach backend options.
    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Produce a new handle bound to `remote`, keeping everything else.
    #[must_use]
    pub fn rebind(self, remote: impl Into<String>) -> Self {
        Self {
            remote: Some(remote.into()),
            ..self
        }
    }

    /// Remote location, if bound.
    #[must_use]
    pub fn remote(&self) -> Option<&str> {
        self.remote.as_deref()
    }

    /// Local working copy directory.
    #[must_use]
    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Credential, if supplied.
    #[must_use]
    pub const fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Backend options.
    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }
}
