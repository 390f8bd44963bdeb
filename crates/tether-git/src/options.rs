//! Options recognized by the git backend.

use std::path::PathBuf;

use serde::Deserialize;
use tether_core::{ConfigError, Options};

/// Git backend settings, read from the handle's option bag.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitOptions {
    /// Name of the remote to clone as, fetch from and push to.
    pub remote_name: String,

    /// Branch to check out after clone instead of the remote's HEAD.
    pub branch: Option<String>,

    /// History depth for shallow clone/fetch.
    pub depth: Option<i32>,

    /// Deadline for clone/fetch transfers.
    ///
    /// Checked whenever the remote reports progress, so a remote that stalls
    /// before sending anything (during connect or authentication) is bounded
    /// by the transport's own timeouts instead.
    pub timeout_seconds: Option<u64>,

    /// Private key for SSH remotes. Falls back to the SSH agent when unset.
    pub ssh_key_path: Option<PathBuf>,

    /// Commit author name; both name and email must be set to override
    /// the repository's configured identity.
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

impl Default for GitOptions {
    fn default() -> Self {
        Self {
            remote_name: default_remote(),
            branch: None,
            depth: None,
            timeout_seconds: None,
            ssh_key_path: None,
            author_name: None,
            author_email: None,
        }
    }
}

fn default_remote() -> String {
    "origin".into()
}

impl GitOptions {
    /// Extract and validate git options from an option bag.
    ///
    /// # Errors
    /// Returns error if a recognized option has the wrong type or value.
    pub fn from_options(options: &Options) -> Result<Self, ConfigError> {
        let parsed: Self = options.parse()?;

        if parsed.depth.is_some_and(|d| d <= 0) {
            return Err(ConfigError::Invalid {
                key: "depth".into(),
                message: "must be positive".into(),
            });
        }
        if parsed.remote_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "remote_name".into(),
                message: "must not be empty".into(),
            });
        }

        Ok(parsed)
    }
}
