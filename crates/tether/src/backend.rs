//! Backend selection.
//!
//! The backend is chosen once, at construction, from explicit configuration:
//! the handle's `backend` option or an explicit [`BackendKind`].

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tether_core::memory::MemoryRepository;
use tether_core::{
    AddFileError, BranchDescriptor, BranchesError, ChangeEntry, ChangedFilesError, CheckoutError,
    CloneError, CommitError, CommitRecord, ConfigError, FetchError, FileContentError,
    FileHistoryError, PullError, PushError, RepositoryHandle, RepositoryOps, StatusError,
    StatusSummary, UpdateFileError,
};
use tether_git::GitRepository;

/// Available backend technologies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// libgit2 working copy on disk.
    #[default]
    Git,
    /// In-memory simulation, remotes resolved by location.
    Memory,
}

impl BackendKind {
    /// Read the `backend` option, defaulting to git.
    ///
    /// # Errors
    /// Returns error if the option names an unknown backend.
    pub fn from_handle(handle: &RepositoryHandle) -> Result<Self, ConfigError> {
        Ok(handle.options().get("backend")?.unwrap_or_default())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(Self::Git),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Invalid {
                key: "backend".into(),
                message: format!("unknown backend '{other}'"),
            }),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Git => "git",
            Self::Memory => "memory",
        })
    }
}

/// A repository bound to whichever backend configuration selected.
#[derive(Debug)]
pub enum Backend {
    Git(GitRepository),
    Memory(MemoryRepository),
}

impl Backend {
    /// Bind a handle to the backend named by its `backend` option.
    ///
    /// # Errors
    /// Returns error if the option is invalid or the backend rejects the handle.
    pub fn open(handle: RepositoryHandle) -> Result<Self, ConfigError> {
        let kind = BackendKind::from_handle(&handle)?;
        Self::with_kind(kind, handle)
    }

    /// Bind a handle to an explicitly chosen backend.
    ///
    /// # Errors
    /// Returns error if the backend rejects the handle's options.
    pub fn with_kind(kind: BackendKind, handle: RepositoryHandle) -> Result<Self, ConfigError> {
        tracing::debug!(backend = %kind, dir = %handle.local_dir().display(), "binding repository");
        match kind {
            BackendKind::Git => Ok(Self::Git(GitRepository::new(handle)?)),
            BackendKind::Memory => Ok(Self::Memory(MemoryRepository::new(handle))),
        }
    }

    /// Which backend this is.
    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::Git(_) => BackendKind::Git,
            Self::Memory(_) => BackendKind::Memory,
        }
    }
}

macro_rules! delegate {
    ($self:ident, $repo:ident => $call:expr) => {
        match $self {
            Backend::Git($repo) => $call,
            Backend::Memory($repo) => $call,
        }
    };
}

impl RepositoryOps for Backend {
    fn handle(&self) -> &RepositoryHandle {
        delegate!(self, repo => repo.handle())
    }

    async fn clone_repo(&mut self) -> Result<bool, CloneError> {
        delegate!(self, repo => repo.clone_repo().await)
    }

    async fn fetch(&mut self) -> Result<bool, FetchError> {
        delegate!(self, repo => repo.fetch().await)
    }

    fn pull(&mut self) -> Result<bool, PullError> {
        delegate!(self, repo => repo.pull())
    }

    fn push(&mut self) -> Result<bool, PushError> {
        delegate!(self, repo => repo.push())
    }

    fn commit(&mut self, message: &str) -> Result<bool, CommitError> {
        delegate!(self, repo => repo.commit(message))
    }

    fn add_file(&mut self, file_path: &str) -> Result<bool, AddFileError> {
        delegate!(self, repo => repo.add_file(file_path))
    }

    fn update_file_content(
        &mut self,
        file_path: &str,
        content: &str,
    ) -> Result<bool, UpdateFileError> {
        delegate!(self, repo => repo.update_file_content(file_path, content))
    }

    fn checkout(&mut self, branch: impl AsRef<str>) -> Result<bool, CheckoutError> {
        delegate!(self, repo => repo.checkout(branch))
    }

    fn get_file_content(&self, file_path: &str) -> Result<String, FileContentError> {
        delegate!(self, repo => repo.get_file_content(file_path))
    }

    fn get_file_history(&self, file_path: &str) -> Result<Vec<CommitRecord>, FileHistoryError> {
        delegate!(self, repo => repo.get_file_history(file_path))
    }

    fn get_changed_files(&self) -> Result<Vec<ChangeEntry>, ChangedFilesError> {
        delegate!(self, repo => repo.get_changed_files())
    }

    fn get_branches(&self) -> Result<Vec<BranchDescriptor>, BranchesError> {
        delegate!(self, repo => repo.get_branches())
    }

    fn status(&self) -> Result<StatusSummary, StatusError> {
        delegate!(self, repo => repo.status())
    }
}
