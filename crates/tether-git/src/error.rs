//! Error types for tether-git.
//!
//! Operations work in terms of [`Error`] internally and translate it into
//! the contract's failure kinds at the trait boundary, keeping the native
//! diagnostic in the failure payload.

use std::path::PathBuf;

use serde_json::{Value, json};
use tether_core::Failure;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during git operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Local directory holds no repository yet.
    #[error("repository has not been cloned into {}", .0.display())]
    NotCloned(PathBuf),

    /// Handle has no remote location.
    #[error("no remote bound to handle")]
    NoRemote,

    /// Remote not configured in the working copy.
    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    /// Branch not found.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// HEAD is detached (not on a branch).
    #[error("HEAD is detached - checkout a branch first")]
    DetachedHead,

    /// Path is absolute, escapes the working tree, or targets `.git`.
    #[error("invalid repository path: {0}")]
    InvalidPath(String),

    /// File missing from the working tree and the index.
    #[error("no such file: {0}")]
    FileNotFound(String),

    /// File content is not UTF-8 text.
    #[error("file is not valid UTF-8: {0}")]
    NotUtf8(String),

    /// Commit message is empty.
    #[error("commit message must not be empty")]
    EmptyMessage,

    /// Working directory is dirty.
    #[error("working directory has uncommitted changes")]
    DirtyWorkingDirectory,

    /// Clone target holds unrelated files.
    #[error("refusing to clone into non-empty directory {}", .0.display())]
    DirectoryNotEmpty(PathBuf),

    /// Clone target is a repository that is not a clone of the bound remote.
    #[error("{} is not a clone of {remote}", .path.display())]
    ForeignRepository { path: PathBuf, remote: String },

    /// Merge stopped on conflicts.
    #[error("merge conflict in: {0:?}")]
    MergeConflict(Vec<String>),

    /// Remote refused a reference update.
    #[error("push rejected for {refname}: {status}")]
    PushRejected { refname: String, status: String },

    /// Transfer exceeded its deadline.
    #[error("transfer timed out after {0}s")]
    TimedOut(u64),

    /// Caller abandoned the transfer.
    #[error("transfer cancelled")]
    Cancelled,

    /// Blocking task panicked or was aborted.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Underlying git2 error.
    #[error("git error: {0}")]
    Git2(#[from] git2::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short machine-readable tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotCloned(_) => "not_cloned",
            Self::NoRemote => "no_remote",
            Self::RemoteNotFound(_) => "remote_not_found",
            Self::BranchNotFound(_) => "branch_not_found",
            Self::DetachedHead => "detached_head",
            Self::InvalidPath(_) => "invalid_path",
            Self::FileNotFound(_) => "file_not_found",
            Self::NotUtf8(_) => "not_utf8",
            Self::EmptyMessage => "empty_message",
            Self::DirtyWorkingDirectory => "dirty",
            Self::DirectoryNotEmpty(_) => "directory_not_empty",
            Self::ForeignRepository { .. } => "foreign_repository",
            Self::MergeConflict(_) => "merge_conflict",
            Self::PushRejected { .. } => "rejected",
            Self::TimedOut(_) => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Join(_) => "join",
            Self::Git2(_) => "git2",
            Self::Io(_) => "io",
        }
    }

    fn details(&self) -> Value {
        let kind = self.kind();
        match self {
            Self::Git2(e) => json!({
                "kind": kind,
                "code": format!("{:?}", e.code()),
                "class": format!("{:?}", e.class()),
                "message": e.message(),
            }),
            Self::Io(e) => json!({
                "kind": kind,
                "io_kind": e.kind().to_string(),
                "message": e.to_string(),
            }),
            Self::MergeConflict(paths) => json!({ "kind": kind, "conflicts": paths }),
            Self::PushRejected { refname, status } => json!({
                "kind": kind,
                "ref": refname,
                "status": status,
            }),
            Self::BranchNotFound(name) => json!({ "kind": kind, "branch": name }),
            Self::ForeignRepository { path, remote } => json!({
                "kind": kind,
                "path": path.display().to_string(),
                "remote": remote,
            }),
            Self::InvalidPath(path) | Self::FileNotFound(path) | Self::NotUtf8(path) => {
                json!({ "kind": kind, "path": path })
            }
            Self::TimedOut(secs) => json!({ "kind": kind, "timeout_seconds": secs }),
            _ => json!({ "kind": kind }),
        }
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self::new(err.to_string()).with_errors(err.details())
    }
}

/// Translate an internal error into an operation's failure kind.
pub(crate) fn fail<K: From<Failure>>(err: Error) -> K {
    tracing::warn!(error = %err, kind = err.kind(), "git operation failed");
    K::from(Failure::from(err))
}
