//! The repository operations contract.
//!
//! This module defines the `RepositoryOps` trait every backend implements.
//! Callers program against the trait, never against a concrete backend.

use std::future::Future;

use crate::error::{
    AddFileError, BranchesError, ChangedFilesError, CheckoutError, CloneError, CommitError,
    FetchError, FileContentError, FileHistoryError, PullError, PushError, StatusError,
    UpdateFileError,
};
use crate::handle::RepositoryHandle;
use crate::types::{BranchDescriptor, ChangeEntry, CommitRecord, StatusSummary};

/// Trait for version-control operations on a bound repository.
///
/// Implementations are constructed from a [`RepositoryHandle`] and must not
/// perform I/O until an operation is called.
///
/// `clone_repo` and `fetch` return futures because they are unbounded network
/// transfers; dropping the future abandons the transfer and leaves the local
/// directory in a state a later `clone_repo` can resume or overwrite. All
/// other operations block until they complete or fail.
///
/// Operations that return `bool` report expected non-conditions (nothing to
/// commit, nothing to push) as `Ok(false)`. Errors are reserved for
/// unexpected failures and are always the kind named for the operation.
///
/// Mutating operations take `&mut self`: one in-flight operation per handle.
#[allow(clippy::missing_errors_doc)]
pub trait RepositoryOps: Send {
    /// The handle this repository is bound to.
    fn handle(&self) -> &RepositoryHandle;

    // === Lifecycle ===

    /// Materialize the local directory from the remote.
    fn clone_repo(&mut self) -> impl Future<Output = Result<bool, CloneError>> + Send;

    /// Update remote-tracking state from the remote.
    fn fetch(&mut self) -> impl Future<Output = Result<bool, FetchError>> + Send;

    // === Synchronization ===

    /// Fetch and integrate the upstream of the current branch.
    fn pull(&mut self) -> Result<bool, PullError>;

    /// Send local commits on the current branch to the remote.
    fn push(&mut self) -> Result<bool, PushError>;

    // === Mutation ===

    /// Record staged changes as a new commit.
    ///
    /// `message` must be non-empty.
    fn commit(&mut self, message: &str) -> Result<bool, CommitError>;

    /// Stage a file for the next commit.
    fn add_file(&mut self, file_path: &str) -> Result<bool, AddFileError>;

    /// Overwrite a working-tree file. Does not stage.
    fn update_file_content(
        &mut self,
        file_path: &str,
        content: &str,
    ) -> Result<bool, UpdateFileError>;

    /// Switch to an existing local branch, given by name or as a
    /// [`BranchDescriptor`] from [`get_branches`](Self::get_branches).
    ///
    /// Never creates a branch; a missing branch is an error and leaves
    /// HEAD unchanged.
    fn checkout(&mut self, branch: impl AsRef<str>) -> Result<bool, CheckoutError>;

    // === Reads ===

    /// Read a working-tree file.
    fn get_file_content(&self, file_path: &str) -> Result<String, FileContentError>;

    /// Commits that touched a file, most recent first.
    fn get_file_history(&self, file_path: &str) -> Result<Vec<CommitRecord>, FileHistoryError>;

    /// Files differing from the last commit, staged and unstaged.
    fn get_changed_files(&self) -> Result<Vec<ChangeEntry>, ChangedFilesError>;

    /// Local and remote-tracking branches.
    fn get_branches(&self) -> Result<Vec<BranchDescriptor>, BranchesError>;

    /// Summary of the current repository state.
    fn status(&self) -> Result<StatusSummary, StatusError>;
}
