//! # tether-core
//!
//! Backend-agnostic contract for version-control operations against a
//! repository with a local working copy and a remote counterpart.
//!
//! Backends implement [`RepositoryOps`]; every operation fails with its own
//! nominal error kind built on [`Failure`]. The [`memory`] module provides a
//! conforming in-memory backend for tests.

pub mod config;
mod error;
mod handle;
pub mod memory;
mod traits;
mod types;

pub use config::{ConfigError, Options};
pub use error::{
    AddFileError, BranchesError, ChangedFilesError, CheckoutError, CloneError, CommitError,
    Failure, FetchError, FileContentError, FileHistoryError, Operation, OperationError, PullError,
    PushError, Result, StatusError, UpdateFileError,
};
pub use handle::{Credential, RepositoryHandle};
pub use traits::RepositoryOps;
pub use types::{
    BranchDescriptor, BranchKind, ChangeArea, ChangeEntry, ChangeKind, CommitRecord,
    StatusSummary, normalize_path,
};
