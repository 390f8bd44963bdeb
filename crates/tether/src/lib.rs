//! # tether
//!
//! Backend-agnostic repository operations for tools that should not care
//! whether work is done by libgit2 or by an in-memory simulation.
//!
//! ```no_run
//! use tether::{Backend, Credential, Options, RepositoryHandle, RepositoryOps};
//!
//! # async fn demo() -> tether::Result<()> {
//! let handle = RepositoryHandle::new("https://example.com/team/notes.git", "/srv/notes")
//!     .with_credential(Credential::with_username("bot", "token"))
//!     .with_options(Options::new().with("depth", 1));
//! let mut repo = Backend::open(handle).expect("valid options");
//!
//! repo.clone_repo().await?;
//! repo.update_file_content("a.txt", "hello")?;
//! repo.add_file("a.txt")?;
//! if repo.commit("init")? {
//!     repo.push()?;
//! }
//! # Ok(())
//! # }
//! ```

mod backend;

pub use backend::{Backend, BackendKind};
pub use tether_core::memory;
pub use tether_core::{
    AddFileError, BranchDescriptor, BranchKind, BranchesError, ChangeArea, ChangeEntry,
    ChangeKind, ChangedFilesError, CheckoutError, CloneError, CommitError, CommitRecord,
    ConfigError, Credential, FetchError, Failure, FileContentError, FileHistoryError, Operation,
    OperationError, Options, PullError, PushError, RepositoryHandle, RepositoryOps, Result,
    StatusError, StatusSummary, UpdateFileError,
};
pub use tether_git::{GitOptions, GitRepository};
