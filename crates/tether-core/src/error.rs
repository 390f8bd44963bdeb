//! Failure taxonomy for repository operations.
//!
//! Every contract operation fails with exactly one kind, named after its
//! operation category. The kinds are nominally distinct wrappers around the
//! same [`Failure`] record so callers can decide on recovery by matching on
//! the type instead of parsing messages.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Result type alias defaulting to [`OperationError`].
pub type Result<T, E = OperationError> = std::result::Result<T, E>;

/// Base failure record shared by every operation-specific kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Structured payload: sub-errors or backend diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl Failure {
    /// Create a failure with a message and no payload.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            errors: None,
        }
    }

    /// Create a failure carrying neither message nor payload.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            message: None,
            errors: None,
        }
    }

    /// Attach a structured payload.
    #[must_use]
    pub fn with_errors(mut self, errors: Value) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Build a failure whose payload is a list of nested failures.
    #[must_use]
    pub fn aggregate(message: impl Into<String>, failures: Vec<Self>) -> Self {
        let nested = failures
            .into_iter()
            .map(|f| serde_json::to_value(f).unwrap_or(Value::Null))
            .collect();
        Self::new(message).with_errors(Value::Array(nested))
    }

    /// Build a failure from a native error, keeping its full source chain.
    #[must_use]
    pub fn from_source(message: impl Into<String>, source: &dyn std::error::Error) -> Self {
        let mut chain = Vec::new();
        let mut current = source.source();
        while let Some(cause) = current {
            chain.push(Value::String(cause.to_string()));
            current = cause.source();
        }

        Self::new(message).with_errors(json!({
            "source": source.to_string(),
            "chain": chain,
        }))
    }

    /// Read the nested failures back out of an aggregate payload.
    ///
    /// Returns an empty list when the payload is absent or not an aggregate.
    #[must_use]
    pub fn nested(&self) -> Vec<Self> {
        match &self.errors {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => f.write_str(message),
            None => f.write_str("no details available"),
        }
    }
}

impl std::error::Error for Failure {}

/// Operation category a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Clone,
    Fetch,
    Pull,
    Commit,
    Push,
    FileContent,
    UpdateFile,
    FileHistory,
    AddFile,
    ChangedFiles,
    Branches,
    Checkout,
    Status,
}

impl Operation {
    /// Name of the contract operation this category covers.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Clone => "clone",
            Self::Fetch => "fetch",
            Self::Pull => "pull",
            Self::Commit => "commit",
            Self::Push => "push",
            Self::FileContent => "get_file_content",
            Self::UpdateFile => "update_file_content",
            Self::FileHistory => "get_file_history",
            Self::AddFile => "add_file",
            Self::ChangedFiles => "get_changed_files",
            Self::Branches => "get_branches",
            Self::Checkout => "checkout",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! failure_kinds {
    ($($(#[$meta:meta])* $name:ident => $op:ident,)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
            #[error("{} failed: {}", Operation::$op, .0)]
            pub struct $name(Failure);

            impl $name {
                /// Operation category of this kind.
                pub const OPERATION: Operation = Operation::$op;

                /// Create a failure of this kind with a message.
                #[must_use]
                pub fn new(message: impl Into<String>) -> Self {
                    Self(Failure::new(message))
                }

                /// Human-readable message, if any.
                #[must_use]
                pub fn message(&self) -> Option<&str> {
                    self.0.message.as_deref()
                }

                /// Structured payload, if any.
                #[must_use]
                pub const fn errors(&self) -> Option<&Value> {
                    self.0.errors.as_ref()
                }

                /// Borrow the underlying record.
                #[must_use]
                pub const fn failure(&self) -> &Failure {
                    &self.0
                }

                /// Unwrap into the underlying record.
                #[must_use]
                pub fn into_failure(self) -> Failure {
                    self.0
                }
            }

            impl From<Failure> for $name {
                fn from(failure: Failure) -> Self {
                    Self(failure)
                }
            }
        )+

        /// Any failure produced by a contract operation.
        ///
        /// Lets callers use `?` across several operations while still
        /// discriminating by category.
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum OperationError {
            $(
                #[error(transparent)]
                $op(#[from] $name),
            )+
        }

        impl OperationError {
            /// Operation category of the wrapped failure.
            #[must_use]
            pub const fn operation(&self) -> Operation {
                match self {
                    $(Self::$op(_) => Operation::$op,)+
                }
            }

            /// Borrow the underlying record.
            #[must_use]
            pub const fn failure(&self) -> &Failure {
                match self {
                    $(Self::$op(e) => e.failure(),)+
                }
            }
        }
    };
}

failure_kinds! {
    /// Cloning the remote into the local directory failed.
    CloneError => Clone,
    /// Fetching from the remote failed.
    FetchError => Fetch,
    /// Pulling (fetch + integrate) failed.
    PullError => Pull,
    /// Recording a commit failed.
    CommitError => Commit,
    /// Sending commits to the remote failed.
    PushError => Push,
    /// Reading a working-tree file failed.
    FileContentError => FileContent,
    /// Writing a working-tree file failed.
    UpdateFileError => UpdateFile,
    /// Reading a file's commit history failed.
    FileHistoryError => FileHistory,
    /// Staging a file failed.
    AddFileError => AddFile,
    /// Listing changed files failed.
    ChangedFilesError => ChangedFiles,
    /// Listing branches failed.
    BranchesError => Branches,
    /// Switching branches failed.
    CheckoutError => Checkout,
    /// Reading repository status failed.
    StatusError => Status,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_operation() {
        let err = PullError::new("remote unreachable");
        assert_eq!(err.to_string(), "pull failed: remote unreachable");

        let err = FileContentError::from(Failure::empty());
        assert_eq!(
            err.to_string(),
            "get_file_content failed: no details available"
        );
    }

    #[test]
    fn test_payload_survives_wrapping() {
        let failure = Failure::new("merge conflict").with_errors(json!({
            "conflicts": ["a.txt", "b.txt"],
        }));
        let err = CommitError::from(failure.clone());

        assert_eq!(err.message(), Some("merge conflict"));
        assert_eq!(err.errors().unwrap()["conflicts"][1], "b.txt");
        assert_eq!(err.into_failure(), failure);
    }

    #[test]
    fn test_operation_error_discriminates() {
        fn pull_then_push(fail_push: bool) -> Result<()> {
            let pulled: Result<(), PullError> = if fail_push {
                Ok(())
            } else {
                Err(PullError::new("offline"))
            };
            pulled?;

            let pushed: Result<(), PushError> = Err(PushError::new("rejected"));
            pushed?;
            Ok(())
        }

        let err = pull_then_push(true).unwrap_err();
        assert_eq!(err.operation(), Operation::Push);
        assert!(matches!(err, OperationError::Push(_)));

        let err = pull_then_push(false).unwrap_err();
        assert_eq!(err.operation(), Operation::Pull);
        assert_eq!(err.failure().message.as_deref(), Some("offline"));
    }

    #[test]
    fn test_aggregate_roundtrip() {
        let failure = Failure::aggregate(
            "two files failed",
            vec![Failure::new("a.txt: locked"), Failure::new("b.txt: missing")],
        );

        let nested = failure.nested();
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].message.as_deref(), Some("a.txt: locked"));
        assert!(Failure::new("plain").nested().is_empty());
    }

    #[test]
    fn test_from_source_keeps_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let failure = Failure::from_source("could not write", &io);

        assert_eq!(failure.message.as_deref(), Some("could not write"));
        assert_eq!(failure.errors.unwrap()["source"], "denied");
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::UpdateFile.to_string(), "update_file_content");
        assert_eq!(CheckoutError::OPERATION, Operation::Checkout);
        assert_eq!(
            serde_json::to_string(&Operation::ChangedFiles).unwrap(),
            "\"changed_files\""
        );
    }
}
