//! # tether-git
//!
//! Reference backend for the tether repository contract, built on git2-rs.
//! Clone and fetch run on Tokio's blocking pool; every other operation is
//! a direct blocking call.

mod error;
mod options;
mod remote;
mod repository;

pub use error::{Error, Result};
pub use git2::Oid;
pub use options::GitOptions;
pub use repository::GitRepository;
