//! Remote transfer plumbing: credentials, deadlines and abandonment.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use git2::{Cred, CredentialType, FetchOptions, RemoteCallbacks};
use tether_core::Credential;

use crate::error::Error;
use crate::options::GitOptions;

/// Abort switch shared between the caller and a blocking transfer.
#[derive(Debug, Clone)]
pub(crate) struct Transfer {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
    timeout_seconds: Option<u64>,
}

impl Transfer {
    pub(crate) fn new(timeout_seconds: Option<u64>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: timeout_seconds.map(|s| Instant::now() + Duration::from_secs(s)),
            timeout_seconds,
        }
    }

    /// Guard that cancels the transfer when dropped.
    ///
    /// Held by the future awaiting the transfer, so abandoning the future
    /// stops the blocking work at its next progress tick.
    pub(crate) fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop(Arc::clone(&self.cancelled))
    }

    fn should_continue(&self) -> bool {
        !self.cancelled.load(Ordering::Relaxed)
            && self.deadline.is_none_or(|deadline| Instant::now() < deadline)
    }

    /// Attribute a transfer error to cancellation or timeout when either fired.
    pub(crate) fn interpret(&self, err: git2::Error) -> Error {
        if self.cancelled.load(Ordering::Relaxed) {
            return Error::Cancelled;
        }
        match (self.deadline, self.timeout_seconds) {
            (Some(deadline), Some(secs)) if Instant::now() >= deadline => Error::TimedOut(secs),
            _ => Error::Git2(err),
        }
    }
}

#[derive(Debug)]
pub(crate) struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Build remote callbacks answering credential requests from the handle.
///
/// Each credential type is offered once; libgit2 asks again after a rejected
/// attempt, and repeating the same answer would loop forever.
pub(crate) fn callbacks<'a>(
    credential: Option<&'a Credential>,
    ssh_key_path: Option<&'a Path>,
    transfer: Option<Transfer>,
) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    let mut offered = CredentialType::empty();

    callbacks.credentials(move |_url, username_from_url, allowed| {
        let username = credential
            .and_then(Credential::username)
            .or(username_from_url)
            .unwrap_or("git");

        if allowed.contains(CredentialType::SSH_KEY) && !offered.contains(CredentialType::SSH_KEY)
        {
            offered |= CredentialType::SSH_KEY;
            let passphrase = credential.map(Credential::expose_secret);
            return match ssh_key_path {
                Some(path) => Cred::ssh_key(username, None, path, passphrase),
                None => Cred::ssh_key_from_agent(username),
            };
        }

        if let Some(credential) = credential {
            if allowed.contains(CredentialType::USER_PASS_PLAINTEXT)
                && !offered.contains(CredentialType::USER_PASS_PLAINTEXT)
            {
                offered |= CredentialType::USER_PASS_PLAINTEXT;
                return Cred::userpass_plaintext(username, credential.expose_secret());
            }
        }

        if allowed.contains(CredentialType::USERNAME) && !offered.contains(CredentialType::USERNAME)
        {
            offered |= CredentialType::USERNAME;
            return Cred::username(username);
        }

        if allowed.contains(CredentialType::DEFAULT) && !offered.contains(CredentialType::DEFAULT) {
            offered |= CredentialType::DEFAULT;
            return Cred::default();
        }

        Err(git2::Error::from_str("no usable credentials for remote"))
    });

    if let Some(transfer) = transfer {
        let negotiation = transfer.clone();
        callbacks.sideband_progress(move |_| negotiation.should_continue());
        callbacks.transfer_progress(move |_| transfer.should_continue());
    }

    callbacks
}

/// Fetch options carrying credentials, depth and the transfer switch.
pub(crate) fn fetch_options<'a>(
    credential: Option<&'a Credential>,
    options: &'a GitOptions,
    transfer: &Transfer,
) -> FetchOptions<'a> {
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(callbacks(
        credential,
        options.ssh_key_path.as_deref(),
        Some(transfer.clone()),
    ));
    if let Some(depth) = options.depth {
        fetch.depth(depth);
    }
    fetch
}
