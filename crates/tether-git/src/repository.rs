//! git2-backed implementation of the repository contract.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Direction, ErrorCode, IndexAddOption, ObjectType, Oid, PushOptions,
    RepositoryState, ResetType, Signature, Sort, Status, StatusOptions,
};
use tether_core::{
    AddFileError, BranchDescriptor, BranchKind, BranchesError, ChangeEntry, ChangeKind,
    ChangedFilesError, CheckoutError, CloneError, CommitError, CommitRecord, ConfigError,
    FetchError, FileContentError, FileHistoryError, PullError, PushError, RepositoryHandle,
    RepositoryOps, StatusError, StatusSummary, UpdateFileError, normalize_path,
};

use crate::error::{Error, Result, fail};
use crate::options::GitOptions;
use crate::remote::{self, Transfer};

/// Working copy bound to a remote through libgit2.
///
/// Construction parses options only; the repository on disk is opened
/// afresh by each operation. `clone_repo` and `fetch` run on Tokio's
/// blocking pool and need a Tokio runtime.
///
/// Transfers are serialized through `transfer_lock`: a transfer whose future
/// was dropped keeps the lock until it aborts, so a retry never races it.
pub struct GitRepository {
    handle: RepositoryHandle,
    options: GitOptions,
    transfer_lock: Arc<Mutex<()>>,
}

impl GitRepository {
    /// Bind to a handle.
    ///
    /// # Errors
    /// Returns error if the handle's options are invalid for this backend.
    pub fn new(handle: RepositoryHandle) -> std::result::Result<Self, ConfigError> {
        let options = GitOptions::from_options(handle.options())?;
        Ok(Self {
            handle,
            options,
            transfer_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Parsed backend options.
    #[must_use]
    pub const fn options(&self) -> &GitOptions {
        &self.options
    }

    /// Create a local branch at the current HEAD.
    ///
    /// Returns the OID of the new branch's tip commit.
    ///
    /// # Errors
    /// Returns error if nothing is cloned, HEAD is unborn, or the branch exists.
    pub fn create_branch(&self, name: &str) -> Result<Oid> {
        let repo = open(self.handle.local_dir())?;
        let head_commit = repo.head()?.peel_to_commit()?;
        let branch = repo.branch(name, &head_commit, false)?;

        branch
            .get()
            .target()
            .ok_or_else(|| Error::BranchNotFound(name.into()))
    }

    /// Name of the checked-out branch.
    ///
    /// # Errors
    /// Returns error if nothing is cloned or HEAD is detached.
    pub fn current_branch(&self) -> Result<String> {
        head_branch(&open(self.handle.local_dir())?)
    }

    fn open(&self) -> Result<git2::Repository> {
        open(self.handle.local_dir())
    }

    fn signature(&self, repo: &git2::Repository) -> Result<Signature<'static>> {
        match (&self.options.author_name, &self.options.author_email) {
            (Some(name), Some(email)) => Ok(Signature::now(name, email)?),
            _ => Ok(repo.signature()?),
        }
    }

    fn find_remote<'r>(&self, repo: &'r git2::Repository) -> Result<git2::Remote<'r>> {
        repo.find_remote(&self.options.remote_name)
            .map_err(|_| Error::RemoteNotFound(self.options.remote_name.clone()))
    }

    // === Synchronization ===

    fn pull_inner(&self) -> Result<bool> {
        let _serial = self.transfer_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let repo = self.open()?;
        let transfer = Transfer::new(self.options.timeout_seconds);
        fetch_remote(&repo, &self.handle, &self.options, &transfer)?;

        let branch = head_branch(&repo)?;
        let upstream_name = format!("refs/remotes/{}/{branch}", self.options.remote_name);
        let Ok(upstream) = repo.find_reference(&upstream_name) else {
            tracing::debug!(%branch, "no upstream to pull from");
            return Ok(false);
        };
        let incoming = repo.reference_to_annotated_commit(&upstream)?;
        let (analysis, _) = repo.merge_analysis(&[&incoming])?;

        if analysis.is_up_to_date() {
            return Ok(true);
        }

        let target = repo.find_commit(incoming.id())?;
        let local_ref = format!("refs/heads/{branch}");

        if analysis.is_unborn() {
            safe_checkout(&repo, target.as_object())?;
            repo.reference(&local_ref, target.id(), false, "pull: initial")?;
            return Ok(true);
        }

        if analysis.is_fast_forward() {
            safe_checkout(&repo, target.as_object())?;
            repo.find_reference(&local_ref)?.set_target(
                target.id(),
                &format!("pull: fast-forward to {}", &target.id().to_string()[..8]),
            )?;
            tracing::info!(%branch, "fast-forwarded");
            return Ok(true);
        }

        if has_uncommitted_changes(&repo)? {
            return Err(Error::DirtyWorkingDirectory);
        }

        repo.merge(&[&incoming], None, Some(CheckoutBuilder::new().safe()))?;
        let mut index = repo.index()?;
        if index.has_conflicts() {
            let conflicts = index
                .conflicts()?
                .filter_map(std::result::Result::ok)
                .filter_map(|c| c.our.or(c.their).or(c.ancestor))
                .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
                .collect();

            let head = repo.head()?.peel_to_commit()?;
            repo.cleanup_state()?;
            repo.reset(head.as_object(), ResetType::Hard, None)?;
            return Err(Error::MergeConflict(conflicts));
        }

        let tree = repo.find_tree(index.write_tree()?)?;
        let head = repo.head()?.peel_to_commit()?;
        let signature = self.signature(&repo)?;
        repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &format!("Merge {} into {branch}", upstream.shorthand().unwrap_or("upstream")),
            &tree,
            &[&head, &target],
        )?;
        repo.cleanup_state()?;
        tracing::info!(%branch, "merged upstream");
        Ok(true)
    }

    fn push_inner(&self) -> Result<bool> {
        let repo = self.open()?;
        let branch = head_branch(&repo)?;
        let local_ref = format!("refs/heads/{branch}");

        let Ok(local) = repo.refname_to_id(&local_ref) else {
            return Ok(false);
        };
        let tracking = format!("refs/remotes/{}/{branch}", self.options.remote_name);
        if repo.refname_to_id(&tracking).ok() == Some(local) {
            tracing::debug!(%branch, "nothing to push");
            return Ok(false);
        }

        let mut remote = self.find_remote(&repo)?;
        let mut rejected = Vec::new();
        {
            let mut callbacks = remote::callbacks(
                self.handle.credential(),
                self.options.ssh_key_path.as_deref(),
                None,
            );
            callbacks.push_update_reference(|refname, status| {
                if let Some(status) = status {
                    rejected.push((refname.to_string(), status.to_string()));
                }
                Ok(())
            });

            let mut push = PushOptions::new();
            push.remote_callbacks(callbacks);
            let refspec = format!("{local_ref}:{local_ref}");
            remote.push(&[refspec.as_str()], Some(&mut push))?;
        }

        if let Some((refname, status)) = rejected.into_iter().next() {
            return Err(Error::PushRejected { refname, status });
        }

        if let Ok(mut local) = repo.find_branch(&branch, BranchType::Local) {
            if local.upstream().is_err() {
                let upstream = format!("{}/{branch}", self.options.remote_name);
                if let Err(e) = local.set_upstream(Some(&upstream)) {
                    tracing::debug!(%branch, error = %e, "could not record upstream");
                }
            }
        }

        tracing::info!(%branch, "pushed");
        Ok(true)
    }

    // === Mutation ===

    fn commit_inner(&self, message: &str) -> Result<bool> {
        if message.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }

        let repo = self.open()?;
        let mut index = repo.index()?;
        let tree_id = index.write_tree()?;

        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        let unchanged = match &parent {
            Some(parent) => parent.tree_id() == tree_id,
            None => index.is_empty(),
        };
        if unchanged {
            tracing::debug!("nothing staged to commit");
            return Ok(false);
        }

        let tree = repo.find_tree(tree_id)?;
        let signature = self.signature(&repo)?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;

        tracing::info!(commit = %oid, "recorded commit");
        Ok(true)
    }

    fn add_inner(&self, file_path: &str) -> Result<bool> {
        let path = checked_path(file_path)?;
        let repo = self.open()?;
        let mut index = repo.index()?;
        let full = self.handle.local_dir().join(&path);

        if full.is_dir() {
            index.add_all([path.as_str()], IndexAddOption::DEFAULT, None)?;
        } else if full.exists() {
            index.add_path(Path::new(&path))?;
        } else if index.get_path(Path::new(&path), 0).is_some() {
            index.remove_path(Path::new(&path))?;
        } else {
            return Err(Error::FileNotFound(path));
        }

        index.write()?;
        Ok(true)
    }

    fn update_inner(&self, file_path: &str, content: &str) -> Result<bool> {
        let path = checked_path(file_path)?;
        self.open()?;

        let full = self.handle.local_dir().join(&path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, content)?;
        Ok(true)
    }

    fn checkout_inner(&self, name: &str) -> Result<bool> {
        let repo = self.open()?;
        let branch = repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| Error::BranchNotFound(name.into()))?;

        let object = branch.get().peel(ObjectType::Commit)?;
        safe_checkout(&repo, &object)?;
        repo.set_head(&format!("refs/heads/{name}"))?;

        tracing::info!(branch = %name, "checked out");
        Ok(true)
    }

    // === Reads ===

    fn content_inner(&self, file_path: &str) -> Result<String> {
        let path = checked_path(file_path)?;
        self.open()?;

        let full = self.handle.local_dir().join(&path);

        let bytes = match fs::read(&full) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound(path));
            }
            Err(e) => return Err(e.into()),
        };
        String::from_utf8(bytes).map_err(|_| Error::NotUtf8(path))
    }

    fn history_inner(&self, file_path: &str) -> Result<Vec<CommitRecord>> {
        let path = checked_path(file_path)?;
        let repo = self.open()?;

        let head = match repo.head() {
            Ok(head) => head.peel_to_commit()?,
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        revwalk.push(head.id())?;

        let mut records = Vec::new();
        for oid in revwalk {
            let commit = repo.find_commit(oid?)?;
            if touches(&commit, &path)? {
                records.push(commit_record(&commit));
            }
        }
        Ok(records)
    }

    fn branches_inner(&self) -> Result<Vec<BranchDescriptor>> {
        let repo = self.open()?;
        let mut descriptors = Vec::new();

        for item in repo.branches(None)? {
            let (branch, branch_type) = item?;
            let Some(name) = branch.name()?.map(String::from) else {
                continue;
            };
            if branch_type == BranchType::Remote && name.ends_with("/HEAD") {
                continue;
            }

            let (kind, upstream) = match branch_type {
                BranchType::Local => (
                    BranchKind::Local,
                    branch
                        .upstream()
                        .ok()
                        .and_then(|u| u.name().ok().flatten().map(String::from)),
                ),
                BranchType::Remote => (BranchKind::Remote, None),
            };

            descriptors.push(BranchDescriptor {
                name,
                kind,
                is_head: branch.is_head(),
                upstream,
                target: branch.get().target().map(|oid| oid.to_string()),
            });
        }
        Ok(descriptors)
    }

    fn status_inner(&self) -> Result<StatusSummary> {
        let repo = self.open()?;
        let branch = head_branch(&repo).ok();
        let head = repo
            .head()
            .ok()
            .and_then(|h| h.target())
            .map(|oid| oid.to_string()[..7].to_string());

        let mut upstream = None;
        let (mut ahead, mut behind) = (0, 0);
        if let Some(local) = branch
            .as_deref()
            .and_then(|b| repo.find_branch(b, BranchType::Local).ok())
        {
            if let Ok(remote) = local.upstream() {
                upstream = remote.name()?.map(String::from);
                if let (Some(l), Some(r)) = (local.get().target(), remote.get().target()) {
                    (ahead, behind) = repo.graph_ahead_behind(l, r)?;
                }
            }
        }

        Ok(StatusSummary {
            branch,
            head,
            upstream,
            ahead,
            behind,
            state: state_name(repo.state()).into(),
            changes: changes(&repo)?,
        })
    }
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("remote", &self.handle.remote())
            .field("local_dir", &self.handle.local_dir())
            .finish_non_exhaustive()
    }
}

// === Blocking transfers ===

fn open(dir: &Path) -> Result<git2::Repository> {
    match git2::Repository::open(dir) {
        Ok(repo) => Ok(repo),
        Err(e) if e.code() == ErrorCode::NotFound => Err(Error::NotCloned(dir.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}

/// Run blocking git work on Tokio's blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

fn fetch_remote(
    repo: &git2::Repository,
    handle: &RepositoryHandle,
    options: &GitOptions,
    transfer: &Transfer,
) -> Result<()> {
    let mut remote = repo
        .find_remote(&options.remote_name)
        .map_err(|_| Error::RemoteNotFound(options.remote_name.clone()))?;
    let mut fetch = remote::fetch_options(handle.credential(), options, transfer);

    remote
        .fetch(&[] as &[&str], Some(&mut fetch), None)
        .map_err(|e| transfer.interpret(e))
}

/// Open the clone of `url` already in `dir`.
///
/// Anything else there, including a repository bound to another remote or
/// with no such remote, belongs to someone else and is left alone.
fn open_own_clone(dir: &Path, url: &str, options: &GitOptions) -> Result<git2::Repository> {
    let foreign = || Error::ForeignRepository {
        path: dir.to_path_buf(),
        remote: url.to_string(),
    };
    let repo = git2::Repository::open(dir).map_err(|_| foreign())?;
    let bound = repo
        .find_remote(&options.remote_name)
        .ok()
        .is_some_and(|remote| remote.url() == Some(url));
    if !bound {
        return Err(foreign());
    }
    Ok(repo)
}

/// Branch to check out after clone: the `branch` option, else the remote's HEAD.
fn remote_default_branch(
    repo: &git2::Repository,
    handle: &RepositoryHandle,
    options: &GitOptions,
) -> Result<Option<String>> {
    if let Some(branch) = &options.branch {
        return Ok(Some(branch.clone()));
    }

    let mut remote = repo
        .find_remote(&options.remote_name)
        .map_err(|_| Error::RemoteNotFound(options.remote_name.clone()))?;
    let callbacks = remote::callbacks(handle.credential(), options.ssh_key_path.as_deref(), None);
    let connection = remote.connect_auth(Direction::Fetch, Some(callbacks), None)?;

    // An empty remote has no HEAD to follow.
    let Ok(default) = connection.default_branch() else {
        return Ok(None);
    };
    Ok(default
        .as_str()
        .and_then(|name| name.strip_prefix("refs/heads/"))
        .map(String::from))
}

/// Complete a clone interrupted before its first checkout.
///
/// A no-op when HEAD already points at a commit or the remote has no branches.
fn finish_clone(
    repo: &git2::Repository,
    handle: &RepositoryHandle,
    options: &GitOptions,
) -> Result<()> {
    match repo.head() {
        Ok(_) => return Ok(()),
        Err(e) if e.code() == ErrorCode::UnbornBranch => {}
        Err(e) => return Err(e.into()),
    }

    let Some(branch) = remote_default_branch(repo, handle, options)? else {
        tracing::debug!("remote has no branches yet");
        return Ok(());
    };
    let tracking = format!("{}/{branch}", options.remote_name);
    let upstream = repo
        .find_branch(&tracking, BranchType::Remote)
        .map_err(|_| Error::BranchNotFound(tracking.clone()))?;

    let commit = upstream.get().peel_to_commit()?;
    safe_checkout(repo, commit.as_object())?;
    let mut local = repo.branch(&branch, &commit, false)?;
    local.set_upstream(Some(&tracking))?;
    repo.set_head(&format!("refs/heads/{branch}"))?;

    tracing::info!(%branch, "finished interrupted clone");
    Ok(())
}

fn clone_blocking(
    handle: &RepositoryHandle,
    options: &GitOptions,
    transfer: &Transfer,
) -> Result<bool> {
    let url = handle.remote().ok_or(Error::NoRemote)?;
    let dir = handle.local_dir();

    if dir.join(".git").exists() {
        let repo = open_own_clone(dir, url, options)?;
        tracing::debug!(dir = %dir.display(), "existing clone found, resuming");
        fetch_remote(&repo, handle, options, transfer)?;
        finish_clone(&repo, handle, options)?;
        return Ok(true);
    }
    if dir.exists() && fs::read_dir(dir)?.next().is_some() {
        return Err(Error::DirectoryNotEmpty(dir.to_path_buf()));
    }

    let mut builder = RepoBuilder::new();
    builder.fetch_options(remote::fetch_options(handle.credential(), options, transfer));
    builder.remote_create(|repo, _name, url| repo.remote(&options.remote_name, url));
    if let Some(branch) = &options.branch {
        builder.branch(branch);
    }

    builder
        .clone(url, dir)
        .map_err(|e| transfer.interpret(e))?;
    Ok(true)
}

fn fetch_blocking(
    handle: &RepositoryHandle,
    options: &GitOptions,
    transfer: &Transfer,
) -> Result<bool> {
    let repo = open(handle.local_dir())?;
    fetch_remote(&repo, handle, options, transfer)?;
    Ok(true)
}

// === Helpers ===

fn checked_path(file_path: &str) -> Result<String> {
    normalize_path(file_path).ok_or_else(|| Error::InvalidPath(file_path.into()))
}

/// Branch HEAD points at, including an unborn one.
fn head_branch(repo: &git2::Repository) -> Result<String> {
    let head = repo.find_reference("HEAD")?;
    head.symbolic_target()
        .and_then(|target| target.strip_prefix("refs/heads/"))
        .map(String::from)
        .ok_or(Error::DetachedHead)
}

/// Checkout that refuses to overwrite local modifications.
fn safe_checkout(repo: &git2::Repository, target: &git2::Object<'_>) -> Result<()> {
    repo.checkout_tree(target, Some(CheckoutBuilder::new().safe()))
        .map_err(|e| match e.code() {
            ErrorCode::Conflict | ErrorCode::MergeConflict => Error::DirtyWorkingDirectory,
            _ => e.into(),
        })
}

fn has_uncommitted_changes(repo: &git2::Repository) -> Result<bool> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(false).include_ignored(false);
    Ok(!repo.statuses(Some(&mut opts))?.is_empty())
}

fn blob_at(commit: &git2::Commit<'_>, path: &str) -> Result<Option<Oid>> {
    match commit.tree()?.get_path(Path::new(path)) {
        Ok(entry) => Ok(Some(entry.id())),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Whether `commit` changed `path`. A merge counts only when the path
/// differs from every parent.
fn touches(commit: &git2::Commit<'_>, path: &str) -> Result<bool> {
    let current = blob_at(commit, path)?;
    if commit.parent_count() == 0 {
        return Ok(current.is_some());
    }
    for parent in commit.parents() {
        if blob_at(&parent, path)? == current {
            return Ok(false);
        }
    }
    Ok(true)
}

fn commit_record(commit: &git2::Commit<'_>) -> CommitRecord {
    let author = commit.author();
    CommitRecord {
        id: commit.id().to_string(),
        summary: commit.summary().unwrap_or_default().to_string(),
        message: commit.message().unwrap_or_default().to_string(),
        author: author.name().unwrap_or_default().to_string(),
        email: author.email().unwrap_or_default().to_string(),
        time: DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0).unwrap_or_default(),
    }
}

fn index_change(status: Status) -> Option<ChangeKind> {
    if status.is_index_new() {
        Some(ChangeKind::Added)
    } else if status.is_index_modified() {
        Some(ChangeKind::Modified)
    } else if status.is_index_deleted() {
        Some(ChangeKind::Deleted)
    } else if status.is_index_renamed() {
        Some(ChangeKind::Renamed)
    } else if status.is_index_typechange() {
        Some(ChangeKind::TypeChanged)
    } else {
        None
    }
}

fn worktree_change(status: Status) -> Option<ChangeKind> {
    if status.is_wt_new() {
        Some(ChangeKind::Untracked)
    } else if status.is_wt_modified() {
        Some(ChangeKind::Modified)
    } else if status.is_wt_deleted() {
        Some(ChangeKind::Deleted)
    } else if status.is_wt_renamed() {
        Some(ChangeKind::Renamed)
    } else if status.is_wt_typechange() {
        Some(ChangeKind::TypeChanged)
    } else {
        None
    }
}

fn changes(repo: &git2::Repository) -> Result<Vec<ChangeEntry>> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);

    let mut entries = Vec::new();
    for entry in repo.statuses(Some(&mut opts))?.iter() {
        let Some(path) = entry.path() else {
            continue;
        };
        let status = entry.status();

        if status.is_conflicted() {
            entries.push(ChangeEntry::unstaged(path, ChangeKind::Conflicted));
            continue;
        }
        if let Some(kind) = index_change(status) {
            entries.push(ChangeEntry::staged(path, kind));
        }
        if let Some(kind) = worktree_change(status) {
            entries.push(ChangeEntry::unstaged(path, kind));
        }
    }
    Ok(entries)
}

const fn state_name(state: RepositoryState) -> &'static str {
    match state {
        RepositoryState::Clean => "clean",
        RepositoryState::Merge => "merge",
        RepositoryState::Revert | RepositoryState::RevertSequence => "revert",
        RepositoryState::CherryPick | RepositoryState::CherryPickSequence => "cherry-pick",
        RepositoryState::Bisect => "bisect",
        RepositoryState::Rebase
        | RepositoryState::RebaseInteractive
        | RepositoryState::RebaseMerge => "rebase",
        RepositoryState::ApplyMailbox | RepositoryState::ApplyMailboxOrRebase => "apply-mailbox",
    }
}

// === Contract ===

impl RepositoryOps for GitRepository {
    fn handle(&self) -> &RepositoryHandle {
        &self.handle
    }

    #[tracing::instrument(skip(self), fields(dir = %self.handle.local_dir().display()))]
    async fn clone_repo(&mut self) -> std::result::Result<bool, CloneError> {
        let handle = self.handle.clone();
        let options = self.options.clone();
        let transfer = Transfer::new(options.timeout_seconds);
        let _abandon = transfer.cancel_on_drop();
        let lock = Arc::clone(&self.transfer_lock);

        tracing::info!(remote = ?handle.remote(), "cloning");
        run_blocking(move || {
            let _serial = lock.lock().unwrap_or_else(PoisonError::into_inner);
            clone_blocking(&handle, &options, &transfer)
        })
        .await
        .map_err(fail)
    }

    #[tracing::instrument(skip(self), fields(dir = %self.handle.local_dir().display()))]
    async fn fetch(&mut self) -> std::result::Result<bool, FetchError> {
        let handle = self.handle.clone();
        let options = self.options.clone();
        let transfer = Transfer::new(options.timeout_seconds);
        let _abandon = transfer.cancel_on_drop();
        let lock = Arc::clone(&self.transfer_lock);

        run_blocking(move || {
            let _serial = lock.lock().unwrap_or_else(PoisonError::into_inner);
            fetch_blocking(&handle, &options, &transfer)
        })
        .await
        .map_err(fail)
    }

    #[tracing::instrument(skip(self), fields(dir = %self.handle.local_dir().display()))]
    fn pull(&mut self) -> std::result::Result<bool, PullError> {
        self.pull_inner().map_err(fail)
    }

    #[tracing::instrument(skip(self), fields(dir = %self.handle.local_dir().display()))]
    fn push(&mut self) -> std::result::Result<bool, PushError> {
        self.push_inner().map_err(fail)
    }

    #[tracing::instrument(skip(self, message))]
    fn commit(&mut self, message: &str) -> std::result::Result<bool, CommitError> {
        self.commit_inner(message).map_err(fail)
    }

    fn add_file(&mut self, file_path: &str) -> std::result::Result<bool, AddFileError> {
        self.add_inner(file_path).map_err(fail)
    }

    fn update_file_content(
        &mut self,
        file_path: &str,
        content: &str,
    ) -> std::result::Result<bool, UpdateFileError> {
        self.update_inner(file_path, content).map_err(fail)
    }

    #[tracing::instrument(skip_all, fields(branch = branch.as_ref()))]
    fn checkout(&mut self, branch: impl AsRef<str>) -> std::result::Result<bool, CheckoutError> {
        self.checkout_inner(branch.as_ref()).map_err(fail)
    }

    fn get_file_content(&self, file_path: &str) -> std::result::Result<String, FileContentError> {
        self.content_inner(file_path).map_err(fail)
    }

    fn get_file_history(
        &self,
        file_path: &str,
    ) -> std::result::Result<Vec<CommitRecord>, FileHistoryError> {
        self.history_inner(file_path).map_err(fail)
    }

    fn get_changed_files(&self) -> std::result::Result<Vec<ChangeEntry>, ChangedFilesError> {
        self.open().and_then(|repo| changes(&repo)).map_err(fail)
    }

    fn get_branches(&self) -> std::result::Result<Vec<BranchDescriptor>, BranchesError> {
        self.branches_inner().map_err(fail)
    }

    fn status(&self) -> std::result::Result<StatusSummary, StatusError> {
        self.status_inner().map_err(fail)
    }
}
