//! In-memory backend.
//!
//! `MemoryRemote` simulates a hosted remote and `MemoryRepository` a working
//! copy bound to it. No disk or network is touched, which makes the pair
//! useful for testing code written against [`RepositoryOps`].
//!
//! Histories are linear. `pull` integrates by fast-forward only and reports
//! diverged histories as a `PullError`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::{
    AddFileError, BranchesError, ChangedFilesError, CheckoutError, CloneError, CommitError,
    Failure, FetchError, FileContentError, FileHistoryError, PullError, PushError, StatusError,
    UpdateFileError,
};
use crate::handle::RepositoryHandle;
use crate::traits::RepositoryOps;
use crate::types::{
    BranchDescriptor, BranchKind, ChangeEntry, ChangeKind, CommitRecord, StatusSummary,
    normalize_path,
};

type Files = BTreeMap<String, String>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

static REMOTES: LazyLock<Mutex<HashMap<String, MemoryRemote>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct MemoryCommit {
    id: String,
    message: String,
    author: String,
    email: String,
    time: DateTime<Utc>,
    files: Files,
}

impl MemoryCommit {
    fn new(message: &str, author: &Author, files: Files) -> Self {
        let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("{:016x}", n.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            message: message.to_string(),
            author: author.name.clone(),
            email: author.email.clone(),
            time: Utc::now(),
            files,
        }
    }

    fn record(&self) -> CommitRecord {
        CommitRecord {
            id: self.id.clone(),
            summary: self.message.lines().next().unwrap_or_default().to_string(),
            message: self.message.clone(),
            author: self.author.clone(),
            email: self.email.clone(),
            time: self.time,
        }
    }
}

/// Files of the tip commit, or nothing for an unborn branch.
fn tip_files(history: &[MemoryCommit]) -> Files {
    history.last().map(|c| c.files.clone()).unwrap_or_default()
}

/// Length of the shared prefix of two histories.
fn common_len(a: &[MemoryCommit], b: &[MemoryCommit]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x.id == y.id).count()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct Author {
    #[serde(rename = "author_name")]
    name: String,
    #[serde(rename = "author_email")]
    email: String,
}

impl Default for Author {
    fn default() -> Self {
        Self {
            name: "tether".into(),
            email: "tether@localhost".into(),
        }
    }
}

#[derive(Debug)]
struct RemoteState {
    default_branch: String,
    branches: BTreeMap<String, Vec<MemoryCommit>>,
    reachable: bool,
    push_rejection: Option<String>,
}

/// Simulated remote shared between working copies.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// Create an empty, reachable remote whose default branch is `main`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RemoteState {
                default_branch: "main".into(),
                branches: BTreeMap::new(),
                reachable: true,
                push_rejection: None,
            })),
        }
    }

    /// Look up the process-wide remote registered under `location`,
    /// creating an empty one on first use.
    #[must_use]
    pub fn named(location: &str) -> Self {
        lock(&REMOTES)
            .entry(location.to_string())
            .or_default()
            .clone()
    }

    /// Record a commit on `branch` that writes `files` over the tip's files.
    ///
    /// Returns the new commit id.
    pub fn seed(&self, branch: &str, message: &str, files: &[(&str, &str)]) -> String {
        let mut state = lock(&self.state);
        let history = state.branches.entry(branch.to_string()).or_default();

        let mut snapshot = tip_files(history);
        for (path, content) in files {
            snapshot.insert((*path).to_string(), (*content).to_string());
        }

        let commit = MemoryCommit::new(message, &Author::default(), snapshot);
        let id = commit.id.clone();
        history.push(commit);
        id
    }

    /// Toggle whether network operations can reach this remote.
    pub fn set_reachable(&self, reachable: bool) {
        lock(&self.state).reachable = reachable;
    }

    /// Reject every push with `reason`, or accept pushes again with `None`.
    pub fn reject_pushes(&self, reason: Option<&str>) {
        lock(&self.state).push_rejection = reason.map(String::from);
    }

    /// Tip commit id of a branch.
    #[must_use]
    pub fn head(&self, branch: &str) -> Option<String> {
        lock(&self.state)
            .branches
            .get(branch)
            .and_then(|h| h.last())
            .map(|c| c.id.clone())
    }

    /// History of a branch, most recent first.
    #[must_use]
    pub fn log(&self, branch: &str) -> Vec<CommitRecord> {
        lock(&self.state)
            .branches
            .get(branch)
            .map(|h| h.iter().rev().map(MemoryCommit::record).collect())
            .unwrap_or_default()
    }

    fn snapshot(&self) -> Result<(String, BTreeMap<String, Vec<MemoryCommit>>), Failure> {
        let state = lock(&self.state);
        if !state.reachable {
            return Err(Failure::new("remote unreachable")
                .with_errors(json!({ "kind": "network", "reason": "unreachable" })));
        }
        Ok((state.default_branch.clone(), state.branches.clone()))
    }
}

#[derive(Debug)]
struct LocalState {
    head: String,
    branches: BTreeMap<String, Vec<MemoryCommit>>,
    tracking: BTreeMap<String, Vec<MemoryCommit>>,
    index: Files,
    worktree: Files,
}

impl LocalState {
    fn history(&self) -> &[MemoryCommit] {
        self.branches
            .get(&self.head)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn changes(&self) -> Vec<ChangeEntry> {
        let tip = tip_files(self.history());
        let mut entries = Vec::new();

        let staged_paths: BTreeSet<&String> = tip.keys().chain(self.index.keys()).collect();
        for path in staged_paths {
            let kind = match (tip.get(path), self.index.get(path)) {
                (None, Some(_)) => ChangeKind::Added,
                (Some(_), None) => ChangeKind::Deleted,
                (Some(a), Some(b)) if a != b => ChangeKind::Modified,
                _ => continue,
            };
            entries.push(ChangeEntry::staged(path.clone(), kind));
        }

        let unstaged_paths: BTreeSet<&String> =
            self.index.keys().chain(self.worktree.keys()).collect();
        for path in unstaged_paths {
            let kind = match (self.index.get(path), self.worktree.get(path)) {
                (None, Some(_)) => ChangeKind::Untracked,
                (Some(_), None) => ChangeKind::Deleted,
                (Some(a), Some(b)) if a != b => ChangeKind::Modified,
                _ => continue,
            };
            entries.push(ChangeEntry::unstaged(path.clone(), kind));
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Move the working tree from `from` to `to`, refusing to clobber
    /// uncommitted edits on the paths that differ.
    fn switch_files(&mut self, from: &Files, to: &Files) -> Result<(), Failure> {
        let differing: BTreeSet<&String> = from
            .keys()
            .chain(to.keys())
            .filter(|p| from.get(*p) != to.get(*p))
            .collect();

        let blocked: Vec<&String> = differing
            .iter()
            .copied()
            .filter(|p| {
                self.index.get(*p) != from.get(*p) || self.worktree.get(*p) != from.get(*p)
            })
            .collect();
        if !blocked.is_empty() {
            return Err(Failure::new("local changes would be overwritten")
                .with_errors(json!({ "kind": "dirty", "paths": blocked })));
        }

        for path in differing {
            match to.get(path) {
                Some(content) => {
                    self.index.insert(path.clone(), content.clone());
                    self.worktree.insert(path.clone(), content.clone());
                }
                None => {
                    self.index.remove(path);
                    self.worktree.remove(path);
                }
            }
        }
        Ok(())
    }
}

/// Working copy bound to a [`MemoryRemote`] looked up by the handle's remote.
///
/// Recognized options: `branch` (clone branch), `remote_name` (default
/// `origin`), `author_name`, `author_email`.
#[derive(Debug)]
pub struct MemoryRepository {
    handle: RepositoryHandle,
    local: Option<LocalState>,
}

impl MemoryRepository {
    /// Bind to a handle. Nothing is resolved until an operation runs.
    #[must_use]
    pub const fn new(handle: RepositoryHandle) -> Self {
        Self {
            handle,
            local: None,
        }
    }

    /// Create a local branch at the current HEAD.
    ///
    /// # Errors
    /// Returns error if nothing is cloned, HEAD is unborn, or the branch exists.
    pub fn create_branch(&mut self, name: &str) -> Result<(), Failure> {
        let local = self.local.as_mut().ok_or_else(not_cloned)?;
        if local.branches.contains_key(name) {
            return Err(Failure::new(format!("branch already exists: {name}")));
        }
        let history = local.history().to_vec();
        if history.is_empty() {
            return Err(Failure::new("cannot branch from an unborn HEAD"));
        }
        local.branches.insert(name.to_string(), history);
        Ok(())
    }

    fn remote(&self) -> Result<MemoryRemote, Failure> {
        self.handle
            .remote()
            .map(MemoryRemote::named)
            .ok_or_else(|| Failure::new("no remote bound to handle"))
    }

    fn remote_name(&self) -> String {
        self.handle
            .options()
            .get::<String>("remote_name")
            .ok()
            .flatten()
            .unwrap_or_else(|| "origin".into())
    }

    fn author(&self) -> Author {
        self.handle.options().parse().unwrap_or_default()
    }

    fn local(&self) -> Result<&LocalState, Failure> {
        self.local.as_ref().ok_or_else(not_cloned)
    }

    fn local_mut(&mut self) -> Result<&mut LocalState, Failure> {
        self.local.as_mut().ok_or_else(not_cloned)
    }

    fn do_clone(&mut self) -> Result<bool, Failure> {
        let remote = self.remote()?;
        if self.local.is_some() {
            tracing::debug!("working copy exists, resuming with fetch");
            return self.do_fetch();
        }

        let (default_branch, branches) = remote.snapshot()?;
        let head = match self.handle.options().get::<String>("branch") {
            Ok(Some(branch)) => branch,
            _ => default_branch,
        };
        if !branches.is_empty() && !branches.contains_key(&head) {
            return Err(Failure::new(format!("remote branch not found: {head}")));
        }

        let mut local_branches = BTreeMap::new();
        let files = branches.get(&head).map(|h| tip_files(h)).unwrap_or_default();
        if let Some(history) = branches.get(&head) {
            local_branches.insert(head.clone(), history.clone());
        }

        tracing::info!(branch = %head, "cloned memory remote");
        self.local = Some(LocalState {
            head,
            branches: local_branches,
            tracking: branches,
            index: files.clone(),
            worktree: files,
        });
        Ok(true)
    }

    fn do_fetch(&mut self) -> Result<bool, Failure> {
        let remote = self.remote()?;
        let (_, branches) = remote.snapshot()?;
        self.local_mut()?.tracking = branches;
        Ok(true)
    }

    fn do_pull(&mut self) -> Result<bool, Failure> {
        self.do_fetch()?;
        let local = self.local_mut()?;

        let Some(upstream) = local.tracking.get(&local.head).cloned() else {
            return Ok(false);
        };
        let history = local.history().to_vec();
        let common = common_len(&history, &upstream);

        if common == upstream.len() {
            return Ok(true);
        }
        if common < history.len() {
            return Err(Failure::new("local and upstream histories have diverged")
                .with_errors(json!({
                    "kind": "diverged",
                    "ahead": history.len() - common,
                    "behind": upstream.len() - common,
                })));
        }

        local.switch_files(&tip_files(&history), &tip_files(&upstream))?;
        tracing::debug!(branch = %local.head, commits = upstream.len() - common, "fast-forward");
        local.branches.insert(local.head.clone(), upstream);
        Ok(true)
    }

    fn do_commit(&mut self, message: &str) -> Result<bool, Failure> {
        if message.trim().is_empty() {
            return Err(Failure::new("commit message must not be empty"));
        }
        let author = self.author();
        let local = self.local_mut()?;

        if local.index == tip_files(local.history()) {
            return Ok(false);
        }

        let commit = MemoryCommit::new(message, &author, local.index.clone());
        let head = local.head.clone();
        local.branches.entry(head).or_default().push(commit);
        Ok(true)
    }

    fn do_push(&mut self) -> Result<bool, Failure> {
        let remote = self.remote()?;
        let local = self.local.as_mut().ok_or_else(not_cloned)?;
        let history = local.history().to_vec();
        if history.is_empty() {
            return Ok(false);
        }

        let mut state = lock(&remote.state);
        if !state.reachable {
            return Err(Failure::new("remote unreachable")
                .with_errors(json!({ "kind": "network", "reason": "unreachable" })));
        }
        if let Some(reason) = &state.push_rejection {
            return Err(Failure::new(format!("push rejected: {reason}"))
                .with_errors(json!({ "kind": "rejected", "reason": reason })));
        }

        let refname = format!("refs/heads/{}", local.head);
        let upstream = state.branches.get(&local.head).cloned().unwrap_or_default();
        let common = common_len(&history, &upstream);
        if common == history.len() && common == upstream.len() {
            return Ok(false);
        }
        if common < upstream.len() {
            return Err(Failure::new(format!("push rejected for {refname}"))
                .with_errors(json!({
                    "kind": "rejected",
                    "ref": refname,
                    "status": "non-fast-forward",
                })));
        }

        state.branches.insert(local.head.clone(), history.clone());
        local.tracking.insert(local.head.clone(), history);
        tracing::info!(%refname, "pushed to memory remote");
        Ok(true)
    }

    fn do_checkout(&mut self, branch: &str) -> Result<bool, Failure> {
        let local = self.local_mut()?;
        let Some(target) = local.branches.get(branch).cloned() else {
            return Err(Failure::new(format!("branch not found: {branch}"))
                .with_errors(json!({ "kind": "branch_not_found", "branch": branch })));
        };
        if local.head == branch {
            return Ok(true);
        }

        let current = tip_files(local.history());
        local.switch_files(&current, &tip_files(&target))?;
        local.head = branch.to_string();
        Ok(true)
    }
}

fn not_cloned() -> Failure {
    Failure::new("repository has not been cloned")
}

fn invalid_path(file_path: &str) -> Failure {
    Failure::new(format!("invalid repository path: {file_path}"))
        .with_errors(json!({ "kind": "invalid_path", "path": file_path }))
}

fn checked_path(file_path: &str) -> Result<String, Failure> {
    normalize_path(file_path).ok_or_else(|| invalid_path(file_path))
}

impl RepositoryOps for MemoryRepository {
    fn handle(&self) -> &RepositoryHandle {
        &self.handle
    }

    async fn clone_repo(&mut self) -> Result<bool, CloneError> {
        Ok(self.do_clone()?)
    }

    async fn fetch(&mut self) -> Result<bool, FetchError> {
        Ok(self.do_fetch()?)
    }

    fn pull(&mut self) -> Result<bool, PullError> {
        Ok(self.do_pull()?)
    }

    fn push(&mut self) -> Result<bool, PushError> {
        Ok(self.do_push()?)
    }

    fn commit(&mut self, message: &str) -> Result<bool, CommitError> {
        Ok(self.do_commit(message)?)
    }

    fn add_file(&mut self, file_path: &str) -> Result<bool, AddFileError> {
        let path = checked_path(file_path)?;
        let local = self.local_mut()?;

        match local.worktree.get(&path) {
            Some(content) => {
                local.index.insert(path, content.clone());
            }
            None if local.index.remove(&path).is_some() => {}
            None => {
                return Err(
                    Failure::new(format!("pathspec '{path}' did not match any files")).into(),
                );
            }
        }
        Ok(true)
    }

    fn update_file_content(
        &mut self,
        file_path: &str,
        content: &str,
    ) -> Result<bool, UpdateFileError> {
        let path = checked_path(file_path)?;
        self.local_mut()?.worktree.insert(path, content.to_string());
        Ok(true)
    }

    fn checkout(&mut self, branch: impl AsRef<str>) -> Result<bool, CheckoutError> {
        Ok(self.do_checkout(branch.as_ref())?)
    }

    fn get_file_content(&self, file_path: &str) -> Result<String, FileContentError> {
        let path = checked_path(file_path)?;
        self.local()?
            .worktree
            .get(&path)
            .cloned()
            .ok_or_else(|| Failure::new(format!("no such file: {path}")).into())
    }

    fn get_file_history(&self, file_path: &str) -> Result<Vec<CommitRecord>, FileHistoryError> {
        let path = checked_path(file_path)?;
        let history = self.local()?.history();

        let mut records = Vec::new();
        let mut previous = None;
        for commit in history {
            let current = commit.files.get(&path);
            if current != previous {
                records.push(commit.record());
            }
            previous = current;
        }
        records.reverse();
        Ok(records)
    }

    fn get_changed_files(&self) -> Result<Vec<ChangeEntry>, ChangedFilesError> {
        Ok(self.local()?.changes())
    }

    fn get_branches(&self) -> Result<Vec<BranchDescriptor>, BranchesError> {
        let local = self.local()?;
        let remote_name = self.remote_name();

        let locals = local.branches.iter().map(|(name, history)| BranchDescriptor {
            name: name.clone(),
            kind: BranchKind::Local,
            is_head: *name == local.head,
            upstream: local
                .tracking
                .contains_key(name)
                .then(|| format!("{remote_name}/{name}")),
            target: history.last().map(|c| c.id.clone()),
        });
        let remotes = local.tracking.iter().map(|(name, history)| BranchDescriptor {
            name: format!("{remote_name}/{name}"),
            kind: BranchKind::Remote,
            is_head: false,
            upstream: None,
            target: history.last().map(|c| c.id.clone()),
        });

        Ok(locals.chain(remotes).collect())
    }

    fn status(&self) -> Result<StatusSummary, StatusError> {
        let local = self.local()?;
        let history = local.history();
        let upstream = local.tracking.get(&local.head);

        let (ahead, behind) = upstream.map_or((0, 0), |u| {
            let common = common_len(history, u);
            (history.len() - common, u.len() - common)
        });

        Ok(StatusSummary {
            branch: Some(local.head.clone()),
            head: history.last().map(|c| c.id.chars().take(7).collect()),
            upstream: upstream.map(|_| format!("{}/{}", self.remote_name(), local.head)),
            ahead,
            behind,
            state: "clean".into(),
            changes: local.changes(),
        })
    }
}
