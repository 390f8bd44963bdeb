//! Contract tests run against every backend.
//!
//! Each scenario is written once over [`RepositoryOps`] and instantiated for
//! the git backend (bare remotes in temp directories) and the memory backend.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use git2::{RepositoryInitOptions, Signature};
use tempfile::TempDir;
use tether::memory::MemoryRemote;
use tether::{
    Backend, BackendKind, ChangeEntry, ChangeKind, Operation, OperationError, Options,
    RepositoryHandle, RepositoryOps,
};

static MEMORY_REMOTES: AtomicUsize = AtomicUsize::new(0);

/// A remote plus scratch space for working copies.
///
/// A seeded remote starts with one commit, "seed", adding `README.md` on
/// `main`; an empty remote has no commits at all.
struct Fixture {
    temp: TempDir,
    kind: BackendKind,
    remote: String,
}

impl Fixture {
    fn seeded(kind: BackendKind) -> Self {
        Self::create(kind, true)
    }

    fn empty(kind: BackendKind) -> Self {
        Self::create(kind, false)
    }

    fn create(kind: BackendKind, seed: bool) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let remote = match kind {
            BackendKind::Git => init_bare_remote(&temp.path().join("remote.git"), seed)
                .to_string_lossy()
                .into_owned(),
            BackendKind::Memory => {
                let id = MEMORY_REMOTES.fetch_add(1, Ordering::Relaxed);
                let remote = format!("memory://contract/{id}");
                let shared = MemoryRemote::named(&remote);
                if seed {
                    shared.seed("main", "seed", &[("README.md", "# Remote\n")]);
                }
                remote
            }
        };
        Self { temp, kind, remote }
    }

    fn working_copy(&self, name: &str) -> Backend {
        let handle = RepositoryHandle::new(&self.remote, self.temp.path().join(name))
            .with_options(author_options());
        Backend::with_kind(self.kind, handle).expect("valid options")
    }

    async fn cloned(&self, name: &str) -> Backend {
        let mut repo = self.working_copy(name);
        assert!(repo.clone_repo().await.unwrap());
        repo
    }
}

fn author_options() -> Options {
    Options::new()
        .with("author_name", "Test User")
        .with("author_email", "test@example.com")
}

/// Create a bare repository with `main` as HEAD, optionally holding a
/// single seed commit.
fn init_bare_remote(path: &Path, seed: bool) -> PathBuf {
    let mut opts = RepositoryInitOptions::new();
    opts.bare(true).initial_head("main");
    let repo = git2::Repository::init_opts(path, &opts).unwrap();

    if seed {
        let blob = repo.blob(b"# Remote\n").unwrap();
        let mut builder = repo.treebuilder(None).unwrap();
        builder.insert("README.md", blob, 0o100_644).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();

        let sig = Signature::now("Seed", "seed@example.com").unwrap();
        repo.commit(Some("refs/heads/main"), &sig, &sig, "seed", &tree, &[])
            .unwrap();
    }
    path.to_path_buf()
}

fn create_branch(repo: &mut Backend, name: &str) {
    match repo {
        Backend::Git(git) => {
            git.create_branch(name).unwrap();
        }
        Backend::Memory(memory) => memory.create_branch(name).unwrap(),
    }
}

fn commit_file<R: RepositoryOps>(repo: &mut R, path: &str, content: &str, message: &str) {
    assert!(repo.update_file_content(path, content).unwrap());
    assert!(repo.add_file(path).unwrap());
    assert!(repo.commit(message).unwrap());
}

// === Scenarios ===

async fn clone_commit_push(fixture: Fixture) {
    let mut repo = fixture.cloned("alice").await;
    assert_eq!(repo.get_file_content("README.md").unwrap(), "# Remote\n");

    commit_file(&mut repo, "a.txt", "hello", "init");
    assert!(repo.push().unwrap());
    assert!(!repo.push().unwrap(), "second push has nothing to send");

    let bob = fixture.cloned("bob").await;
    assert_eq!(bob.get_file_content("a.txt").unwrap(), "hello");
    let history = bob.get_file_history("a.txt").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].summary, "init");
    assert_eq!(history[0].author, "Test User");
}

async fn non_fast_forward_push_rejected(fixture: Fixture) {
    let mut alice = fixture.cloned("alice").await;
    let mut bob = fixture.cloned("bob").await;

    commit_file(&mut alice, "a.txt", "from alice", "alice");
    assert!(alice.push().unwrap());

    commit_file(&mut bob, "b.txt", "from bob", "bob");
    let err = bob.push().unwrap_err();
    assert!(err.message().is_some());
    assert!(err.to_string().starts_with("push failed"));

    let err = OperationError::from(err);
    assert_eq!(err.operation(), Operation::Push);

    // The rejected push leaves bob's work in place.
    assert_eq!(bob.get_file_content("b.txt").unwrap(), "from bob");
    assert_eq!(bob.status().unwrap().ahead, 1);
}

async fn fetch_then_pull_fast_forwards(fixture: Fixture) {
    let mut alice = fixture.cloned("alice").await;
    let mut bob = fixture.cloned("bob").await;

    commit_file(&mut alice, "a.txt", "hello", "alice");
    assert!(alice.push().unwrap());

    assert!(bob.fetch().await.unwrap());
    let status = bob.status().unwrap();
    assert_eq!((status.ahead, status.behind), (0, 1));
    assert!(bob.get_file_content("a.txt").is_err(), "fetch leaves the tree alone");

    assert!(bob.pull().unwrap());
    assert_eq!(bob.get_file_content("a.txt").unwrap(), "hello");
    let status = bob.status().unwrap();
    assert_eq!((status.ahead, status.behind), (0, 0));
    assert!(status.is_clean());

    assert!(bob.pull().unwrap(), "pull when up to date still succeeds");
}

async fn read_your_write_and_staging(fixture: Fixture) {
    let mut repo = fixture.cloned("alice").await;

    assert!(repo.update_file_content("notes/todo.txt", "buy milk").unwrap());
    assert_eq!(repo.get_file_content("notes/todo.txt").unwrap(), "buy milk");
    assert_eq!(
        repo.get_changed_files().unwrap(),
        vec![ChangeEntry::unstaged("notes/todo.txt", ChangeKind::Untracked)]
    );

    assert!(repo.add_file("notes/todo.txt").unwrap());
    assert_eq!(
        repo.get_changed_files().unwrap(),
        vec![ChangeEntry::staged("notes/todo.txt", ChangeKind::Added)]
    );

    assert!(repo.commit("todo").unwrap());
    assert!(repo.get_changed_files().unwrap().is_empty());
    assert!(!repo.commit("again").unwrap(), "nothing staged");
}

async fn history_is_idempotent(fixture: Fixture) {
    let mut repo = fixture.cloned("alice").await;
    commit_file(&mut repo, "a.txt", "one", "first");
    commit_file(&mut repo, "b.txt", "other", "unrelated");
    commit_file(&mut repo, "a.txt", "two", "second");

    let history = repo.get_file_history("a.txt").unwrap();
    let summaries: Vec<_> = history.iter().map(|c| c.summary.as_str()).collect();
    assert_eq!(summaries, ["second", "first"]);
    assert_eq!(repo.get_file_history("a.txt").unwrap(), history);

    let readme = repo.get_file_history("README.md").unwrap();
    assert_eq!(readme.len(), 1);
    assert_eq!(readme[0].summary, "seed");
}

async fn branches_and_checkout(fixture: Fixture) {
    let mut repo = fixture.cloned("alice").await;

    let branches = repo.get_branches().unwrap();
    let main = branches
        .iter()
        .find(|b| b.name == "main")
        .cloned()
        .expect("local main");
    assert!(main.is_head);
    assert!(main.is_local());
    assert_eq!(main.upstream.as_deref(), Some("origin/main"));
    let tracking = branches
        .iter()
        .find(|b| b.name == "origin/main")
        .cloned()
        .expect("remote-tracking main");
    assert!(!tracking.is_local());

    let err = repo.checkout("does-not-exist").unwrap_err();
    assert_eq!(err.errors().unwrap()["kind"], "branch_not_found");
    assert!(repo.checkout(&tracking).is_err(), "only local branches");
    assert_eq!(repo.status().unwrap().branch.as_deref(), Some("main"));

    assert!(repo.checkout(&main).unwrap());
}

async fn checkout_keeps_local_edits(fixture: Fixture) {
    let mut repo = fixture.cloned("alice").await;
    create_branch(&mut repo, "feature");
    assert!(repo.checkout("feature").unwrap());
    commit_file(&mut repo, "README.md", "feature\n", "feature");

    assert!(repo.checkout("main").unwrap());
    assert_eq!(repo.get_file_content("README.md").unwrap(), "# Remote\n");

    repo.update_file_content("README.md", "local\n").unwrap();
    let err = repo.checkout("feature").unwrap_err();
    assert_eq!(err.errors().unwrap()["kind"], "dirty");
    assert_eq!(repo.status().unwrap().branch.as_deref(), Some("main"));
    assert_eq!(repo.get_file_content("README.md").unwrap(), "local\n");
}

async fn pull_keeps_local_edits(fixture: Fixture) {
    let mut alice = fixture.cloned("alice").await;
    let mut bob = fixture.cloned("bob").await;

    commit_file(&mut alice, "README.md", "from alice\n", "alice");
    assert!(alice.push().unwrap());

    bob.update_file_content("README.md", "bob's draft\n").unwrap();
    let err = bob.pull().unwrap_err();
    assert_eq!(err.errors().unwrap()["kind"], "dirty");
    assert_eq!(bob.get_file_content("README.md").unwrap(), "bob's draft\n");
    assert_eq!(bob.status().unwrap().ahead, 0);
}

async fn first_push_to_empty_remote(fixture: Fixture) {
    let mut repo = fixture.cloned("alice").await;
    assert!(repo.get_file_history("a.txt").unwrap().is_empty());
    assert!(!repo.push().unwrap(), "nothing to push from an unborn branch");

    commit_file(&mut repo, "a.txt", "hello", "init");
    assert!(repo.push().unwrap());
    assert!(!repo.push().unwrap());

    let branches = repo.get_branches().unwrap();
    let head = branches.iter().find(|b| b.is_head).expect("checked-out branch");
    let pushed = branches
        .iter()
        .find(|b| !b.is_local() && b.name == format!("origin/{}", head.name))
        .expect("remote-tracking branch created by push");
    assert_eq!(pushed.target, head.target);
    assert_eq!(head.upstream.as_deref(), Some(pushed.name.as_str()));
}

async fn clone_twice_resumes(fixture: Fixture) {
    let mut repo = fixture.cloned("alice").await;
    repo.update_file_content("draft.txt", "keep me").unwrap();

    assert!(repo.clone_repo().await.unwrap());
    assert_eq!(repo.get_file_content("draft.txt").unwrap(), "keep me");
}

async fn operations_before_clone_fail(fixture: Fixture) {
    let mut repo = fixture.working_copy("alice");

    assert!(repo.get_file_content("README.md").is_err());
    assert!(repo.commit("early").is_err());
    assert!(repo.pull().is_err());
    assert!(repo.push().is_err());
    assert!(repo.status().is_err());
}

macro_rules! for_each_backend {
    ($($scenario:ident => $setup:ident),* $(,)?) => {
        mod git {
            use super::*;
            $(
                #[tokio::test]
                async fn $scenario() {
                    super::$scenario(Fixture::$setup(BackendKind::Git)).await;
                }
            )*
        }

        mod memory {
            use super::*;
            $(
                #[tokio::test]
                async fn $scenario() {
                    super::$scenario(Fixture::$setup(BackendKind::Memory)).await;
                }
            )*
        }
    };
}

for_each_backend!(
    clone_commit_push => seeded,
    non_fast_forward_push_rejected => seeded,
    fetch_then_pull_fast_forwards => seeded,
    read_your_write_and_staging => seeded,
    history_is_idempotent => seeded,
    branches_and_checkout => seeded,
    checkout_keeps_local_edits => seeded,
    pull_keeps_local_edits => seeded,
    clone_twice_resumes => seeded,
    operations_before_clone_fail => seeded,
    first_push_to_empty_remote => empty,
);

// === Git backend ===

#[tokio::test]
async fn git_pull_merges_diverged_history() {
    let fixture = Fixture::seeded(BackendKind::Git);
    let mut alice = fixture.cloned("alice").await;
    let mut bob = fixture.cloned("bob").await;

    commit_file(&mut alice, "a.txt", "from alice", "alice");
    assert!(alice.push().unwrap());
    commit_file(&mut bob, "b.txt", "from bob", "bob");

    assert!(bob.pull().unwrap());
    assert_eq!(bob.get_file_content("a.txt").unwrap(), "from alice");
    assert_eq!(bob.get_file_content("b.txt").unwrap(), "from bob");
    assert!(bob.push().unwrap());

    // The merge commit brings a.txt in unchanged from alice's side.
    let history = |path: &str| -> Vec<String> {
        bob.get_file_history(path)
            .unwrap()
            .into_iter()
            .map(|c| c.summary)
            .collect()
    };
    assert_eq!(history("a.txt"), ["alice"]);
    assert_eq!(history("b.txt"), ["bob"]);
    assert_eq!(history("README.md"), ["seed"]);
}

#[tokio::test]
async fn git_pull_merge_refuses_dirty_tree() {
    let fixture = Fixture::seeded(BackendKind::Git);
    let mut alice = fixture.cloned("alice").await;
    let mut bob = fixture.cloned("bob").await;

    commit_file(&mut alice, "a.txt", "from alice", "alice");
    assert!(alice.push().unwrap());
    commit_file(&mut bob, "b.txt", "from bob", "bob");
    bob.update_file_content("README.md", "unsaved\n").unwrap();

    let err = bob.pull().unwrap_err();
    assert_eq!(err.errors().unwrap()["kind"], "dirty");
    assert_eq!(bob.get_file_content("README.md").unwrap(), "unsaved\n");
    assert!(bob.get_file_content("a.txt").is_err());
}

#[tokio::test]
async fn git_pull_conflict_restores_head() {
    let fixture = Fixture::seeded(BackendKind::Git);
    let mut alice = fixture.cloned("alice").await;
    let mut bob = fixture.cloned("bob").await;

    commit_file(&mut alice, "README.md", "alice\n", "alice");
    assert!(alice.push().unwrap());
    commit_file(&mut bob, "README.md", "bob\n", "bob");

    let err = bob.pull().unwrap_err();
    let details = err.errors().unwrap();
    assert_eq!(details["kind"], "merge_conflict");
    assert_eq!(details["conflicts"][0], "README.md");

    assert_eq!(bob.get_file_content("README.md").unwrap(), "bob\n");
    let status = bob.status().unwrap();
    assert_eq!(status.state, "clean");
    assert!(status.is_clean());
}

#[tokio::test]
async fn git_clone_retries_after_unreachable_remote() {
    let temp = TempDir::new().unwrap();
    let remote = temp.path().join("later.git");
    let handle = RepositoryHandle::new(remote.to_string_lossy(), temp.path().join("work"))
        .with_options(author_options());
    let mut repo = Backend::with_kind(BackendKind::Git, handle).unwrap();

    let err = repo.clone_repo().await.unwrap_err();
    assert!(err.message().is_some());

    init_bare_remote(&remote, true);
    assert!(repo.clone_repo().await.unwrap());
    assert_eq!(repo.get_file_content("README.md").unwrap(), "# Remote\n");
}

#[tokio::test]
async fn git_clone_finishes_interrupted_clone() {
    let fixture = Fixture::seeded(BackendKind::Git);
    git2::Repository::init(fixture.temp.path().join("alice"))
        .unwrap()
        .remote("origin", &fixture.remote)
        .unwrap();

    let mut repo = fixture.working_copy("alice");
    assert!(repo.clone_repo().await.unwrap());
    assert_eq!(repo.get_file_content("README.md").unwrap(), "# Remote\n");

    let status = repo.status().unwrap();
    assert_eq!(status.branch.as_deref(), Some("main"));
    assert_eq!(status.upstream.as_deref(), Some("origin/main"));
}

#[tokio::test]
async fn git_clone_never_deletes_unrelated_work() {
    let fixture = Fixture::seeded(BackendKind::Git);
    let dir = fixture.temp.path().join("alice");
    git2::Repository::init(&dir).unwrap();
    std::fs::write(dir.join("precious.txt"), "mine").unwrap();

    let mut repo = fixture.working_copy("alice");
    let err = repo.clone_repo().await.unwrap_err();
    assert_eq!(err.errors().unwrap()["kind"], "foreign_repository");
    assert_eq!(std::fs::read_to_string(dir.join("precious.txt")).unwrap(), "mine");
}

#[tokio::test]
async fn git_clone_deadline_reports_timeout() {
    let fixture = Fixture::seeded(BackendKind::Git);
    // file:// forces the transport path, which reports progress.
    let url = format!("file://{}", fixture.remote);
    let dir = fixture.temp.path().join("alice");

    let handle = RepositoryHandle::new(&url, &dir)
        .with_options(author_options().with("timeout_seconds", 0));
    let mut repo = Backend::with_kind(BackendKind::Git, handle).unwrap();
    let err = repo.clone_repo().await.unwrap_err();
    assert_eq!(err.errors().unwrap()["kind"], "timed_out");
    assert_eq!(err.errors().unwrap()["timeout_seconds"], 0);

    let handle = RepositoryHandle::new(&url, &dir).with_options(author_options());
    let mut retry = Backend::with_kind(BackendKind::Git, handle).unwrap();
    assert!(retry.clone_repo().await.unwrap());
    assert_eq!(retry.get_file_content("README.md").unwrap(), "# Remote\n");
}

#[tokio::test]
async fn git_abandoned_clone_can_be_retried() {
    let fixture = Fixture::seeded(BackendKind::Git);
    let mut repo = fixture.working_copy("alice");

    // Either outcome is fine; only the directory state afterwards matters.
    let _ = tokio::time::timeout(Duration::ZERO, repo.clone_repo()).await;

    assert!(repo.clone_repo().await.unwrap());
    assert_eq!(repo.get_file_content("README.md").unwrap(), "# Remote\n");
}

#[tokio::test]
async fn git_independent_handles_run_concurrently() {
    let fixture = Fixture::seeded(BackendKind::Git);
    let mut alice = fixture.working_copy("alice");
    let mut bob = fixture.working_copy("bob");

    let (a, b) = tokio::join!(alice.clone_repo(), bob.clone_repo());
    assert!(a.unwrap());
    assert!(b.unwrap());

    let (a, b) = tokio::join!(alice.fetch(), bob.fetch());
    assert!(a.unwrap() && b.unwrap());
}

// === Memory backend ===

#[tokio::test]
async fn memory_clone_retries_after_unreachable_remote() {
    let fixture = Fixture::seeded(BackendKind::Memory);
    let remote = MemoryRemote::named(&fixture.remote);
    remote.set_reachable(false);

    let mut repo = fixture.working_copy("alice");
    let err = repo.clone_repo().await.unwrap_err();
    assert_eq!(err.errors().unwrap()["kind"], "network");

    remote.set_reachable(true);
    assert!(repo.clone_repo().await.unwrap());
}

#[tokio::test]
async fn memory_push_rejection_carries_reason() {
    let fixture = Fixture::seeded(BackendKind::Memory);
    let remote = MemoryRemote::named(&fixture.remote);
    let mut repo = fixture.cloned("alice").await;
    commit_file(&mut repo, "a.txt", "hello", "init");

    remote.reject_pushes(Some("protected branch"));
    let err = repo.push().unwrap_err();
    assert_eq!(err.errors().unwrap()["reason"], "protected branch");

    remote.reject_pushes(None);
    assert!(repo.push().unwrap());
    assert_eq!(remote.log("main")[0].summary, "init");
}

#[tokio::test]
async fn backend_chosen_from_handle_options() {
    let fixture = Fixture::seeded(BackendKind::Memory);
    let handle = RepositoryHandle::new(&fixture.remote, fixture.temp.path().join("alice"))
        .with_options(author_options().with("backend", "memory"));

    let mut repo = Backend::open(handle).unwrap();
    assert_eq!(repo.kind(), BackendKind::Memory);
    assert!(repo.clone_repo().await.unwrap());
    assert_eq!(repo.get_file_content("README.md").unwrap(), "# Remote\n");
}
