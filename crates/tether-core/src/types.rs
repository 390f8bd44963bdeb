//! Values returned by repository operations.

use std::fmt;
use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One commit that touched a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Backend-defined commit identifier.
    pub id: String,
    /// First line of the message.
    pub summary: String,
    /// Full message.
    pub message: String,
    /// Author name.
    pub author: String,
    /// Author email.
    pub email: String,
    /// Commit time.
    pub time: DateTime<Utc>,
}

/// Where a branch lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    Local,
    Remote,
}

/// A branch as reported by `get_branches`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchDescriptor {
    /// Short name (`main`, `origin/main`).
    pub name: String,
    pub kind: BranchKind,
    /// Whether HEAD points at this branch.
    pub is_head: bool,
    /// Upstream branch for local branches that track one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    /// Tip commit id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl BranchDescriptor {
    /// Check if this is a local branch.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.kind == BranchKind::Local
    }
}

impl AsRef<str> for BranchDescriptor {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for BranchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Kind of difference recorded for a changed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    TypeChanged,
    Untracked,
    Conflicted,
}

impl ChangeKind {
    /// Single-letter code, porcelain style.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
            Self::Renamed => 'R',
            Self::TypeChanged => 'T',
            Self::Untracked => '?',
            Self::Conflicted => 'U',
        }
    }
}

/// Which side of the commit boundary a change sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeArea {
    /// Recorded in the index, part of the next commit.
    Staged,
    /// Only in the working tree.
    WorkingTree,
}

/// One file that differs between the working state and the last commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub path: String,
    pub kind: ChangeKind,
    pub area: ChangeArea,
}

impl ChangeEntry {
    #[must_use]
    pub fn staged(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            area: ChangeArea::Staged,
        }
    }

    #[must_use]
    pub fn unstaged(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            area: ChangeArea::WorkingTree,
        }
    }

    /// Check if the change is staged for the next commit.
    #[must_use]
    pub fn is_staged(&self) -> bool {
        self.area == ChangeArea::Staged
    }
}

/// Repository status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    /// Current branch, `None` when HEAD is detached.
    pub branch: Option<String>,
    /// Short id of the HEAD commit, `None` before the first commit.
    pub head: Option<String>,
    /// Upstream of the current branch.
    pub upstream: Option<String>,
    /// Commits on the branch not on its upstream.
    pub ahead: usize,
    /// Commits on the upstream not on the branch.
    pub behind: usize,
    /// In-progress operation (`clean`, `merge`, `rebase`, ...).
    pub state: String,
    pub changes: Vec<ChangeEntry>,
}

impl StatusSummary {
    /// Check if there are no changes at all.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.changes.is_empty()
    }
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "## {}", self.branch.as_deref().unwrap_or("HEAD (detached)"))?;
        if let Some(upstream) = &self.upstream {
            write!(f, "...{upstream}")?;
            match (self.ahead, self.behind) {
                (0, 0) => {}
                (a, 0) => write!(f, " [ahead {a}]")?,
                (0, b) => write!(f, " [behind {b}]")?,
                (a, b) => write!(f, " [ahead {a}, behind {b}]")?,
            }
        }
        if self.state != "clean" {
            write!(f, " ({})", self.state)?;
        }

        for change in &self.changes {
            let (index, worktree) = match (change.area, change.kind) {
                (_, ChangeKind::Untracked) => ('?', '?'),
                (ChangeArea::Staged, kind) => (kind.code(), ' '),
                (ChangeArea::WorkingTree, kind) => (' ', kind.code()),
            };
            write!(f, "\n{index}{worktree} {}", change.path)?;
        }
        Ok(())
    }
}

/// Normalize a repository-relative path to `/`-separated form.
///
/// Returns `None` for empty, absolute, or escaping paths and for paths into
/// the `.git` metadata directory.
#[must_use]
pub fn normalize_path(file_path: &str) -> Option<String> {
    let mut parts = Vec::new();
    for component in Path::new(file_path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    match parts.first() {
        None | Some(&".git") => None,
        Some(_) => Some(parts.join("/")),
    }
}
