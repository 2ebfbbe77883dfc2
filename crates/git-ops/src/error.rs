use thiserror::Error;

/// A single conflict event reported by `git merge-tree`.
#[derive(Debug, Clone)]
pub struct GitConflict {
  /// Conflict type, e.g. "CONFLICT (contents)" or "Auto-merging"
  pub kind: String,
  /// Human readable message from git
  pub message: String,
  /// Paths involved in this conflict
  pub paths: Vec<String>,
}

/// Everything we know about a failed tree merge. The result tree still
/// exists in the object store and contains conflict markers.
#[derive(Debug, Clone)]
pub struct GitConflictInfo {
  pub tree: String,
  pub conflicts: Vec<GitConflict>,
}

impl GitConflictInfo {
  /// Paths of real conflicts, skipping informational events.
  pub fn conflicting_paths(&self) -> Vec<&str> {
    self
      .conflicts
      .iter()
      .filter(|c| c.kind != "Auto-merging")
      .flat_map(|c| c.paths.iter().map(String::as_str))
      .collect()
  }
}

/// Error type for tree-level git operations.
#[derive(Debug, Error)]
pub enum GitError {
  /// A ref given by the user does not resolve to a commit.
  #[error("{0} is not a commit or branch name!")]
  InvalidRef(String),

  /// `git merge-tree` reported path conflicts.
  #[error("merge conflict on {:?}", .0.conflicting_paths())]
  Conflict(GitConflictInfo),

  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

pub type GitResult<T> = Result<T, GitError>;
