use git_ops::error::GitError;
use github_client::endpoint::GitHubError;
use thiserror::Error;

/// User-facing error kinds. The CLI maps each variant to its exit code:
/// usage errors exit 2, merge conflicts 3, failed auxiliary commands 4,
/// review-platform errors 5, HTTP failures 6, everything else 1.
#[derive(Debug, Error)]
pub enum RevupError {
  /// Bad flags, invalid tags or refs, or structural violations of the
  /// relative/base-branch rules.
  #[error("{0}")]
  Usage(String),

  /// A cherry-pick hit path conflicts. The message names the topic, the
  /// commit, the inferred parent source and one actionable hint.
  #[error("{0}")]
  Conflict(String),

  /// An auxiliary subprocess (editor, pre-upload hook) exited nonzero.
  #[error("{0}")]
  Shell(String),

  #[error(transparent)]
  GitHub(#[from] GitHubError),

  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

impl From<GitError> for RevupError {
  fn from(err: GitError) -> Self {
    match err {
      GitError::InvalidRef(_) => RevupError::Usage(err.to_string()),
      GitError::Conflict(_) => RevupError::Conflict(err.to_string()),
      GitError::Other(e) => RevupError::Other(e),
    }
  }
}

pub type RevupResult<T> = Result<T, RevupError>;
