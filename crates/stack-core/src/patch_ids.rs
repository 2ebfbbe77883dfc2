use anyhow::anyhow;
use git_ops::commit_header::CommitHeader;
use git_ops::error::{GitError, GitResult};
use git_ops::repo::GitRepo;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::instrument;

/// Compute patch-ids for a batch of commits, overlapping the git
/// subprocesses. Subprocess creation is capped at the machine's
/// parallelism so the git binary isn't overwhelmed.
#[instrument(skip(git, commits), fields(commits = commits.len()))]
pub async fn compute_patch_ids(git: &GitRepo, commits: &[CommitHeader]) -> GitResult<Vec<String>> {
  let parallelism = std::thread::available_parallelism().map(usize::from).unwrap_or(8);
  let semaphore = Arc::new(Semaphore::new(parallelism));

  let mut set: JoinSet<(usize, GitResult<String>)> = JoinSet::new();
  for (index, commit) in commits.iter().enumerate() {
    let git = git.clone();
    let commit_id = commit.commit_id.clone();
    let semaphore = semaphore.clone();
    set.spawn(async move {
      let permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return (index, Err(GitError::Other(anyhow!("patch-id semaphore closed")))),
      };
      let result = tokio::task::spawn_blocking(move || git.get_patch_id(&commit_id)).await;
      drop(permit);
      match result {
        Ok(patch_id) => (index, patch_id),
        Err(e) => (index, Err(GitError::Other(anyhow!("patch-id task failed: {e}")))),
      }
    });
  }

  let mut patch_ids = vec![String::new(); commits.len()];
  while let Some(joined) = set.join_next().await {
    let (index, result) = joined.map_err(|e| GitError::Other(anyhow!("patch-id task panicked: {e}")))?;
    patch_ids[index] = result?;
  }
  Ok(patch_ids)
}
