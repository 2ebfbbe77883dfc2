use crate::error::{RevupError, RevupResult};
use crate::stack::TopicStack;
use anyhow::anyhow;
use git_ops::commit_header::CommitHeader;
use git_ops::error::GitError;
use std::collections::HashSet;
use tracing::instrument;

impl TopicStack {
  /// Create a new commit chain with each topic's commits consolidated into
  /// a contiguous block, then soft-reset to it. Topicless commits go first
  /// or last, and empty commits are dropped (git pull --rebase doesn't drop
  /// empty commits for already-merged topics).
  #[instrument(skip(self))]
  pub fn restack(&mut self, topicless_last: bool) -> RevupResult<String> {
    let mut to_pick: Vec<CommitHeader> = Vec::new();
    for topic in self.topics.values() {
      let mut this_topic = Vec::new();
      let mut topic_is_empty = true;
      for commit in &topic.original_commits {
        this_topic.push(commit.clone());
        if !self.git.have_identical_trees(&commit.commit_id, commit.first_parent()?)? {
          topic_is_empty = false;
        }
      }
      if !topic_is_empty {
        to_pick.extend(this_topic);
      }
    }

    let picked_ids: HashSet<&str> = to_pick.iter().map(|c| c.commit_id.as_str()).collect();
    let mut no_topic: Vec<CommitHeader> = Vec::new();
    for commit in &self.commits {
      if !picked_ids.contains(commit.commit_id.as_str()) && !self.git.have_identical_trees(&commit.commit_id, commit.first_parent()?)? {
        no_topic.push(commit.clone());
      }
    }

    let mut new_parent = self
      .commits
      .first()
      .ok_or_else(|| RevupError::Other(anyhow!("Bug! stack has no commits")))?
      .first_parent()?
      .to_string();

    let to_restack: Vec<CommitHeader> = if topicless_last {
      to_pick.into_iter().chain(no_topic).collect()
    } else {
      no_topic.into_iter().chain(to_pick).collect()
    };

    for commit in &to_restack {
      match self.git.synthetic_cherry_pick_from_commit(commit, &new_parent) {
        Ok(picked) => new_parent = picked,
        Err(GitError::Conflict(conflict_info)) => {
          self.git.dump_conflict(&conflict_info);
          return Err(RevupError::Conflict(format!(
            "Failed to cherry-pick commit:\n\"{}\" ({})\nto new parent ({})\n\n\
             You may need to `git rebase -i {}` to resolve these conflicts!",
            commit.title,
            &commit.commit_id[..8.min(commit.commit_id.len())],
            &new_parent[..8.min(new_parent.len())],
            &new_parent[..8.min(new_parent.len())],
          )));
        }
        Err(other) => return Err(other.into()),
      }
    }

    self.git.soft_reset(&new_parent, "reset --soft (revup restack)")?;
    Ok(new_parent)
  }
}
