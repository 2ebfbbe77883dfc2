use crate::error::{RevupError, RevupResult};
use crate::stack::TopicStack;
use crate::topic::{PrStatus, PushStatus};
use anyhow::anyhow;
use git_ops::error::GitError;
use tracing::instrument;

impl TopicStack {
  /// Populate new_commits for every pushed review by cherry-picking onto
  /// the computed base ref. Reviews are visited in iteration order, so a
  /// relative topic's chain is always complete before its dependents need
  /// it. A conflict anywhere aborts the whole invocation.
  #[instrument(skip(self))]
  pub fn create_commits(&mut self, trim_tags: bool) -> RevupResult<()> {
    for key in self.review_keys() {
      let (topic_name, base_branch) = &key;
      if self.review(&key)?.push_status != PushStatus::Pushed {
        // No need to create branches that won't be pushed
        continue;
      }

      let relative_topic = self.relative_topic_of(topic_name);
      if let Some(relative) = &relative_topic {
        let relative_review = self.review(&(relative.clone(), base_branch.clone()))?;
        let relative_tip = relative_review.new_commits.last().cloned().ok_or_else(|| {
          RevupError::Other(anyhow!(
            "Bug! Relative topic {relative} is missing commits (status {})",
            relative_review.push_status
          ))
        })?;
        // The base ref for this topic is the relative topic's last commit
        self.review_mut(&key)?.base_ref = Some(relative_tip);
      }

      let base_ref = self
        .review(&key)?
        .base_ref
        .clone()
        .ok_or_else(|| RevupError::Other(anyhow!("Bug! review doesn't have a base ref")))?;

      let original_commits = self.topics[topic_name].original_commits.clone();
      let mut new_commits = Vec::with_capacity(original_commits.len());
      let mut next_parent = base_ref.clone();
      for commit in &original_commits {
        if commit.first_parent()? == next_parent && !trim_tags {
          // The intended parent is the actual parent, so the commit can be
          // reused as is (unless the message needs to change).
          new_commits.push(commit.commit_id.clone());
          next_parent = commit.commit_id.clone();
          continue;
        }

        match self.git.synthetic_cherry_pick_from_commit(commit, &next_parent) {
          Ok(picked) => {
            new_commits.push(picked.clone());
            next_parent = picked;
          }
          Err(GitError::Conflict(conflict_info)) => {
            self.git.dump_conflict(&conflict_info);
            let parent_source = if next_parent != base_ref {
              "the same topic".to_string()
            } else if let Some(relative) = &relative_topic {
              format!("relative topic \"{relative}\"")
            } else {
              format!("base branch \"{base_branch}\"")
            };
            return Err(RevupError::Conflict(format!(
              "Failed to cherry-pick commit:\n\"{}\" ({}) in topic \"{topic_name}\"\nto new parent ({}) in {parent_source}\n\n\
               You must specify relative branches to prevent this conflict!",
              commit.title,
              &commit.commit_id[..8.min(commit.commit_id.len())],
              &next_parent[..8.min(next_parent.len())],
            )));
          }
          Err(other) => return Err(other.into()),
        }
      }

      let review = self.review_mut(&key)?;
      review.new_commits = new_commits;

      // The synthesized tip can match the remote bit-for-bit even when the
      // patch-id test failed: a relative PR closed without merging, or a
      // patch that becomes a no-op on the base. Pushing would be wasteful.
      if let Some(pr_info) = &review.pr_info
        && review.new_commits.last() == Some(&pr_info.head_ref_oid)
      {
        review.push_status = PushStatus::NoChange;
        if review.status == PrStatus::New {
          // A review marked new despite having pr_info was merged before
          // being re-marked during rebase checking; restore it.
          review.status = PrStatus::Merged;
        }
      }
    }
    Ok(())
  }
}
