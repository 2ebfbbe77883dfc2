use crate::error::{RevupError, RevupResult};
use crate::patch_ids::compute_patch_ids;
use crate::stack::TopicStack;
use crate::tags::{TAG_ASSIGNEE, TAG_LABEL, TAG_REVIEWER};
use crate::topic::{PrStatus, PushStatus};
use anyhow::anyhow;
use git_ops::commit_header::commits_match;
use git_ops::repo::RevListFlags;
use github_client::endpoint::GitHubEndpoint;
use github_client::queries::query_everything;
use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};

impl TopicStack {
  /// Fetch PR, user and label info from github in one batched request and
  /// attach the results to each review.
  #[instrument(skip(self, ep))]
  pub async fn query_github<E: GitHubEndpoint>(&mut self, ep: &E) -> RevupResult<()> {
    let repo_info = self
      .repo_info
      .clone()
      .ok_or_else(|| RevupError::Other(anyhow!("Can't query without github info")))?;

    let keys = self.review_keys();
    let mut pr_targets: Vec<String> = Vec::new();
    let mut user_names: BTreeSet<String> = BTreeSet::new();
    let mut labels: BTreeSet<String> = BTreeSet::new();
    for key in &keys {
      let topic = &self.topics[&key.0];
      let review = self.review(key)?;
      pr_targets.push(review.remote_head.clone());
      user_names.extend(topic.tags.set(TAG_REVIEWER));
      user_names.extend(topic.tags.set(TAG_ASSIGNEE));
      labels.extend(topic.tags.set(TAG_LABEL));
      labels.insert(self.git.remove_branch_prefix(&key.1).to_string());
    }

    // Queries for relative branch PRs go at the end of the same request
    let mut relative_targets: BTreeSet<String> = BTreeSet::new();
    for key in &keys {
      let review = self.review(key)?;
      if !review.relative_branch.is_empty() {
        relative_targets.insert(self.git.remove_branch_prefix(&review.relative_branch).to_string());
      }
    }
    let relative_targets: Vec<String> = relative_targets.into_iter().collect();
    pr_targets.extend(relative_targets.iter().cloned());

    let user_names: Vec<String> = user_names.into_iter().collect();
    let labels: Vec<String> = labels.into_iter().collect();
    let state = query_everything(ep, &repo_info, &pr_targets, &user_names, &labels).await?;

    let mut prs = state.prs.into_iter();
    for key in &keys {
      let pr_info = prs.next().flatten();
      let review = self.review_mut(key)?;
      match &pr_info {
        None => review.status = PrStatus::New,
        Some(pr) if pr.state == "MERGED" => review.status = PrStatus::Merged,
        Some(_) => {}
      }
      review.pr_info = pr_info;
    }
    for target in relative_targets {
      if let Some(pr_info) = prs.next().flatten() {
        self.relative_infos.insert(target, pr_info);
      }
    }

    self.repo_id = Some(state.repo_id);
    self.names_to_ids = state.names_to_ids;
    self.names_to_logins = state.names_to_logins;
    self.labels_to_ids = state.labels_to_ids;
    Ok(())
  }

  /// Fetch any remote head commits that don't exist locally, so rebase
  /// classification can read them. One quiet batched fetch.
  #[instrument(skip(self))]
  pub fn fetch_git_refs(&mut self, quiet: bool) -> RevupResult<()> {
    let mut to_fetch: BTreeSet<String> = BTreeSet::new();
    for key in self.review_keys() {
      let Some(head_oid) = self.review(&key)?.pr_info.as_ref().map(|pr| pr.head_ref_oid.clone()) else {
        continue;
      };
      if !self.git.commit_exists(&head_oid)? {
        to_fetch.insert(head_oid);
      }
    }
    let to_fetch: Vec<String> = to_fetch.into_iter().collect();
    self.git.fetch_objects(&to_fetch, quiet)?;
    Ok(())
  }

  /// Compare local patch-ids against the remote per review and classify
  /// each as rebase / pure rebase / no change, deriving the push status.
  /// Ends with the promotion pass: an ancestor of a pushed review can never
  /// stay in rebase state.
  #[instrument(skip(self))]
  pub async fn mark_rebases(&mut self, skip_rebase: bool) -> RevupResult<()> {
    let keys = self.review_keys();
    for key in &keys {
      let (topic_name, base_branch) = key;
      let relative_topic = self.relative_topic_of(topic_name);

      // A merged relative branch is no longer a real base; reset the remote
      // base directly to the base branch.
      let relative_branch = self.review(key)?.relative_branch.clone();
      if !relative_branch.is_empty() {
        let stripped = self.git.remove_branch_prefix(&relative_branch).to_string();
        let relative_pr_state = self.relative_infos.get(&stripped).map(|info| info.state.clone());
        match relative_pr_state.as_deref() {
          None => {
            // A PR for the relative branch could be required here, but stay
            // permissive; worst case PR creation errors out later.
            warn!("Failed to look up relative PR for branch {stripped}");
          }
          Some("MERGED") => {
            let base_ref = if relative_topic.is_none() {
              // Only the first review in a chain needs its base reset
              if *base_branch == self.base_branch {
                Some(
                  self
                    .commits
                    .first()
                    .ok_or_else(|| RevupError::Other(anyhow!("Bug! stack has no commits")))?
                    .first_parent()?
                    .to_string(),
                )
              } else {
                Some(self.git.to_commit_hash(base_branch)?)
              }
            } else {
              None
            };
            let remote_base = self.git.remove_branch_prefix(base_branch).to_string();
            let review = self.review_mut(key)?;
            review.relative_branch = String::new();
            if let Some(base_ref) = base_ref {
              review.base_ref = Some(base_ref);
              review.remote_base = remote_base;
            }
          }
          Some(_) => {}
        }
      }

      // A merged relative topic collapses the remote base to the base branch
      if let Some(relative) = &relative_topic {
        let relative_status = self.review(&(relative.clone(), base_branch.clone()))?.status;
        if relative_status == PrStatus::Merged {
          let remote_base = self.git.remove_branch_prefix(base_branch).to_string();
          self.review_mut(key)?.remote_base = remote_base;
        }
      }

      // A PR merged into a different base than the one we resolved gets
      // left alone; a fresh PR is created instead.
      {
        let review = self.review(key)?;
        if review.status == PrStatus::Merged
          && let Some(pr_info) = &review.pr_info
          && review.remote_base != pr_info.base_ref
        {
          warn!(
            "Branch {} was merged into {} instead of {} as expected!",
            review.remote_head, pr_info.base_ref, review.remote_base
          );
          self.review_mut(key)?.status = PrStatus::New;
        }
      }

      let pr_info = self.review(key)?.pr_info.clone();
      match pr_info {
        None => {
          // A new pr, no patch ids to check
          self.review_mut(key)?.is_pure_rebase = false;
        }
        Some(pr_info) => {
          if self.topics[topic_name].patch_ids.is_empty() {
            // Lazily compute patch ids for the topic, fanned out
            let commits = self.topics[topic_name].original_commits.clone();
            let patch_ids = compute_patch_ids(&self.git, &commits).await?;
            self.topics[topic_name].patch_ids = patch_ids;
          }

          let remote_commits = self.git.commit_headers(
            &pr_info.head_ref_oid,
            Some(pr_info.base_ref_oid.as_str()),
            RevListFlags {
              first_parent: true,
              ..Default::default()
            },
          )?;
          let remote_patch_ids = compute_patch_ids(&self.git, &remote_commits).await?;

          let topic = &self.topics[topic_name];
          // A rebase iff all commit diffs match
          let is_rebase = remote_commits.len() == topic.original_commits.len()
            && topic.patch_ids.iter().zip(&remote_patch_ids).all(|(local, remote)| local == remote);
          // A pure rebase iff all commit diffs and metadata match
          let mut is_pure_rebase =
            is_rebase && topic.original_commits.iter().zip(&remote_commits).all(|(local, remote)| commits_match(local, remote));
          debug!("Review {base_branch}/{topic_name} is rebase {is_rebase} pure {is_pure_rebase}");

          if is_rebase && !is_pure_rebase && self.review(key)?.status == PrStatus::Merged {
            // The messages changed but the PR already merged; the edits will
            // be lost on the next pull, so warn here.
            warn!("Review for {topic_name} was reworded but has already been merged");
            is_pure_rebase = true;
          }

          let review = self.review_mut(key)?;
          review.remote_commits = remote_commits;
          review.remote_patch_ids = remote_patch_ids;
          review.is_pure_rebase = is_pure_rebase;
        }
      }

      // Derive the push status
      let review = self.review(key)?;
      if review.is_pure_rebase && review.pr_info.is_some() {
        // Relative reviews are only ever uploaded directly on top of each
        // other; when that relationship breaks we always reupload, keeping
        // CI behavior between the branches predictable.
        let relative_review = match &relative_topic {
          Some(relative) => Some(self.review(&(relative.clone(), base_branch.clone()))?),
          None => None,
        };
        let is_on_top_of_relative = match relative_review {
          None => true,
          Some(relative_review) => {
            relative_review.pr_info.is_none()
              || relative_review
                .remote_commits
                .last()
                .zip(review.remote_commits.first())
                .is_some_and(|(relative_tip, own_oldest)| own_oldest.parents.first() == Some(&relative_tip.commit_id))
          }
        };
        let relative_topic_is_nochange = relative_review.is_some_and(|r| r.push_status == PushStatus::NoChange);
        let relative_topic_is_skippable = relative_review.is_none_or(|r| r.push_status != PushStatus::Pushed);

        let same_parent_as_remote = review
          .remote_commits
          .first()
          .and_then(|oldest| oldest.parents.first())
          .is_some_and(|remote_parent| review.base_ref.as_deref() == Some(remote_parent.as_str()));

        let new_push_status = if same_parent_as_remote || (relative_topic_is_nochange && is_on_top_of_relative) {
          // A rebase with the same parent means there is nothing to push;
          // same when sitting on top of an unchanged relative topic.
          Some(PushStatus::NoChange)
        } else if review.status == PrStatus::Merged || (skip_rebase && is_on_top_of_relative && relative_topic_is_skippable) {
          // Never push merged changes. Also skip pushing rebases when asked,
          // but only with a correct relative base and an unpushed relative.
          Some(PushStatus::Rebase)
        } else {
          None
        };

        if let Some(push_status) = new_push_status {
          let review = self.review_mut(key)?;
          review.push_status = push_status;
          if push_status == PushStatus::NoChange {
            // Copy the remote commit ids so later topics can cherry-pick
            // onto them. Pushed reviews will synthesize their own commits,
            // and rebases are either skipped or promoted to pushed.
            review.new_commits = review.remote_commits.iter().map(|c| c.commit_id.clone()).collect();
          }
        }
      } else if self.review(key)?.status == PrStatus::Merged {
        // "Merged" but not a rebase: there is new content that belongs in a
        // fresh PR.
        self.review_mut(key)?.status = PrStatus::New;
      }

      // Promotion pass: a pushed review forces every rebase-skipped
      // ancestor to be pushed too, otherwise github would show the wrong
      // commit diff between the two reviews.
      if self.review(key)?.push_status == PushStatus::Pushed {
        let mut cursor = relative_topic;
        while let Some(ancestor_name) = cursor {
          let ancestor_key = (ancestor_name.clone(), base_branch.clone());
          let ancestor = self.review_mut(&ancestor_key)?;
          if ancestor.push_status != PushStatus::Rebase {
            break;
          }
          ancestor.push_status = PushStatus::Pushed;
          if ancestor.status == PrStatus::Merged {
            // The user rebased an already merged PR without moving past it.
            // There is no way to handle this without a conflict or a wrong
            // diff, so show the wrong diff and warn.
            warn!("Attempted to rebase an already merged PR {ancestor_name}");
            warn!("'git pull' and upload again to fix this.");
          }
          cursor = self.relative_topic_of(&ancestor_name);
        }
      }
    }
    Ok(())
  }
}
