use crate::error::{RevupError, RevupResult};
use crate::stack::TopicStack;
use crate::tags::{TAG_ASSIGNEE, TAG_LABEL, TAG_REVIEWER};
use crate::topic::{PrStatus, PushStatus, ReviewKey};
use anyhow::anyhow;
use chrono::{Datelike, Local, Timelike};
use github_client::endpoint::GitHubEndpoint;
use github_client::pr::{MAX_COMMENTS_TO_QUERY, PrComment, PrInfo};
use github_client::queries::{create_pull_requests, update_pull_requests};
use std::collections::{BTreeSet, HashMap};
use tracing::instrument;

/// First lines identifying the two maintained comments. Comment identity is
/// the literal sentinel, matched within the queried comment window.
pub const PATCHSETS_FIRST_LINE: &str = "| # | head | base | diff | date | summary |\r\n| - | - | - | - | - | - |";
pub const REVIEW_GRAPH_FIRST_LINE: &str = "Reviews in this chain:\r\n";

fn translate_if_exists(names: &BTreeSet<String>, translation: &HashMap<String, String>) -> BTreeSet<String> {
  names.iter().filter_map(|name| translation.get(name)).cloned().collect()
}

impl TopicStack {
  /// Seed PrInfo for new reviews, match maintained comment slots, and
  /// accumulate the field mutations for every review that differs from the
  /// remote.
  #[instrument(skip(self))]
  pub fn populate_update_info(&mut self, update_pr_body: bool) -> RevupResult<()> {
    if self.repo_id.is_none() {
      return Err(RevupError::Other(anyhow!("Need to query before updating")));
    }

    for key in self.review_keys() {
      let (topic_name, base_branch) = &key;
      let topic = &self.topics[topic_name];

      let first_commit_msg = topic
        .original_commits
        .first()
        .map(|c| c.commit_msg.clone())
        .unwrap_or_default();
      let mut lines = first_commit_msg.splitn(2, '\n');
      let title = lines.next().unwrap_or_default().to_string();
      let body = lines.next().unwrap_or_default().trim().to_string();

      let reviewer_tags = topic.tags.set(TAG_REVIEWER);
      let assignee_tags = topic.tags.set(TAG_ASSIGNEE);
      let mut labels = topic.tags.set(TAG_LABEL);

      let base_branch_name = self.git.remove_branch_prefix(base_branch).to_string();
      if self.labels_to_ids.contains_key(&base_branch_name) {
        // The base branch name doubles as a label showing all changes
        // targeting that branch
        labels.insert(base_branch_name);
      }

      let review = self.review(&key)?;
      let mut pr_info = review.pr_info.clone();
      if review.status == PrStatus::New {
        let base_ref = review
          .base_ref
          .clone()
          .ok_or_else(|| RevupError::Other(anyhow!("Bug! review {topic_name} {} doesn't have a base ref", review.remote_base)))?;
        pr_info = Some(PrInfo {
          base_ref: review.remote_base.clone(),
          base_ref_oid: base_ref,
          head_ref: review.remote_head.clone(),
          head_ref_oid: review.new_commits.last().cloned().unwrap_or_default(),
          body: body.clone(),
          title: title.clone(),
          is_draft: review.is_draft,
          ..Default::default()
        });
      }

      let Some(mut info) = pr_info else {
        continue;
      };
      if review.status == PrStatus::Merged {
        self.review_mut(&key)?.pr_info = Some(info);
        continue;
      }

      // Match comment slots for the maintained comments; unmatched slots
      // point past the queried comments, meaning "add a new one"
      let mut review_graph_index = None;
      let mut patchsets_index = None;
      for i in 0..MAX_COMMENTS_TO_QUERY {
        if i >= info.comments.len() {
          if review_graph_index.is_none() {
            review_graph_index = Some(i);
          } else if patchsets_index.is_none() {
            patchsets_index = Some(i);
          }
        } else if info.comments[i].text.starts_with(REVIEW_GRAPH_FIRST_LINE) {
          review_graph_index = Some(i);
        } else if info.comments[i].text.starts_with(PATCHSETS_FIRST_LINE) {
          patchsets_index = Some(i);
        }
      }

      let label_ids: BTreeSet<String> = translate_if_exists(&labels, &self.labels_to_ids)
        .difference(&info.label_ids)
        .cloned()
        .collect();
      let valid_labels: BTreeSet<String> = labels.iter().filter(|l| self.labels_to_ids.contains_key(*l)).cloned().collect();

      // Reviewers who are already requested or have reviewed are left out of
      // the add-set, so an upload doesn't clear an existing approval
      let reviewer_ids: BTreeSet<String> = translate_if_exists(&reviewer_tags, &self.names_to_ids)
        .difference(&info.reviewer_ids)
        .cloned()
        .collect();
      let reviewer_logins: BTreeSet<String> = translate_if_exists(&reviewer_tags, &self.names_to_logins)
        .difference(&info.reviewers)
        .cloned()
        .collect();
      let assignee_ids: BTreeSet<String> = translate_if_exists(&assignee_tags, &self.names_to_ids)
        .difference(&info.assignee_ids)
        .cloned()
        .collect();
      let assignee_logins: BTreeSet<String> = translate_if_exists(&assignee_tags, &self.names_to_logins)
        .difference(&info.assignees)
        .cloned()
        .collect();

      let is_draft = review.is_draft;
      let remote_base = review.remote_base.clone();

      let review = self.review_mut(&key)?;
      review.review_graph_index = review_graph_index;
      review.patchsets_index = patchsets_index;

      if info.base_ref != remote_base {
        review.pr_update.base_ref = Some(remote_base);
      }
      if update_pr_body && info.body != body {
        review.pr_update.body = Some(body.clone());
      }
      if update_pr_body && info.title != title {
        review.pr_update.title = Some(title.clone());
      }
      if info.is_draft != is_draft {
        review.pr_update.is_draft = Some(is_draft);
      }
      review.pr_update.label_ids = label_ids;
      review.pr_update.reviewer_ids = reviewer_ids;
      review.pr_update.assignee_ids = assignee_ids;

      info.reviewers.extend(reviewer_logins);
      info.assignees.extend(assignee_logins);
      info.labels.extend(valid_labels);
      review.pr_info = Some(info);
    }
    Ok(())
  }

  /// Render the relative chain each review belongs to as a markdown list.
  /// Every member of a chain maps to the same full-chain text.
  pub fn create_review_graph(&self) -> RevupResult<HashMap<String, String>> {
    fn graph_helper(
      stack: &TopicStack,
      key: &ReviewKey,
      back: &str,
      prefix: &str,
      text: &mut String,
      members: &mut Vec<String>,
    ) -> RevupResult<()> {
      let review = stack.review(key)?;
      let Some(pr_info) = &review.pr_info else {
        return Ok(());
      };
      let review_title = review.pr_update.title.clone().unwrap_or_else(|| pr_info.title.clone());
      text.push_str(&format!("{back}{prefix}{} {review_title}\n", pr_info.url));
      members.push(review.remote_head.clone());

      let children = review.children.clone();
      for (i, child) in children.iter().enumerate() {
        let next_back = format!("{back}{}", if prefix == "└" { "\u{3000}" } else { "│" });
        let next_prefix = if i == children.len() - 1 { "└" } else { "├" };
        graph_helper(stack, child, &next_back, next_prefix, text, members)?;
      }
      Ok(())
    }

    let mut graph: HashMap<String, String> = HashMap::new();
    for key in self.review_keys() {
      if self.topics[&key.0].relative_topic.is_some() {
        continue;
      }
      let mut text = String::new();
      let mut members = Vec::new();
      graph_helper(self, &key, "", "└", &mut text, &mut members)?;
      for member in members {
        graph.insert(member, text.clone());
      }
    }
    Ok(graph)
  }

  /// Insert or update the review-graph comment on every non-merged review,
  /// bolding the review's own entry.
  #[instrument(skip(self))]
  pub fn populate_review_graph(&mut self) -> RevupResult<()> {
    let graph = self.create_review_graph()?;
    for key in self.review_keys() {
      let review = self.review(&key)?;
      let Some(index) = review.review_graph_index else {
        continue;
      };
      let Some(pr_info) = review.pr_info.clone() else {
        continue;
      };
      if review.status == PrStatus::Merged {
        continue;
      }
      let Some(chain) = graph.get(&review.remote_head) else {
        continue;
      };

      let review_title = review.pr_update.title.clone().unwrap_or_else(|| pr_info.title.clone());
      let graph_text = format!(
        "{REVIEW_GRAPH_FIRST_LINE}{}",
        chain
          .replace(&pr_info.url, &format!("**{}**", pr_info.url))
          .replace(&review_title, &format!("**{review_title}**"))
      );

      let review = self.review_mut(&key)?;
      if index < pr_info.comments.len() {
        if graph_text != pr_info.comments[index].text {
          // Edit the existing comment in place
          review
            .pr_update
            .comments
            .push(PrComment::new(graph_text, pr_info.comments[index].id.clone()));
        }
      } else {
        // Insert first so the graph lands at the top of the PR
        review.pr_update.comments.insert(0, PrComment::new(graph_text, None));
      }
    }
    Ok(())
  }

  /// Build the next patchsets table row for a review: head, base, diff link
  /// (through a virtual diff target when the review was rebased), date and
  /// shortstat summary.
  fn create_patchsets_comment(&mut self, key: &ReviewKey, orig: Option<PrComment>) -> RevupResult<Option<PrComment>> {
    let (repo_name, fork_owner) = match (&self.repo_info, &self.fork_info) {
      (Some(repo), Some(fork)) => (repo.name.clone(), fork.owner.clone()),
      _ => return Ok(None),
    };

    let review = self.review(key)?;
    if review.push_status != PushStatus::Pushed || review.status == PrStatus::Merged {
      return Ok(None);
    }
    let Some(pr_info) = review.pr_info.clone() else {
      return Ok(None);
    };
    let Some(base_ref) = review.base_ref.clone() else {
      return Ok(None);
    };
    let Some(new_head) = review.new_commits.last().cloned() else {
      return Ok(None);
    };

    let (mut text, number) = match &orig {
      None => (PATCHSETS_FIRST_LINE.to_string(), 0u32),
      Some(orig) if !orig.text.starts_with(PATCHSETS_FIRST_LINE) => {
        // The matched comment isn't a patchsets table; leave it alone
        return Ok(None);
      }
      Some(orig) => {
        let last_line = orig.text.split("\r\n").last().unwrap_or_default();
        let cells: Vec<&str> = last_line.split('|').collect();
        if cells.len() < 2 {
          return Ok(None);
        }
        match cells[1].trim().parse::<u32>() {
          Ok(previous) => (orig.text.clone(), previous + 1),
          Err(_) => return Ok(None),
        }
      }
    };

    let status = review.status;
    let is_pure_rebase = review.is_pure_rebase;

    let (diff, summary) = if is_pure_rebase {
      // A rebase needs no virtual diff target, there is nothing to compare
      ("rebase".to_string(), "0 files changed".to_string())
    } else {
      let diff_base = if status == PrStatus::New {
        // New PR, diff against the base to show the full change
        base_ref.clone()
      } else if base_ref != pr_info.base_ref_oid {
        // Rebased review, diff through a virtual target so upstream churn
        // stays out of the comparison
        let parent = self.last_virtual_diff_target.clone().unwrap_or_else(|| self.base_branch.clone());
        let target = self
          .git
          .make_virtual_diff_target(&pr_info.base_ref_oid, &pr_info.head_ref_oid, &base_ref, &new_head, Some(parent.as_str()))?;
        self.last_virtual_diff_target = Some(target.clone());
        target
      } else {
        // Plain push, diff against the previous version of the branch
        pr_info.head_ref_oid.clone()
      };

      let mut summary = self.git.get_diff_summary(&diff_base, &new_head)?;
      if summary.is_empty() {
        summary = "0 files changed".to_string();
      }
      (format!("[diff](/{fork_owner}/{repo_name}/compare/{diff_base}..{new_head})"), summary)
    };

    let now = Local::now();
    let timestamp = format!("{} {} {}:{:02} {}", now.format("%b"), now.day(), now.hour(), now.minute(), now.format("%p"));
    let head_short = &new_head[..8.min(new_head.len())];
    let base_short = &base_ref[..8.min(base_ref.len())];
    text.push_str(&format!(
      "\r\n| {number} | [{head_short}](/{fork_owner}/{repo_name}/commit/{new_head}) | [{base_short}](/{fork_owner}/{repo_name}/commit/{base_ref}) | {diff} | {timestamp} | {summary} |"
    ));

    Ok(Some(PrComment::new(text, orig.and_then(|o| o.id))))
  }

  /// Append the patchsets comment update for every eligible review.
  #[instrument(skip(self))]
  pub fn populate_patchsets(&mut self) -> RevupResult<()> {
    for key in self.review_keys() {
      let review = self.review(&key)?;
      let Some(index) = review.patchsets_index else {
        continue;
      };
      let Some(pr_info) = &review.pr_info else {
        continue;
      };
      if review.status == PrStatus::Merged {
        continue;
      }
      let orig = pr_info.comments.get(index).cloned();
      if let Some(comment) = self.create_patchsets_comment(&key, orig)? {
        self.review_mut(&key)?.pr_update.comments.push(comment);
      }
    }
    Ok(())
  }

  /// Push every changed head in one atomic call, plus the virtual diff
  /// target chain if one was built.
  #[instrument(skip(self))]
  pub fn push_git_refs(&mut self, uploader: &str, create_local_branches: bool, quiet: bool) -> RevupResult<()> {
    let mut push_targets: Vec<String> = Vec::new();
    for key in self.review_keys() {
      let review = self.review(&key)?;
      if review.push_status != PushStatus::Pushed || review.status == PrStatus::Merged {
        continue;
      }
      let new_head = review
        .new_commits
        .last()
        .cloned()
        .ok_or_else(|| RevupError::Other(anyhow!("Bug! pushed review {} has no commits", review.remote_head)))?;
      push_targets.push(format!("{new_head}:refs/heads/{}", review.remote_head));

      if create_local_branches {
        let remote_head = review.remote_head.clone();
        self.git.update_local_ref(&remote_head, &new_head)?;
      }
    }

    if let Some(virtual_diff_target) = &self.last_virtual_diff_target {
      let virtual_diff_branch = format!("{uploader}/revup/virtual_diff_targets");
      push_targets.push(format!("{virtual_diff_target}:refs/heads/{virtual_diff_branch}"));
    }

    // One push for all refs is much faster, and atomicity means either all
    // new heads become visible or none do
    self.git.push_refs(&push_targets, quiet)?;
    Ok(())
  }

  /// Create all new PRs in one mutation and record their node ids and URLs.
  #[instrument(skip(self, ep))]
  pub async fn create_prs<E: GitHubEndpoint>(&mut self, ep: &E) -> RevupResult<()> {
    let (repo_info, fork_info, repo_id) = match (&self.repo_info, &self.fork_info, &self.repo_id) {
      (Some(repo), Some(fork), Some(id)) => (repo.clone(), fork.clone(), id.clone()),
      _ => return Err(RevupError::Other(anyhow!("Can't update without github info"))),
    };

    let mut create_keys: Vec<ReviewKey> = Vec::new();
    let mut prs_to_create: Vec<PrInfo> = Vec::new();
    for key in self.review_keys() {
      let review = self.review(&key)?;
      if review.status == PrStatus::New
        && let Some(pr_info) = &review.pr_info
      {
        create_keys.push(key);
        prs_to_create.push(pr_info.clone());
      }
    }
    if prs_to_create.is_empty() {
      return Ok(());
    }

    // Labels and reviewers can't be attached at creation time, so these PRs
    // will most likely also be touched by the update mutation
    let created = create_pull_requests(ep, &repo_id, &repo_info, &fork_info, &prs_to_create).await?;
    for (key, created_pr) in create_keys.iter().zip(created) {
      if let Some(created_pr) = created_pr {
        let review = self.review_mut(key)?;
        if let Some(pr_info) = review.pr_info.as_mut() {
          pr_info.id = created_pr.id;
          pr_info.url = created_pr.url;
        }
      }
    }
    Ok(())
  }

  /// Send every accumulated PR mutation in one request.
  #[instrument(skip(self, ep))]
  pub async fn update_prs<E: GitHubEndpoint>(&mut self, ep: &E) -> RevupResult<()> {
    if self.repo_id.is_none() {
      return Err(RevupError::Other(anyhow!("Can't update without github info")));
    }

    let mut prs_to_update = Vec::new();
    for key in self.review_keys() {
      let review = self.review_mut(&key)?;
      let Some(pr_info) = &review.pr_info else {
        continue;
      };
      if pr_info.id.is_empty() || !review.pr_update.has_changes() {
        continue;
      }
      review.pr_update.id = pr_info.id.clone();
      prs_to_update.push(review.pr_update.clone());
      if review.status != PrStatus::New {
        review.status = PrStatus::Updated;
      }
    }

    if !prs_to_update.is_empty() {
      update_pull_requests(ep, &prs_to_update).await?;
    }
    Ok(())
  }
}
