use crate::error::{RevupError, RevupResult};
use crate::tags::{
  BranchFormat, TAG_ASSIGNEE, TAG_BRANCH, TAG_LABEL, TAG_RELATIVE, TAG_RELATIVE_BRANCH, TAG_REVIEWER, TAG_TOPIC,
  TAG_UPLOADER, auto_topic_name, commit_prefix_label, format_remote_branch, parse_commit_tags,
};
use crate::topic::{PrStatus, Review, ReviewKey, Topic};
use anyhow::anyhow;
use git_ops::commit_header::CommitHeader;
use git_ops::repo::{GitRepo, RevListFlags};
use github_client::pr::{PrInfo, RepoInfo};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, instrument, warn};

/// Options for review resolution, mirroring the upload flags that affect it.
#[derive(Debug, Clone)]
pub struct ReviewOptions {
  /// Fallback uploader name for topics without an Uploader tag
  pub uploader: String,
  pub branch_format: BranchFormat,
  /// Treat every topic as relative to the previous one
  pub force_relative_chain: bool,
  /// Extra labels applied to every topic
  pub labels: Option<String>,
  /// Comma separated `alias:target` reviewer/assignee rewrites
  pub user_aliases: String,
  /// One of "no", "a2r", "r2a", "both"
  pub auto_add_users: String,
  /// Drop topics with no commits authored by the configured user
  pub self_authored_only: bool,
  /// Restrict the upload to these topics and their transitive relatives
  pub limit_topics: Vec<String>,
}

impl Default for ReviewOptions {
  fn default() -> Self {
    Self {
      uploader: String::new(),
      branch_format: BranchFormat::default(),
      force_relative_chain: false,
      labels: None,
      user_aliases: String::new(),
      auto_add_users: "no".to_string(),
      self_authored_only: false,
      limit_topics: Vec::new(),
    }
  }
}

/// Constructs and manages all topic and review state for one invocation.
pub struct TopicStack {
  pub git: GitRepo,

  /// Default base branch for topics that don't specify one; prefixed after
  /// populate_topics resolves it
  pub base_branch: String,

  /// Branch that reviews without a relative topic sit on
  pub relative_branch: String,

  /// Tip of the local stack, normally HEAD
  pub head: String,

  pub repo_info: Option<RepoInfo>,
  pub fork_info: Option<RepoInfo>,

  /// All first-parent commits between the branch point and head
  pub commits: Vec<CommitHeader>,

  /// Topics in first-appearance order
  pub topics: IndexMap<String, Topic>,

  /// Github node id of the repo
  pub repo_id: Option<String>,

  /// Github node ids and full logins of queried users
  pub names_to_ids: HashMap<String, String>,
  pub names_to_logins: HashMap<String, String>,

  /// Github node ids of labels
  pub labels_to_ids: HashMap<String, String>,

  /// PR info for relative branches, keyed by stripped branch name
  pub relative_infos: HashMap<String, PrInfo>,

  /// Virtual diff targets for the current upload chain into a dummy branch
  pub last_virtual_diff_target: Option<String>,

  populated: bool,
}

impl TopicStack {
  pub fn new(
    git: GitRepo,
    base_branch: &str,
    relative_branch: &str,
    head: &str,
    repo_info: Option<RepoInfo>,
    fork_info: Option<RepoInfo>,
  ) -> Self {
    Self {
      git,
      base_branch: base_branch.to_string(),
      relative_branch: relative_branch.to_string(),
      head: if head.is_empty() { "HEAD".to_string() } else { head.to_string() },
      repo_info,
      fork_info,
      commits: Vec::new(),
      topics: IndexMap::new(),
      repo_id: None,
      names_to_ids: HashMap::new(),
      names_to_logins: HashMap::new(),
      labels_to_ids: HashMap::new(),
      relative_infos: HashMap::new(),
      last_virtual_diff_target: None,
      populated: false,
    }
  }

  /// (topic, base branch) pairs in iteration order.
  pub fn review_keys(&self) -> Vec<ReviewKey> {
    self
      .topics
      .iter()
      .flat_map(|(name, topic)| topic.reviews.keys().map(|branch| (name.clone(), branch.clone())))
      .collect()
  }

  pub(crate) fn review(&self, key: &ReviewKey) -> RevupResult<&Review> {
    self
      .topics
      .get(&key.0)
      .and_then(|topic| topic.reviews.get(&key.1))
      .ok_or_else(|| RevupError::Other(anyhow!("Bug! review {}/{} is missing", key.0, key.1)))
  }

  pub(crate) fn review_mut(&mut self, key: &ReviewKey) -> RevupResult<&mut Review> {
    self
      .topics
      .get_mut(&key.0)
      .and_then(|topic| topic.reviews.get_mut(&key.1))
      .ok_or_else(|| RevupError::Other(anyhow!("Bug! review {}/{} is missing", key.0, key.1)))
  }

  pub(crate) fn relative_topic_of(&self, name: &str) -> Option<String> {
    self.topics.get(name).and_then(|topic| topic.relative_topic.clone())
  }

  /// Parse all commits between head and the branch point and sort them into
  /// topics.
  #[instrument(skip(self))]
  pub fn populate_topics(&mut self, auto_topic: bool, trim_tags: bool) -> RevupResult<()> {
    if self.populated {
      return Ok(());
    }

    if !self.base_branch.is_empty() {
      self.base_branch = self.git.ensure_branch_prefix(&self.base_branch);
      self.git.verify_branch_or_commit(&self.base_branch)?;
    } else {
      // Base branch can be autodetected if not specified
      self.base_branch = self.git.get_best_base_branch(&self.head, true, true)?;
    }

    if !self.relative_branch.is_empty() {
      self.relative_branch = self.git.ensure_branch_prefix(&self.relative_branch);
      self.git.verify_branch_or_commit(&self.relative_branch)?;
    } else {
      // If relative branch is not specified, its just the base branch
      self.relative_branch = self.base_branch.clone();
    }

    let branch_point = self.git.fork_point(&self.head, &self.relative_branch)?;
    if self.base_branch != self.relative_branch {
      // The model expects the relative branch to be forked off the base
      // branch, and head to be forked off the relative branch.
      let base_branch_point = self.git.fork_point(&self.head, &self.base_branch)?;
      if !self.git.is_ancestor(&base_branch_point, &branch_point)? {
        return Err(RevupError::Usage(format!(
          "Relative branch structure is invalid: {} is closer to {} than {}. Specifically we expect \
           the fork point with {} ({base_branch_point}) to be an ancestor of the fork point with {} \
           ({branch_point}).",
          self.head, self.base_branch, self.relative_branch, self.base_branch, self.relative_branch
        )));
      }
    }

    self.commits = self.git.commit_headers(
      &self.head,
      Some(branch_point.as_str()),
      RevListFlags {
        first_parent: true,
        ..Default::default()
      },
    )?;

    let remote_name = self.git.remote_name.clone();
    for commit in &mut self.commits {
      let (mut parsed_tags, trimmed_msg) = parse_commit_tags(&remote_name, &commit.commit_msg);

      if parsed_tags.count(TAG_TOPIC) == 0 {
        if auto_topic {
          parsed_tags.insert(TAG_TOPIC, auto_topic_name(&trimmed_msg));
        } else {
          // No topic tags, not a revup commit
          continue;
        }
      }

      if parsed_tags.count(TAG_TOPIC) > 1 {
        return Err(RevupError::Usage(format!(
          "Can't specify more than one topic for a commit!\n\n{}",
          commit.commit_msg
        )));
      }

      if trim_tags {
        commit.commit_msg = trimmed_msg;
      }
      let name = parsed_tags.first(TAG_TOPIC).unwrap_or_default().to_string();
      let topic = self.topics.entry(name.clone()).or_insert_with(|| Topic::new(name));
      topic.original_commits.push(commit.clone());
      topic.tags.add_tags(&parsed_tags);
    }

    self.populated = true;
    Ok(())
  }

  /// Restrict the stack to the requested topics plus everything they are
  /// relative to.
  fn limit_to_topics(&mut self, options: &ReviewOptions) -> RevupResult<()> {
    if options.limit_topics.is_empty() {
      return Ok(());
    }

    let mut keep: BTreeSet<String> = BTreeSet::new();
    for name in &options.limit_topics {
      if !self.topics.contains_key(name) {
        return Err(RevupError::Usage(format!("Topic '{name}' was not found in the stack")));
      }
      if options.force_relative_chain {
        // Relatives are positional in chain mode, so keep the whole prefix
        for earlier in self.topics.keys() {
          keep.insert(earlier.clone());
          if earlier == name {
            break;
          }
        }
        continue;
      }
      let mut cursor = Some(name.clone());
      while let Some(current) = cursor {
        if !keep.insert(current.clone()) {
          break;
        }
        cursor = self
          .topics
          .get(&current)
          .and_then(|topic| topic.tags.first(TAG_RELATIVE).map(String::from))
          .filter(|relative| self.topics.contains_key(relative));
      }
    }

    self.topics.retain(|name, _| keep.contains(name));
    Ok(())
  }

  /// Populate reviews for already-parsed topics, verifying base branch and
  /// relative topic structure.
  #[instrument(skip(self, options))]
  pub fn populate_reviews(&mut self, options: &ReviewOptions) -> RevupResult<()> {
    self.limit_to_topics(options)?;

    let names: Vec<String> = self.topics.keys().cloned().collect();
    let mut seen: Vec<String> = Vec::new();
    let cross_fork = match (&self.repo_info, &self.fork_info) {
      (Some(repo), Some(fork)) => repo.owner != fork.owner,
      _ => false,
    };

    for name in names {
      if options.self_authored_only {
        // Don't upload topics with no commits authored by the current user.
        // Checked early so later validation can't fail for skipped changes.
        let topic = &self.topics[&name];
        let has_self_authored = topic.original_commits.iter().any(|c| c.author_email.to_lowercase() == self.git.email);
        if !has_self_authored {
          info!("Skipping topic '{name}' since it has no self-authored commits, pass '--no-self-authored-only' to override");
          self.topics.shift_remove(&name);
          continue;
        }
      }

      if self.topics[&name].tags.count(TAG_UPLOADER) > 1 {
        return Err(RevupError::Usage(format!("Can't specify more than one uploader for topic {name}!")));
      }

      let mut relative_topic = String::new();
      if options.force_relative_chain && !seen.is_empty() {
        relative_topic = seen.last().cloned().unwrap_or_default();
      } else {
        let topic = &self.topics[&name];
        match topic.tags.count(TAG_RELATIVE) {
          0 => {}
          1 => {
            // Each topic can have at most 1 relative topic. If the topic
            // doesn't specify base branches, it gets the relative topic's;
            // it can't specify branches the relative topic doesn't have.
            relative_topic = topic.tags.first(TAG_RELATIVE).unwrap_or_default().to_string();
            if !seen.contains(&relative_topic) {
              if self.topics.contains_key(&relative_topic) {
                // The first commit of the relative topic must come before
                // the first commit of this topic, preventing cycles.
                return Err(RevupError::Usage(format!(
                  "Topic '{name}' is relative to '{relative_topic}' but doesn't appear after it"
                )));
              }
              warn!("Relative topic '{relative_topic}' not found in stack, assuming it was merged");
              relative_topic = String::new();
            }
          }
          _ => {
            return Err(RevupError::Usage(format!(
              "Can't specify more than 1 relative topic per topic! Got {:?} for topic {name}",
              topic.tags.set(TAG_RELATIVE)
            )));
          }
        }
      }

      if cross_fork {
        if self.topics[&name].tags.count(TAG_RELATIVE_BRANCH) > 1 {
          return Err(RevupError::Usage("Can't use 'Relative-Branch' across forks due to github limitations!".to_string()));
        }
        if !relative_topic.is_empty() {
          warn!(
            "Skipping topic '{name}' since github does not allow relative reviews across forks. It \
             will be uploaded when '{relative_topic}' merges."
          );
          self.topics.shift_remove(&name);
          continue;
        }
      }

      // Snapshot of the relative topic, read before mutating the current one
      let mut relative_heads: HashMap<String, String> = HashMap::new();
      if !relative_topic.is_empty() {
        let relative = &self.topics[&relative_topic];
        let relative_branches = relative.tags.set(TAG_BRANCH);
        let relative_relative_branches = relative.tags.set(TAG_RELATIVE_BRANCH);
        let relative_uploaders = relative.tags.set(TAG_UPLOADER);
        for (branch, review) in &relative.reviews {
          relative_heads.insert(branch.clone(), review.remote_head.clone());
        }

        let topic = &mut self.topics[&name];
        topic.relative_topic = Some(relative_topic.clone());

        if topic.tags.count(TAG_BRANCH) == 0 {
          topic.tags.extend(TAG_BRANCH, relative_branches);
        } else if !topic.tags.set(TAG_BRANCH).is_subset(&relative_branches) {
          let extra: Vec<String> = topic.tags.set(TAG_BRANCH).difference(&relative_branches).cloned().collect();
          return Err(RevupError::Usage(format!(
            "Topic {name} has branches {extra:?} not in relative topic {relative_topic}"
          )));
        }

        if topic.tags.count(TAG_RELATIVE_BRANCH) == 0 {
          topic.tags.extend(TAG_RELATIVE_BRANCH, relative_relative_branches);
        } else if topic.tags.set(TAG_RELATIVE_BRANCH) != relative_relative_branches {
          return Err(RevupError::Usage(format!(
            "Topic {name} and relative topic {relative_topic} have differing relative branches, {:?} vs {:?}",
            topic.tags.set(TAG_RELATIVE_BRANCH),
            relative_relative_branches
          )));
        }

        if topic.tags.count(TAG_UPLOADER) > 0 && topic.tags.set(TAG_UPLOADER) != relative_uploaders {
          return Err(RevupError::Usage(format!(
            "Topic {name} has uploader {:?} while relative topic {relative_topic} has uploader {:?}",
            topic.tags.set(TAG_UPLOADER),
            relative_uploaders
          )));
        }
      } else {
        let base_branch = self.base_branch.clone();
        let relative_branch = self.relative_branch.clone();
        let topic = &mut self.topics[&name];
        // No relative topic specified, so the base ref is just the branch
        if topic.tags.count(TAG_BRANCH) == 0 {
          topic.tags.insert(TAG_BRANCH, base_branch);
          if topic.tags.count(TAG_RELATIVE_BRANCH) == 0 {
            // Only add the default relative branch when the review also uses
            // the default base branch; manually specifying the base branch
            // indicates the default relative branch isn't wanted.
            topic.tags.insert(TAG_RELATIVE_BRANCH, relative_branch);
          }
        }
      }

      {
        // Each topic can have at most 1 relative branch. With a relative
        // branch, only one base branch may be specified.
        let topic = &self.topics[&name];
        if topic.tags.count(TAG_RELATIVE_BRANCH) > 1 {
          return Err(RevupError::Usage(format!(
            "Can't specify more than 1 relative branch per topic! Got {:?} for topic {name}",
            topic.tags.set(TAG_RELATIVE_BRANCH)
          )));
        }
        if topic.tags.count(TAG_RELATIVE_BRANCH) == 1 && topic.tags.count(TAG_BRANCH) > 1 {
          return Err(RevupError::Usage(format!(
            "Can't specify more than one base branch when there is a relative branch! Got {:?} for topic {name}",
            topic.tags.set(TAG_BRANCH)
          )));
        }
      }

      let topic_uploader = self.topics[&name]
        .tags
        .first(TAG_UPLOADER)
        .map(String::from)
        .unwrap_or_else(|| options.uploader.clone());

      {
        let topic = &mut self.topics[&name];
        // A `foo: ...` or `[foo] ...` prefix on the first commit becomes a label
        if let Some(first_commit) = topic.original_commits.first()
          && let Some(label) = commit_prefix_label(&first_commit.commit_msg)
        {
          topic.tags.insert(TAG_LABEL, label);
        }

        if let Some(labels) = &options.labels {
          topic.tags.extend(TAG_LABEL, labels.split(',').map(|l| l.trim().to_lowercase()));
        }

        if !options.user_aliases.is_empty() {
          topic.tags.apply_user_aliases(&options.user_aliases);
        }
      }

      // Create one review per base branch
      let branches = self.topics[&name].tags.set(TAG_BRANCH);
      let mut child_links: Vec<(String, ReviewKey)> = Vec::new();
      for branch in branches {
        let topic = &self.topics[&name];
        let mut review = Review::new(name.clone(), branch.clone());

        review.relative_branch = topic.tags.first(TAG_RELATIVE_BRANCH).unwrap_or_default().to_string();
        // Don't track a relative branch that is the base branch itself
        if review.relative_branch == branch {
          review.relative_branch = String::new();
        }
        let relative_or_branch = if review.relative_branch.is_empty() {
          branch.clone()
        } else {
          review.relative_branch.clone()
        };
        let base_branch_name = self.git.remove_branch_prefix(&branch).to_string();

        if !relative_topic.is_empty() {
          review.remote_base = relative_heads
            .get(&branch)
            .cloned()
            .ok_or_else(|| RevupError::Other(anyhow!("Bug! relative topic {relative_topic} has no review for {branch}")))?;
          // base_ref stays empty until create_commits synthesizes the parent
          child_links.push((branch.clone(), (name.clone(), branch.clone())));
        } else {
          review.base_ref = Some(if relative_or_branch == self.relative_branch {
            self
              .commits
              .first()
              .ok_or_else(|| RevupError::Other(anyhow!("Bug! stack has no commits")))?
              .first_parent()?
              .to_string()
          } else {
            self.git.to_commit_hash(&relative_or_branch)?
          });
          review.remote_base = self.git.remove_branch_prefix(&relative_or_branch).to_string();
        }

        review.remote_head = format_remote_branch(&topic_uploader, &base_branch_name, &name, options.branch_format);
        review.is_draft = topic.tags.contains(TAG_LABEL, "draft");

        self.topics[&name].reviews.insert(branch, review);
      }

      for (branch, child_key) in child_links {
        if let Some(relative) = self.topics.get_mut(&relative_topic)
          && let Some(relative_review) = relative.reviews.get_mut(&branch)
        {
          relative_review.children.push(child_key);
        }
      }

      {
        let topic = &mut self.topics[&name];
        // Draft isn't a real label, it marks the PR as a draft
        topic.tags.remove_value(TAG_LABEL, "draft");

        if options.auto_add_users == "r2a" || options.auto_add_users == "both" {
          let reviewers = topic.tags.set(TAG_REVIEWER);
          topic.tags.extend(TAG_ASSIGNEE, reviewers);
        }
        if options.auto_add_users == "a2r" || options.auto_add_users == "both" {
          let assignees = topic.tags.set(TAG_ASSIGNEE);
          topic.tags.extend(TAG_REVIEWER, assignees);
        }
      }

      seen.push(name);
    }

    Ok(())
  }

  /// Number of reviews requiring some action (push / create / update).
  pub fn num_reviews_changed(&self) -> usize {
    let mut count = 0;
    for topic in self.topics.values() {
      for review in topic.reviews.values() {
        if matches!(review.status, PrStatus::NoChange | PrStatus::Merged) && review.push_status != crate::topic::PushStatus::Pushed {
          continue;
        }
        count += 1;
      }
    }
    count
  }
}
