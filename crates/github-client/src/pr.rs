use std::collections::BTreeSet;

/// How many PR comments the batched query fetches per PR; the maintained
/// comments are matched within this window.
pub const MAX_COMMENTS_TO_QUERY: usize = 3;

/// Owner and name of a repository on the review platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
  pub owner: String,
  pub name: String,
}

/// One PR comment, by body text and node id. A missing id means the comment
/// does not exist yet and should be added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrComment {
  pub text: String,
  pub id: Option<String>,
}

impl PrComment {
  pub fn new(text: String, id: Option<String>) -> Self {
    Self { text, id }
  }
}

/// Snapshot of a pull request as it exists on the remote. Also used to seed
/// the in-memory record for freshly created PRs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrInfo {
  pub base_ref: String,
  pub head_ref: String,
  /// Reconstructed as the first parent of the oldest commit on the PR; the
  /// API's own baseRefOid field reports the current tip of the base branch,
  /// which may not even exist locally.
  pub base_ref_oid: String,
  pub head_ref_oid: String,
  pub body: String,
  pub title: String,
  pub id: String,
  pub url: String,
  pub state: String,
  pub reviewers: BTreeSet<String>,
  pub reviewer_ids: BTreeSet<String>,
  pub assignees: BTreeSet<String>,
  pub assignee_ids: BTreeSet<String>,
  pub labels: BTreeSet<String>,
  pub label_ids: BTreeSet<String>,
  pub is_draft: bool,
  pub comments: Vec<PrComment>,
}

/// Accumulator of mutations for one PR; only fields that differ from the
/// remote get set, so an empty update produces no GraphQL node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrUpdate {
  pub id: String,
  pub base_ref: Option<String>,
  pub body: Option<String>,
  pub title: Option<String>,
  pub reviewer_ids: BTreeSet<String>,
  pub assignee_ids: BTreeSet<String>,
  pub label_ids: BTreeSet<String>,
  pub is_draft: Option<bool>,
  pub comments: Vec<PrComment>,
}

impl PrUpdate {
  /// Whether any mutation needs to go over the wire for this PR.
  pub fn has_changes(&self) -> bool {
    self.base_ref.is_some()
      || self.body.is_some()
      || self.title.is_some()
      || !self.reviewer_ids.is_empty()
      || !self.assignee_ids.is_empty()
      || !self.label_ids.is_empty()
      || self.is_draft.is_some()
      || !self.comments.is_empty()
  }
}
