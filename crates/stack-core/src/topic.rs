use crate::tags::Tags;
use git_ops::commit_header::CommitHeader;
use github_client::pr::{PrInfo, PrUpdate};
use indexmap::IndexMap;

/// The current state of each review within github.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrStatus {
  /// needs to be created, or was just created
  New,
  /// github data needs to be modified (title, reviewers, labels, etc)
  Updated,
  /// no github mutations are necessary
  #[default]
  NoChange,
  /// change has already merged (and no mutations are possible)
  Merged,
}

impl std::fmt::Display for PrStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let text = match self {
      PrStatus::New => "new",
      PrStatus::Updated => "updated",
      PrStatus::NoChange => "no change",
      PrStatus::Merged => "already merged",
    };
    write!(f, "{text}")
  }
}

/// The status of the git branch backing a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushStatus {
  /// commit hash for the branch changed and will or has been pushed
  #[default]
  Pushed,
  /// branch is not being pushed because it is a rebase
  Rebase,
  /// branch is not being pushed because it has not changed at all
  NoChange,
}

impl std::fmt::Display for PushStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let text = match self {
      PushStatus::Pushed => "pushed",
      PushStatus::Rebase => "rebase",
      PushStatus::NoChange => "no change",
    };
    write!(f, "{text}")
  }
}

/// Key of a review inside the stack: (topic name, prefixed base branch).
pub type ReviewKey = (String, String);

/// A single github pull request, uniquely keyed by topic name and base
/// branch.
#[derive(Debug, Clone, Default)]
pub struct Review {
  /// Name of the enclosing topic
  pub topic_name: String,
  /// Prefixed base branch this review targets
  pub base_branch: String,

  /// The local base ref that is the parent of all commits in new_commits
  pub base_ref: Option<String>,

  /// The commits actually used for the review, possibly created by
  /// cherry-picking. The last one is pushed to the remote head ref.
  pub new_commits: Vec<String>,

  /// Name for the remote head ref, derived from uploader/base/topic
  pub remote_head: String,

  /// Name for the remote base ref: a base branch, a relative branch, or
  /// another topic's head
  pub remote_base: String,

  /// Name of a relative branch if one applies
  pub relative_branch: String,

  /// Commits the remote currently has for this review
  pub remote_commits: Vec<CommitHeader>,

  /// Corresponding patch-id for each remote commit
  pub remote_patch_ids: Vec<String>,

  /// Existing PR details; None when no PR exists yet
  pub pr_info: Option<PrInfo>,

  /// Mutations accumulated for the next round trip
  pub pr_update: PrUpdate,

  pub status: PrStatus,

  /// Whether the review is a pure rebase of the remote changes
  pub is_pure_rebase: bool,

  pub push_status: PushStatus,

  /// Reviews that marked this one as relative, for graph rendering
  pub children: Vec<ReviewKey>,

  pub is_draft: bool,

  /// Comment slots matched for the maintained comments. An index at or past
  /// the queried comments identifies a new comment.
  pub review_graph_index: Option<usize>,
  pub patchsets_index: Option<usize>,
}

impl Review {
  pub fn new(topic_name: String, base_branch: String) -> Self {
    Self {
      topic_name,
      base_branch,
      ..Default::default()
    }
  }

  pub fn key(&self) -> ReviewKey {
    (self.topic_name.clone(), self.base_branch.clone())
  }
}

/// A named series of commits, possibly relative to another topic. A topic
/// owns one review per base branch it targets.
#[derive(Debug, Clone, Default)]
pub struct Topic {
  pub name: String,

  /// Name of the local topic this one is relative to. Always resolves to a
  /// topic that appears earlier in the stack.
  pub relative_topic: Option<String>,

  /// Original commits included in this topic, oldest first
  pub original_commits: Vec<CommitHeader>,

  /// Patch-id per original commit; empty until lazily computed
  pub patch_ids: Vec<String>,

  /// Union of all tags on commits in the topic
  pub tags: Tags,

  /// Reviews keyed by prefixed base branch, in creation order
  pub reviews: IndexMap<String, Review>,
}

impl Topic {
  pub fn new(name: String) -> Self {
    Self {
      name,
      ..Default::default()
    }
  }
}
