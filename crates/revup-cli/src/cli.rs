use clap::{Args, Parser, Subcommand};

/// Resolve a negatable boolean flag against the config file and the
/// built-in default. The `--no-` form always wins when given last.
pub fn resolve_flag(set: bool, unset: bool, config_value: Option<bool>, default: bool) -> bool {
  if set {
    true
  } else if unset {
    false
  } else {
    config_value.unwrap_or(default)
  }
}

/// Stacked pull request tool for git and GitHub.
///
/// Commits on a single branch are annotated with tags like `Topic:` and
/// `Relative:`; revup derives a dependent chain of pull requests from them
/// and keeps the chain synchronized with the local history.
#[derive(Debug, Parser)]
#[command(name = "revup", version, propagate_version = true)]
pub struct Cli {
  /// Proxy URL for GitHub requests
  #[arg(long, global = true)]
  pub proxy: Option<String>,

  /// GitHub OAuth token; falls back to $GITHUB_TOKEN, then the git
  /// credential helper
  #[arg(long, global = true)]
  pub github_oauth: Option<String>,

  #[arg(long, global = true)]
  pub github_username: Option<String>,

  /// GitHub host, for enterprise installs
  #[arg(long, global = true)]
  pub github_url: Option<String>,

  /// Remote the pull requests live on
  #[arg(long, global = true)]
  pub remote_name: Option<String>,

  /// Remote to push review heads to, when different from remote-name
  #[arg(long, global = true)]
  pub fork_name: Option<String>,

  /// Editor override for message rewrites
  #[arg(long, global = true)]
  pub editor: Option<String>,

  #[arg(long, short = 'v', global = true)]
  pub verbose: bool,

  /// Keep temporary files in .revup/ for debugging
  #[arg(long, short = 'k', global = true, overrides_with = "no_keep_temp")]
  pub keep_temp: bool,
  #[arg(long, global = true, hide = true)]
  pub no_keep_temp: bool,

  /// Path to the git binary
  #[arg(long, global = true)]
  pub git_path: Option<String>,

  /// Branch that reviews ultimately land on
  #[arg(long, global = true)]
  pub main_branch: Option<String>,

  /// Newline separated globs naming additional base branches
  #[arg(long, global = true)]
  pub base_branch_globs: Option<String>,

  #[command(subcommand)]
  pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Push topics in the local stack as pull requests
  Upload(UploadArgs),
  /// Regroup each topic's commits into a contiguous block
  Restack(RestackArgs),
  /// Rewrite one commit in the stack, leaving the worktree untouched
  Amend(AmendArgs),
  /// Insert a new commit into the stack; same as `amend --insert`
  Commit(AmendArgs),
  /// Squash a remote branch into one commit and apply it here
  CherryPick(CherryPickArgs),
  /// Read or write persistent flag defaults
  Config(ConfigArgs),
  /// Expose individual primitives for scripting
  #[command(subcommand)]
  Toolkit(ToolkitCommands),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
  /// Restrict the upload to these topics and their relatives
  pub topics: Vec<String>,

  #[arg(long, short = 'b')]
  pub base_branch: Option<String>,

  #[arg(long, short = 'e')]
  pub relative_branch: Option<String>,

  /// Push reviews that are pure rebases instead of skipping them
  #[arg(long, short = 'r', overrides_with = "no_rebase")]
  pub rebase: bool,
  #[arg(long, hide = true)]
  pub no_rebase: bool,

  /// Don't stop for confirmation before pushing
  #[arg(long, short = 's', overrides_with = "no_skip_confirm")]
  pub skip_confirm: bool,
  #[arg(long, hide = true)]
  pub no_skip_confirm: bool,

  /// Show what would happen without pushing or mutating PRs
  #[arg(long, short = 'd', overrides_with = "no_dry_run")]
  pub dry_run: bool,
  #[arg(long, hide = true)]
  pub no_dry_run: bool,

  /// Push refs but skip all PR creation and updates
  #[arg(long, overrides_with = "no_push_only")]
  pub push_only: bool,
  #[arg(long, hide = true)]
  pub no_push_only: bool,

  /// Print review status and exit
  #[arg(long, short = 't', overrides_with = "no_status")]
  pub status: bool,
  #[arg(long, hide = true)]
  pub no_status: bool,

  /// Keep PR titles and bodies in sync with the local commit messages
  #[arg(long, overrides_with = "no_update_pr_body")]
  pub update_pr_body: bool,
  #[arg(long, hide = true)]
  pub no_update_pr_body: bool,

  /// Also write each pushed head to a local ref of the same name
  #[arg(long, overrides_with = "no_create_local_branches")]
  pub create_local_branches: bool,
  #[arg(long, hide = true)]
  pub no_create_local_branches: bool,

  /// Maintain the review-graph comment on each PR
  #[arg(long, overrides_with = "no_review_graph")]
  pub review_graph: bool,
  #[arg(long, hide = true)]
  pub no_review_graph: bool,

  /// Strip recognized tag lines from the uploaded commit messages
  #[arg(long, overrides_with = "no_trim_tags")]
  pub trim_tags: bool,
  #[arg(long, hide = true)]
  pub no_trim_tags: bool,

  /// Maintain the patchsets history comment on each PR
  #[arg(long, overrides_with = "no_patchsets")]
  pub patchsets: bool,
  #[arg(long, hide = true)]
  pub no_patchsets: bool,

  /// Only upload topics with commits authored by the configured user
  #[arg(long, overrides_with = "no_self_authored_only")]
  pub self_authored_only: bool,
  #[arg(long, hide = true)]
  pub no_self_authored_only: bool,

  /// Extra labels for every uploaded review, comma separated
  #[arg(long)]
  pub labels: Option<String>,

  /// Mirror reviewers and assignees onto each other
  #[arg(long, value_parser = ["no", "a2r", "r2a", "both"])]
  pub auto_add_users: Option<String>,

  /// Comma separated alias:username rewrites for reviewers/assignees
  #[arg(long)]
  pub user_aliases: Option<String>,

  /// Name used in remote branch names; defaults to the git email's user
  #[arg(long)]
  pub uploader: Option<String>,

  /// Naming scheme for remote head refs
  #[arg(long, value_parser = ["user+branch", "user", "branch", "none"])]
  pub branch_format: Option<String>,

  /// Shell command to run after conflict checks, before pushing
  #[arg(long, short = 'p')]
  pub pre_upload: Option<String>,

  /// Treat each topic as relative to the previous one
  #[arg(long, short = 'c', overrides_with = "no_relative_chain")]
  pub relative_chain: bool,
  #[arg(long, hide = true)]
  pub no_relative_chain: bool,

  /// Derive topic names for untagged commits from their titles
  #[arg(long, short = 'a', overrides_with = "no_auto_topic")]
  pub auto_topic: bool,
  #[arg(long, hide = true)]
  pub no_auto_topic: bool,

  /// Tip of the stack to upload
  #[arg(long, default_value = "HEAD")]
  pub head: String,
}

#[derive(Debug, Args)]
pub struct RestackArgs {
  #[arg(long, short = 'b')]
  pub base_branch: Option<String>,

  #[arg(long, short = 'e')]
  pub relative_branch: Option<String>,

  /// Order commits without a topic after all topics instead of before
  #[arg(long, short = 't', overrides_with = "no_topicless_last")]
  pub topicless_last: bool,
  #[arg(long, hide = true)]
  pub no_topicless_last: bool,
}

#[derive(Debug, Args)]
pub struct AmendArgs {
  /// Commit hash, HEAD-relative ref, or topic name to amend
  pub ref_or_topic: Option<String>,

  #[arg(long, short = 'b')]
  pub base_branch: Option<String>,

  #[arg(long, short = 'e')]
  pub relative_branch: Option<String>,

  /// Open the editor to reword the commit
  #[arg(long, short = 's', overrides_with = "no_edit")]
  pub edit: bool,
  #[arg(long, hide = true)]
  pub no_edit: bool,

  /// Insert a new commit after the named one instead of amending it
  #[arg(long, short = 'i', overrides_with = "no_insert")]
  pub insert: bool,
  #[arg(long, hide = true)]
  pub no_insert: bool,

  /// Remove the named commit entirely
  #[arg(long, short = 'd', overrides_with = "no_drop")]
  pub drop: bool,
  #[arg(long, hide = true)]
  pub no_drop: bool,

  /// Stage unstaged changes first
  #[arg(long, short = 'a', overrides_with = "no_all")]
  pub all: bool,
  #[arg(long, hide = true)]
  pub no_all: bool,

  /// Allow naming the target by topic
  #[arg(long, overrides_with = "no_parse_topics")]
  pub parse_topics: bool,
  #[arg(long, hide = true)]
  pub no_parse_topics: bool,

  /// Allow naming the target by ref
  #[arg(long, overrides_with = "no_parse_refs")]
  pub parse_refs: bool,
  #[arg(long, hide = true)]
  pub no_parse_refs: bool,
}

#[derive(Debug, Args)]
pub struct CherryPickArgs {
  /// Branch whose changes should be squashed and applied
  pub branch: String,

  #[arg(long, short = 'b')]
  pub base_branch: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
  /// Flag to read or write, as `<command>.<flag>` or a bare global name
  pub flag: String,

  /// New value; omit together with --delete to read
  pub value: Option<String>,

  /// Operate on the repo-local config instead of the user-global one
  #[arg(long, short = 'r')]
  pub repo: bool,

  /// Remove the flag from the config
  #[arg(long, short = 'd')]
  pub delete: bool,
}

#[derive(Debug, Subcommand)]
pub enum ToolkitCommands {
  /// Detect the base branch of the current branch
  DetectBranch {
    /// Show all candidates, not just the best one
    #[arg(long, short = 's')]
    show_all: bool,
    /// Don't limit to configured base branches
    #[arg(long, short = 'n')]
    no_limit: bool,
  },
  /// Cherry pick a commit onto a new parent without touching the worktree
  CherryPick {
    /// Commit to cherry-pick
    #[arg(long, short = 'c')]
    commit: String,
    /// Parent commit
    #[arg(long, short = 'p')]
    parent: String,
  },
  /// Make a virtual diff target from the given commits
  DiffTarget {
    #[arg(long = "old-head")]
    old_head: String,
    /// Old base commit (parent of old head by default)
    #[arg(long = "old-base")]
    old_base: Option<String>,
    #[arg(long = "new-head")]
    new_head: String,
    /// New base commit (parent of new head by default)
    #[arg(long = "new-base")]
    new_base: Option<String>,
    #[arg(long, short = 'p')]
    parent: Option<String>,
  },
  /// Find the first-parent divergence point of two branches
  ForkPoint {
    #[arg(num_args = 2)]
    branches: Vec<String>,
  },
  /// Find the nearest base branch to the given commit
  ClosestBranch {
    branch: String,
    /// Allow the branch itself to be a valid "closest"
    #[arg(long)]
    allow_self: bool,
  },
  /// List all topics and their commits
  ListTopics {
    #[arg(long, short = 'b')]
    base_branch: Option<String>,
    #[arg(long, short = 'e')]
    relative_branch: Option<String>,
    /// Print the commit ids within each topic
    #[arg(long, short = 'c', conflicts_with = "titles")]
    commit_ids: bool,
    /// Print the commit titles within each topic
    #[arg(long, short = 't')]
    titles: bool,
  },
}
