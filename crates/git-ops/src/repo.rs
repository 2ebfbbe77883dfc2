use crate::cache::QueryCaches;
use crate::commit_header::{CommitHeader, COMMIT_LOG_FORMAT, parse_rev_list};
use crate::error::{GitError, GitResult};
use anyhow::{Result, anyhow};
use git_executor::git_command_executor::GitCommandExecutor;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, instrument};

pub const COMMON_MAIN_BRANCHES: [&str; 2] = ["main", "master"];

const GIT_DIFF_ARGS: [&str; 6] = ["--no-pager", "diff", "--full-index", "--no-color", "--no-textconv", "-U1"];

/// Owner and name of the repository a remote points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepoInfo {
  pub owner: String,
  pub name: String,
}

/// Selection flags for `rev_list`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RevListFlags {
  pub first_parent: bool,
  pub exclude_first_parent: bool,
  pub max_revs: usize,
}

/// Scratch space for temporary index files. Either OS managed (cleaned on
/// drop) or a stable `.revup` directory next to the work tree for debugging.
enum ScratchDir {
  Temp(TempDir),
  Keep(PathBuf),
}

impl ScratchDir {
  fn path(&self) -> &Path {
    match self {
      ScratchDir::Temp(dir) => dir.path(),
      ScratchDir::Keep(path) => path,
    }
  }
}

/// Construction options for [`GitRepo`].
#[derive(Debug, Clone, Default)]
pub struct GitRepoOptions {
  pub remote_name: String,
  pub main_branch: String,
  /// Newline separated globs naming possible base branches
  pub base_branch_globs: Vec<String>,
  /// Keep temporary files in `<repo>/.revup` instead of an OS temp dir
  pub keep_temp: bool,
  /// Editor override; empty falls back to core.editor / $GIT_EDITOR / $EDITOR
  pub editor: String,
}

/// Repository context for tree-level operations. All methods leave the
/// working tree and the user's index untouched; durable writes go to the
/// object store only.
#[derive(Clone)]
pub struct GitRepo {
  exec: GitCommandExecutor,
  pub repo_root: String,
  pub git_dir: String,
  pub remote_name: String,
  pub main_branch: String,
  pub base_branch_globs: Vec<String>,
  /// Configured user email, lowercased
  pub email: String,
  /// Local part of the email, used as the default uploader name
  pub author: String,
  pub editor: String,
  scratch: Arc<ScratchDir>,
  caches: QueryCaches,
}

impl GitRepo {
  /// Resolve repository layout and user identity starting from `cwd`,
  /// falling back between main/master when the configured main branch does
  /// not exist on the remote.
  #[instrument(skip(exec, options))]
  pub fn discover(exec: GitCommandExecutor, cwd: &str, options: GitRepoOptions) -> GitResult<Self> {
    let repo_root = exec.execute_command(&["rev-parse", "--show-toplevel"], cwd)?;
    let git_dir = exec.execute_command(&["rev-parse", "--path-format=absolute", "--git-dir"], &repo_root)?;

    let (email, code) = exec.execute_command_with_status(&["config", "user.email"], &repo_root)?;
    if code != 0 || email.is_empty() {
      return Err(GitError::Other(anyhow!(
        "Couldn't get git email, set it with `git config --global user.email`"
      )));
    }
    let email = email.to_lowercase();
    let author = email.split('@').next().unwrap_or_default().to_string();

    let editor = if !options.editor.is_empty() {
      options.editor.clone()
    } else {
      let (configured, code) = exec.execute_command_with_status(&["config", "core.editor"], &repo_root)?;
      if code == 0 && !configured.is_empty() {
        configured
      } else {
        std::env::var("GIT_EDITOR")
          .or_else(|_| std::env::var("EDITOR"))
          .unwrap_or_else(|_| String::from("nano"))
      }
    };

    let scratch = if options.keep_temp {
      let dir = PathBuf::from(&repo_root).join(".revup");
      std::fs::create_dir_all(&dir).map_err(|e| anyhow!("Failed to create scratch dir: {e}"))?;
      ScratchDir::Keep(dir)
    } else {
      ScratchDir::Temp(TempDir::with_prefix("revup_").map_err(|e| anyhow!("Failed to create scratch dir: {e}"))?)
    };

    let mut repo = Self {
      exec,
      repo_root,
      git_dir,
      remote_name: options.remote_name,
      main_branch: options.main_branch,
      base_branch_globs: options.base_branch_globs,
      email,
      author,
      editor,
      scratch: Arc::new(scratch),
      caches: QueryCaches::new(),
    };

    let remote_main = format!("{}/{}", repo.remote_name, repo.main_branch);
    if !repo.is_branch_or_commit(&remote_main)?
      && let Some(position) = COMMON_MAIN_BRANCHES.iter().position(|b| *b == repo.main_branch)
    {
      repo.main_branch = COMMON_MAIN_BRANCHES[1 - position].to_string();
      info!(
        "Branch {} not found, falling back to \"{}\". We recommend you set this in .revupconfig",
        COMMON_MAIN_BRANCHES[position], repo.main_branch
      );
    }

    Ok(repo)
  }

  pub fn executor(&self) -> &GitCommandExecutor {
    &self.exec
  }

  /// Directory for temporary index files, valid for this invocation.
  pub fn scratch_dir(&self) -> &Path {
    self.scratch.path()
  }

  /// Drop memoized query results. Must be called after HEAD moves.
  pub fn clear_cache(&self) {
    self.caches.clear();
  }

  pub fn git(&self, args: &[&str]) -> GitResult<String> {
    Ok(self.exec.execute_command(args, &self.repo_root)?)
  }

  pub fn git_raw(&self, args: &[&str]) -> GitResult<String> {
    Ok(self.exec.execute_command_raw(args, &self.repo_root)?)
  }

  pub fn git_with_status(&self, args: &[&str]) -> GitResult<(String, i32)> {
    Ok(self.exec.execute_command_with_status(args, &self.repo_root)?)
  }

  pub fn git_with_env(&self, args: &[&str], env: &[(&str, &str)]) -> GitResult<String> {
    Ok(self.exec.execute_command_with_env(args, &self.repo_root, env)?)
  }

  /// Whether the given object resolves to anything.
  #[instrument(skip(self))]
  pub fn is_branch_or_commit(&self, obj: &str) -> GitResult<bool> {
    if let Some(hit) = self.caches.ref_exists.get(obj) {
      return Ok(*hit);
    }
    let (_, code) = self.git_with_status(&["rev-parse", "--verify", "--quiet", obj])?;
    let exists = code == 0;
    self.caches.ref_exists.insert(obj.to_string(), exists);
    Ok(exists)
  }

  pub fn verify_branch_or_commit(&self, obj: &str) -> GitResult<()> {
    if self.is_branch_or_commit(obj)? {
      Ok(())
    } else {
      Err(GitError::InvalidRef(obj.to_string()))
    }
  }

  /// Resolve a ref to a full commit hash, failing with InvalidRef.
  #[instrument(skip(self))]
  pub fn to_commit_hash(&self, reference: &str) -> GitResult<String> {
    if let Some(hit) = self.caches.commit_hashes.get(reference) {
      return Ok(hit.clone());
    }
    let probe = format!("{reference}^{{commit}}");
    let (stdout, code) = self.git_with_status(&["rev-parse", "--verify", "--quiet", probe.as_str()])?;
    if code != 0 {
      return Err(GitError::InvalidRef(reference.to_string()));
    }
    self.caches.commit_hashes.insert(reference.to_string(), stdout.clone());
    Ok(stdout)
  }

  /// Whether a commit object is present locally. Remote heads can be absent
  /// after a gc or on a fresh machine.
  pub fn commit_exists(&self, obj: &str) -> GitResult<bool> {
    let key = format!("commit\u{0}{obj}");
    if let Some(hit) = self.caches.ref_exists.get(&key) {
      return Ok(*hit);
    }
    let probe = format!("{obj}^{{commit}}");
    let (_, code) = self.git_with_status(&["rev-parse", "--verify", "--quiet", probe.as_str()])?;
    let exists = code == 0;
    self.caches.ref_exists.insert(key, exists);
    Ok(exists)
  }

  /// Tree hash of a commit-ish.
  pub fn tree_hash(&self, reference: &str) -> GitResult<String> {
    if let Some(hit) = self.caches.tree_hashes.get(reference) {
      return Ok(hit.clone());
    }
    let probe = format!("{reference}^{{tree}}");
    let tree = self.git(&["rev-parse", probe.as_str()])?;
    self.caches.tree_hashes.insert(reference.to_string(), tree.clone());
    Ok(tree)
  }

  /// Whether two commit-ish have the same trees, which indicates they have
  /// no diff between them.
  pub fn have_identical_trees(&self, ref1: &str, ref2: &str) -> GitResult<bool> {
    let key = QueryCaches::pair_key(ref1, ref2);
    if let Some(hit) = self.caches.identical_trees.get(&key) {
      return Ok(*hit);
    }
    let identical = self.tree_hash(ref1)? == self.tree_hash(ref2)?;
    self.caches.identical_trees.insert(key, identical);
    Ok(identical)
  }

  /// The commit at which `reference` first diverged from `base_ref`,
  /// considering only first-parent history on both sides. If `reference`
  /// introduces no first-parent-exclusive commits the fork point is
  /// `reference` itself.
  #[instrument(skip(self))]
  pub fn fork_point(&self, reference: &str, base_ref: &str) -> GitResult<String> {
    let key = QueryCaches::pair_key(reference, base_ref);
    if let Some(hit) = self.caches.fork_points.get(&key) {
      return Ok(hit.clone());
    }
    let exclude = format!("^{base_ref}");
    let lines = self
      .exec
      .execute_command_lines(
        &["rev-list", "--first-parent", "--exclude-first-parent-only", reference, exclude.as_str(), "--reverse"],
        &self.repo_root,
      )?;

    let fork = match lines.first() {
      None => self.to_commit_hash(reference)?,
      Some(oldest_exclusive) => self.to_commit_hash(&format!("{oldest_exclusive}~"))?,
    };
    self.caches.fork_points.insert(key, fork.clone());
    Ok(fork)
  }

  /// Number of first-parent-exclusive commits between `reference` and its
  /// fork point with `base_ref`, optionally capped: with a cap the result is
  /// min(count, cap + 1) so callers can distinguish "over the cap".
  #[instrument(skip(self))]
  pub fn distance_to_fork_point(&self, reference: &str, base_ref: &str, max_n: usize) -> GitResult<usize> {
    let key = format!("{reference}\u{0}{base_ref}\u{0}{max_n}");
    if let Some(hit) = self.caches.fork_distances.get(&key) {
      return Ok(*hit);
    }
    let exclude = format!("^{base_ref}");
    let mut args = vec!["rev-list", "--first-parent", "--exclude-first-parent-only", reference, exclude.as_str(), "--count"];
    let capped;
    if max_n > 0 {
      capped = format!("{}", max_n + 1);
      args.push("-n");
      args.push(capped.as_str());
    }
    let count = self
      .git(&args)?
      .parse::<usize>()
      .map_err(|e| anyhow!("Unexpected rev-list --count output: {e}"))?;
    self.caches.fork_distances.insert(key, count);
    Ok(count)
  }

  /// Whether `reference` is a first parent ancestor of `ancestor`. Differs
  /// from `merge-base --is-ancestor`, which also follows merge parents.
  pub fn is_ancestor(&self, reference: &str, ancestor: &str) -> GitResult<bool> {
    if reference == ancestor {
      return Ok(true);
    }
    Ok(self.distance_to_fork_point(reference, ancestor, 1)? == 0)
  }

  /// Ensure the branch is prefixed with the remote name.
  pub fn ensure_branch_prefix(&self, branch: &str) -> String {
    if branch.starts_with(&format!("{}/", self.remote_name)) {
      branch.to_string()
    } else {
      format!("{}/{branch}", self.remote_name)
    }
  }

  /// Ensure the branch is not prefixed with the remote name.
  pub fn remove_branch_prefix<'a>(&self, branch: &'a str) -> &'a str {
    branch.strip_prefix(&format!("{}/", self.remote_name)).unwrap_or(branch)
  }

  /// Candidate base branches for the given commit, from remote-tracking
  /// refs. `limit_to_base_branches` filters by the configured globs plus the
  /// main branch; `prune_old` keeps only branches containing the fork point
  /// with main.
  #[instrument(skip(self))]
  pub fn find_remote_branches(&self, commit: &str, limit_to_base_branches: bool, prune_old: bool) -> GitResult<Vec<String>> {
    let mut args: Vec<String> = vec!["for-each-ref".into(), "--format".into(), "%(refname)".into()];

    if limit_to_base_branches {
      if self.base_branch_globs.is_empty() {
        return Ok(vec![format!("{}/{}", self.remote_name, self.main_branch)]);
      }
      args.push(format!("refs/remotes/{}/{}", self.remote_name, self.main_branch));
      for glob in &self.base_branch_globs {
        args.push(format!("refs/remotes/{}/{glob}", self.remote_name));
      }
    } else {
      args.push(format!("refs/remotes/{}/{}", self.remote_name, self.main_branch));
      args.push(format!("refs/remotes/{}/*", self.remote_name));
    }

    if prune_old {
      let fork_with_main = self.fork_point(commit, &format!("{}/{}", self.remote_name, self.main_branch))?;
      args.push("--contains".into());
      args.push(fork_with_main);
    }

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let mut branches = Vec::new();
    for line in self.exec.execute_command_lines(&arg_refs, &self.repo_root)? {
      if let Some(branch) = line.strip_prefix("refs/remotes/") {
        branches.push(branch.to_string());
      }
    }
    Ok(branches)
  }

  /// All candidates tied for the shortest first-parent distance to the
  /// commit. The running minimum caps each subsequent distance query.
  #[instrument(skip(self))]
  pub fn get_best_base_branch_candidates(&self, commit: &str, limit_to_base_branches: bool, allow_self: bool) -> GitResult<Vec<String>> {
    let branches = self.find_remote_branches(commit, limit_to_base_branches, true)?;
    if branches.len() == 1 {
      return Ok(branches);
    }

    let mut best_distance = 0usize;
    let mut candidates: Vec<String> = Vec::new();
    for branch in branches {
      if !allow_self && branch == commit {
        continue;
      }
      let cap = if candidates.is_empty() { 0 } else { best_distance };
      let distance = self.distance_to_fork_point(commit, &branch, cap)?;
      if candidates.is_empty() || distance < best_distance {
        best_distance = distance;
        candidates = vec![branch];
      } else if distance == best_distance {
        candidates.push(branch);
      }
    }
    Ok(candidates)
  }

  /// Pick one base branch: prefer the current branch, then the main branch,
  /// then the lexicographic maximum, so the result is deterministic and
  /// stable under branch renames.
  pub fn get_best_base_branch(&self, commit: &str, limit_to_base_branches: bool, allow_self: bool) -> GitResult<String> {
    let candidates = self.get_best_base_branch_candidates(commit, limit_to_base_branches, allow_self)?;
    let mut best = candidates
      .first()
      .cloned()
      .ok_or_else(|| anyhow!("No candidate base branches found for {commit}"))?;
    if candidates.len() == 1 {
      return Ok(best);
    }

    let current_branch = self.git(&["branch", "--show-current"])?;
    for candidate in &candidates {
      if *candidate == format!("{}/{current_branch}", self.remote_name) || *candidate == format!("{}/{}", self.remote_name, self.main_branch) {
        best = candidate.clone();
        break;
      } else if *candidate > best {
        best = candidate.clone();
      }
    }
    Ok(best)
  }

  /// Raw formatted commit stream between two refs; `parse_rev_list` turns it
  /// into headers. Oldest first.
  #[instrument(skip(self))]
  pub fn rev_list(&self, include: &str, exclude: Option<&str>, flags: RevListFlags) -> GitResult<String> {
    let format = format!("--pretty=format:{COMMIT_LOG_FORMAT}");
    let mut args = vec!["--no-pager", "log", "--reverse", "--date=raw", format.as_str(), include];
    let max;
    if flags.max_revs > 0 {
      max = format!("{}", flags.max_revs);
      args.push("-n");
      args.push(max.as_str());
    }
    if flags.first_parent {
      args.push("--first-parent");
    }
    if flags.exclude_first_parent {
      args.push("--exclude-first-parent-only");
    }
    if let Some(exclude) = exclude {
      args.push("--not");
      args.push(exclude);
    }
    self.git_raw(&args)
  }

  /// Parsed commit headers between two refs, oldest first.
  pub fn commit_headers(&self, include: &str, exclude: Option<&str>, flags: RevListFlags) -> GitResult<Vec<CommitHeader>> {
    Ok(parse_rev_list(&self.rev_list(include, exclude, flags)?)?)
  }

  /// A patch-id that identifies this commit's diff while ignoring context
  /// and metadata. Empty diffs produce the empty string, which matches
  /// other empty diffs.
  #[instrument(skip(self))]
  pub fn get_patch_id(&self, commit: &str) -> GitResult<String> {
    let parent = format!("{commit}~");
    let mut diff_args: Vec<&str> = GIT_DIFF_ARGS.to_vec();
    diff_args.push(&parent);
    diff_args.push(commit);
    let diff = self.git_raw(&diff_args)?;

    let output = self.exec.execute_command_with_input(&["patch-id", "--stable"], &self.repo_root, &diff)?;
    Ok(output.split_whitespace().next().unwrap_or_default().to_string())
  }

  /// Files/lines changed summary of a diff.
  pub fn get_diff_summary(&self, parent: &str, commit: &str) -> GitResult<String> {
    self.git(&["diff", "--shortstat", parent, commit])
  }

  /// Write a commit object for the header. Empty identity fields are
  /// omitted from the environment so git inherits the configured user.
  #[instrument(skip(self, commit_info), fields(tree = %commit_info.tree))]
  pub fn commit_tree(&self, commit_info: &CommitHeader) -> GitResult<String> {
    let mut args = vec!["commit-tree", commit_info.tree.as_str(), "-m", commit_info.commit_msg.as_str()];
    for parent in &commit_info.parents {
      args.push("-p");
      args.push(parent);
    }

    let env_pairs = [
      ("GIT_AUTHOR_NAME", commit_info.author_name.as_str()),
      ("GIT_AUTHOR_EMAIL", commit_info.author_email.as_str()),
      ("GIT_AUTHOR_DATE", commit_info.author_date.as_str()),
      ("GIT_COMMITTER_NAME", commit_info.committer_name.as_str()),
      ("GIT_COMMITTER_EMAIL", commit_info.committer_email.as_str()),
      ("GIT_COMMITTER_DATE", commit_info.committer_date.as_str()),
    ];
    let env: Vec<(&str, &str)> = env_pairs.into_iter().filter(|(_, v)| !v.is_empty()).collect();

    self.git_with_env(&args, &env)
  }

  /// `reset --soft` to the new chain head, leaving the working tree and
  /// index alone, then invalidate caches since HEAD moved.
  pub fn soft_reset(&self, new_commit: &str, reflog_action: &str) -> GitResult<()> {
    self.git_with_env(&["reset", "--soft", new_commit], &[("GIT_REFLOG_ACTION", reflog_action)])?;
    self.clear_cache();
    Ok(())
  }

  /// Whether the index has changes relative to HEAD.
  pub fn has_staged_changes(&self) -> GitResult<bool> {
    let (_, code) = self.git_with_status(&["diff", "--cached", "--quiet"])?;
    Ok(code != 0)
  }

  /// Whether the working tree has changes relative to the index.
  pub fn has_unstaged_changes(&self) -> GitResult<bool> {
    let (_, code) = self.git_with_status(&["diff", "--quiet"])?;
    Ok(code != 0)
  }

  pub fn add_update(&self) -> GitResult<()> {
    self.git(&["add", "--update"]).map(|_| ())
  }

  /// Write the current index as a tree object.
  pub fn write_index_tree(&self) -> GitResult<String> {
    self.git(&["write-tree"])
  }

  pub fn cached_diff_stat(&self) -> GitResult<String> {
    self.git(&["--no-pager", "diff", "--cached", "--stat", "--no-color"])
  }

  pub fn diff_stat(&self, parent: &str, commit: &str) -> GitResult<String> {
    self.git(&["--no-pager", "diff", parent, commit, "--stat", "--no-color"])
  }

  /// Fetch commit objects that exist on the remote but not locally, in one
  /// batched call that does not write FETCH_HEAD.
  #[instrument(skip(self, oids))]
  pub fn fetch_objects(&self, oids: &[String], quiet: bool) -> GitResult<()> {
    if oids.is_empty() {
      return Ok(());
    }
    let mut args = vec!["fetch", "--no-write-fetch-head", "--no-auto-maintenance", if quiet { "--quiet" } else { "--verbose" }];
    args.push(&self.remote_name);
    for oid in oids {
      args.push(oid);
    }
    self.git(&args).map(|_| ())
  }

  /// Fetch a branch into its remote-tracking ref.
  pub fn fetch_branch(&self, branch: &str, quiet: bool) -> GitResult<()> {
    let refspec = format!("{branch}:remotes/{}/{branch}", self.remote_name);
    let args = [
      "fetch",
      "--no-write-fetch-head",
      "--no-auto-maintenance",
      if quiet { "--quiet" } else { "--verbose" },
      "--force",
      self.remote_name.as_str(),
      refspec.as_str(),
    ];
    self.git(&args).map(|_| ())
  }

  /// Push all refspecs in one atomic call: either every head becomes
  /// visible on the remote or none does.
  #[instrument(skip(self, refspecs), fields(refs = refspecs.len()))]
  pub fn push_refs(&self, refspecs: &[String], quiet: bool) -> GitResult<()> {
    if refspecs.is_empty() {
      return Ok(());
    }
    let mut args = vec!["push", "--force", "--no-verify", "--atomic", if quiet { "--quiet" } else { "--verbose" }];
    args.push(&self.remote_name);
    for refspec in refspecs {
      args.push(refspec);
    }
    self.git(&args).map(|_| ())
  }

  pub fn update_local_ref(&self, name: &str, commit: &str) -> GitResult<()> {
    self.git(&["update-ref", "-m", "revup: update local branch", name, commit]).map(|_| ())
  }

  /// Content of a path inside a tree object.
  pub fn show_tree_file(&self, tree: &str, path: &str) -> GitResult<String> {
    let spec = format!("{tree}:{path}");
    self.git_raw(&["show", spec.as_str()])
  }

  /// Owner/name of the repository a remote's URL points at, handling both
  /// ssh and https remotes.
  #[instrument(skip(self))]
  pub fn github_repo_info(&self, github_url: &str, remote_name: &str) -> GitResult<Option<GitHubRepoInfo>> {
    let (url, code) = self.git_with_status(&["remote", "get-url", remote_name])?;
    if code != 0 {
      return Ok(None);
    }

    let host = regex::escape(github_url);
    let ssh_pattern = Regex::new(&format!(r"^[^@]+@{host}:([^/]+)/([^.]+)(?:\.git)?$")).map_err(|e| anyhow!(e))?;
    let https_pattern = Regex::new(&format!(r"{host}/([^/]+)/([^.]+)")).map_err(|e| anyhow!(e))?;

    let info = ssh_pattern
      .captures(&url)
      .or_else(|| https_pattern.captures(&url))
      .map(|caps| GitHubRepoInfo {
        owner: caps[1].to_string(),
        name: caps[2].to_string(),
      });
    if info.is_none() {
      debug!(remote = remote_name, url = %url, "remote does not look like a github repository");
    }
    Ok(info)
  }
}
