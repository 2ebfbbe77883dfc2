use crate::commit_header::CommitHeader;
use crate::error::GitResult;
use crate::repo::GitRepo;
use anyhow::anyhow;
use regex::Regex;
use std::sync::OnceLock;
use tracing::instrument;

fn diff_tree_raw_line() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"(?m)^:(?P<old_mode>[0-9]+) (?P<new_mode>[0-9]+) (?P<old_hash>[0-9a-f]+) (?P<new_hash>[0-9a-f]+) (?P<type>[a-zA-Z]+)\t(?P<path>.*)$").unwrap()
  })
}

impl GitRepo {
  /// Build a commit against which `new_head` can be diffed to show only the
  /// user's own changes since the last review round, hiding unrelated
  /// upstream churn from a rebase.
  ///
  /// The tree is `new_base`'s tree with every path touched by the
  /// `old_base -> old_head` diff overwritten by its `old_head` version:
  /// - untouched files show no diff against `new_head`
  /// - files touched by both rounds show the full `old_head -> new_head`
  ///   diff (upstream changes to those files cannot be untangled)
  /// - files only touched in the new round diff as `new_base -> new_head`
  /// - files only touched in the old round diff as `old_head -> new_base`,
  ///   or as deleted when they no longer exist in `new_base`
  ///
  /// If the old diff is empty, returns `new_base` unchanged. Successive
  /// targets chain through `parent` so git can collect old ones together.
  #[instrument(skip(self))]
  pub fn make_virtual_diff_target(
    &self,
    old_base: &str,
    old_head: &str,
    new_base: &str,
    new_head: &str,
    parent: Option<&str>,
  ) -> GitResult<String> {
    // Transform diff-tree raw output into ls-files style index entries,
    // keeping only the new version of each path.
    let raw_diff = self.git_raw(&["diff-tree", "-r", "--no-commit-id", "--raw", old_base, old_head])?;
    let mut new_index: Vec<String> = Vec::new();
    for caps in diff_tree_raw_line().captures_iter(&raw_diff) {
      new_index.push(format!("{} {} 0\t{}", &caps["new_mode"], &caps["new_hash"], &caps["path"]));
    }

    if new_index.is_empty() {
      // No files were actually changed, so no diff needs to be applied
      return Ok(new_base.to_string());
    }

    let temp_index_path = self.scratch_dir().join("index.temp");
    let real_index_path = std::path::Path::new(&self.git_dir).join("index");
    if real_index_path.exists() {
      std::fs::copy(&real_index_path, &temp_index_path).map_err(|e| anyhow!("Failed to copy index to scratch dir: {e}"))?;
    }
    let temp_index = temp_index_path.to_string_lossy().into_owned();
    let env: [(&str, &str); 1] = [("GIT_INDEX_FILE", temp_index.as_str())];

    self.git_with_env(&["reset", "-q", "--no-refresh", new_base, "--", ":/"], &env)?;
    self
      .executor()
      .execute_command_with_env_and_input(&["update-index", "--index-info"], &self.repo_root, &env, &new_index.join("\n"))?;

    let tree = self.git_with_env(&["write-tree"], &env)?;

    let parents = parent.map(|p| vec![p.to_string()]).unwrap_or_default();
    let message = format!("revup virtual diff target\n\n{old_base}\n{old_head}\n{new_base}\n{new_head}");
    self.commit_tree(&CommitHeader::synthetic(tree, parents, message))
  }
}
