use crate::commit_header::CommitHeader;
use crate::error::{GitConflict, GitConflictInfo, GitError, GitResult};
use crate::repo::GitRepo;
use anyhow::anyhow;
use tracing::{error, info, instrument};

impl GitRepo {
  /// Combined `git merge-tree --write-tree` and `git commit-tree`. Merges
  /// `branch1` and `branch2` (optionally with an explicit merge base) and
  /// commits the resulting tree with the metadata of `commit_info`.
  /// Conflicts surface as [`GitError::Conflict`] carrying the result tree
  /// and the parsed conflict events.
  #[instrument(skip(self, commit_info))]
  pub fn merge_tree_commit(&self, branch1: &str, branch2: &str, commit_info: &CommitHeader, merge_base: Option<&str>) -> GitResult<String> {
    let mut args = vec!["merge-tree", "--write-tree", "--messages", "-z"];
    if let Some(merge_base) = merge_base {
      args.push("--merge-base");
      args.push(merge_base);
    }
    args.push(branch1);
    args.push(branch2);

    let (stdout, code) = self.git_with_status(&args)?;

    // See the git merge-tree man page for the full breakdown of the
    // NUL-delimited output format.
    let sections: Vec<&str> = stdout.split("\u{0}\u{0}").collect();
    let subsections: Vec<Vec<&str>> = sections.iter().map(|s| s.split('\u{0}').collect()).collect();
    let tree_hash = subsections
      .first()
      .and_then(|s| s.first())
      .map(|t| t.trim().to_string())
      .ok_or_else(|| anyhow!("git merge-tree produced no output"))?;

    match code {
      0 => {
        let mut new_commit_info = commit_info.clone();
        new_commit_info.tree = tree_hash;
        self.commit_tree(&new_commit_info)
      }
      1 => {
        // subsections[0][1..] lists higher-stage index entries, which we
        // don't currently use. The informational section is a flat list of
        // <num-paths> <paths...> <type> <message> groups.
        let informational = subsections.get(1).cloned().unwrap_or_default();
        let mut conflicts = Vec::new();
        let mut i = 0;
        while i + 1 < informational.len() {
          let num_paths: usize = informational[i]
            .parse()
            .map_err(|e| anyhow!("Unexpected merge-tree conflict section: {e}"))?;
          if i + num_paths + 2 >= informational.len() {
            break;
          }
          conflicts.push(GitConflict {
            kind: informational[i + 1 + num_paths].to_string(),
            message: informational[i + 2 + num_paths].trim().to_string(),
            paths: informational[i + 1..i + 1 + num_paths].iter().map(|p| p.to_string()).collect(),
          });
          i += num_paths + 3;
        }
        Err(GitError::Conflict(GitConflictInfo { tree: tree_hash, conflicts }))
      }
      other => Err(GitError::Other(anyhow!("Unexpected error in git merge-tree: exit code {other}"))),
    }
  }

  /// A commit containing the contents of both `commit_to_amend` and
  /// `new_commit`, with `commit_to_amend`'s metadata.
  pub fn synthetic_amend(&self, commit_to_amend: &CommitHeader, new_commit: &CommitHeader) -> GitResult<String> {
    self.merge_tree_commit(&new_commit.commit_id, &commit_to_amend.commit_id, commit_to_amend, Some(new_commit.first_parent()?))
  }

  /// Re-parent a commit via a three-way tree merge with the old parent as
  /// merge base, preserving the commit's metadata. Never touches the
  /// working tree.
  pub fn synthetic_cherry_pick_from_commit(&self, commit_info: &CommitHeader, new_parent: &str) -> GitResult<String> {
    let old_parent = commit_info.first_parent()?.to_string();
    let mut new_commit_info = commit_info.clone();
    new_commit_info.parents[0] = new_parent.to_string();
    self.merge_tree_commit(&commit_info.commit_id, new_parent, &new_commit_info, Some(old_parent.as_str()))
  }

  /// Re-parent only: a commit with the same tree as the original but a new
  /// first parent. Valid when the tree is already known to be correct.
  pub fn cherry_pick_from_tree(&self, commit_info: &CommitHeader, new_parent: &str) -> GitResult<String> {
    let mut new_commit_info = commit_info.clone();
    if new_commit_info.parents.is_empty() {
      new_commit_info.parents.push(new_parent.to_string());
    } else {
      new_commit_info.parents[0] = new_parent.to_string();
    }
    self.commit_tree(&new_commit_info)
  }

  /// Log a conflict for the user. Content conflicts additionally get their
  /// marker hunks printed from the result tree.
  pub fn dump_conflict(&self, conflict_info: &GitConflictInfo) {
    for conflict in &conflict_info.conflicts {
      if conflict.kind == "Auto-merging" {
        // A purely informational message, doesn't indicate a conflict
        continue;
      }

      error!("{}", conflict.message);

      if conflict.kind == "CONFLICT (contents)"
        && let Some(path) = conflict.paths.first()
        && let Err(e) = self.dump_conflict_markers(&conflict_info.tree, path)
      {
        error!("Failed to read conflict markers for {path}: {e}");
      }
    }
  }

  /// Print all conflict marker groups of a file in the given tree, prefixed
  /// with the starting and ending line numbers.
  pub fn dump_conflict_markers(&self, tree: &str, path: &str) -> GitResult<()> {
    let content = self.show_tree_file(tree, path)?;
    let lines: Vec<&str> = content.split('\n').collect();

    let mut groups: Vec<(usize, usize)> = Vec::new();
    let mut conflict_depth = 0usize;
    let mut group_start = 0usize;
    for (lineno, line) in lines.iter().enumerate() {
      if line.starts_with("<<<<<<<") {
        if conflict_depth == 0 {
          group_start = lineno;
        }
        conflict_depth += 1;
      }
      if line.starts_with(">>>>>>>") && conflict_depth > 0 {
        conflict_depth -= 1;
        if conflict_depth == 0 {
          groups.push((group_start, lineno + 1));
        }
      }
    }

    let mut rendered = Vec::new();
    for (start, end) in groups {
      rendered.push(format!("@@ {start}, {end}"));
      for line in &lines[start..end] {
        rendered.push((*line).to_string());
      }
    }
    info!("{}", rendered.join("\n"));
    Ok(())
  }
}
