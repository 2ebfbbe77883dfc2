use crate::cli::{Cli, CherryPickArgs};
use crate::config::RevupConfig;
use git_ops::repo::{GitRepo, RevListFlags};
use stack_core::error::{RevupError, RevupResult};
use tracing::info;

/// Resolve the branch locally, or fetch it from the remote when absent.
fn find_branch_fetch_if_necessary(git: &GitRepo, branch_to_pick: &str, quiet: bool) -> RevupResult<String> {
  if git.is_branch_or_commit(branch_to_pick)? {
    return Ok(branch_to_pick.to_string());
  }

  info!("Couldn't find '{branch_to_pick}', trying to fetch from remote '{}'", git.remote_name);
  git.fetch_branch(branch_to_pick, quiet)?;

  let remote_branch = git.ensure_branch_prefix(branch_to_pick);
  if git.is_branch_or_commit(&remote_branch)? {
    info!("Found '{remote_branch}'");
    Ok(remote_branch)
  } else {
    Err(RevupError::Usage(format!("Couldn't find ref '{branch_to_pick}'")))
  }
}

/// Handles the `cherry-pick` command: squash the branch's changes into one
/// commit and cherry-pick that onto the local branch.
pub fn run(cli: &Cli, args: &CherryPickArgs, config: &RevupConfig, git: GitRepo) -> RevupResult<i32> {
  let quiet = !cli.verbose;
  let branch_to_pick = find_branch_fetch_if_necessary(&git, &args.branch, quiet)?;

  let base_branch = match config.resolve_str(&args.base_branch, "cherry-pick", "base_branch", "").as_str() {
    "" => git.get_best_base_branch(&branch_to_pick, true, true)?,
    configured => find_branch_fetch_if_necessary(&git, configured, quiet)?,
  };

  // The most recent commit of the base branch that the picked branch has
  // merged in; the parent of the last reachable commit, or the base branch
  // itself if it never moved
  let exclude = format!("^{branch_to_pick}");
  let reachable = git
    .executor()
    .execute_command_lines(&["rev-list", "--first-parent", base_branch.as_str(), exclude.as_str(), "--reverse"], &git.repo_root)
    .map_err(RevupError::Other)?;
  let parent = match reachable.first() {
    Some(oldest) => git.to_commit_hash(&format!("{oldest}~"))?,
    None => git.to_commit_hash(&base_branch)?,
  };

  // The first commit on the branch provides message and author info
  let first_commit = git
    .commit_headers(
      &branch_to_pick,
      Some(base_branch.as_str()),
      RevListFlags {
        first_parent: true,
        exclude_first_parent: true,
        ..Default::default()
      },
    )?
    .into_iter()
    .next()
    .ok_or_else(|| RevupError::Usage(format!("No commits found on {branch_to_pick} relative to {base_branch}")))?;

  let mut squashed = first_commit;
  squashed.tree = git.tree_hash(&branch_to_pick)?;
  squashed.parents = vec![parent];
  let to_cherry_pick = git.commit_tree(&squashed)?;

  let (_, code) = git.git_with_status(&["cherry-pick", &to_cherry_pick])?;
  Ok(code)
}
