use crate::cli::{Cli, ToolkitCommands};
use crate::config::RevupConfig;
use git_ops::repo::{GitRepo, RevListFlags};
use stack_core::error::{RevupError, RevupResult};
use stack_core::stack::TopicStack;

/// Miscellaneous commands exposing subunits of possibly useful
/// functionality, for expert users and scripts.
pub fn run(_cli: &Cli, command: &ToolkitCommands, config: &RevupConfig, git: GitRepo) -> RevupResult<i32> {
  match command {
    ToolkitCommands::DetectBranch { show_all, no_limit } => {
      if *show_all {
        let candidates = git.get_best_base_branch_candidates("HEAD", !no_limit, true)?;
        println!("{}", candidates.join(", "));
      } else {
        println!("{}", git.get_best_base_branch("HEAD", !no_limit, true)?);
      }
    }

    ToolkitCommands::CherryPick { commit, parent } => {
      git.verify_branch_or_commit(commit)?;
      git.verify_branch_or_commit(parent)?;

      let headers = git.commit_headers(commit, None, RevListFlags { max_revs: 1, ..Default::default() })?;
      let header = headers
        .first()
        .ok_or_else(|| RevupError::Usage(format!("Commit {commit} doesn't exist!")))?;
      println!("{}", git.synthetic_cherry_pick_from_commit(header, parent)?);
    }

    ToolkitCommands::DiffTarget {
      old_head,
      old_base,
      new_head,
      new_base,
      parent,
    } => {
      git.verify_branch_or_commit(old_head)?;
      git.verify_branch_or_commit(new_head)?;

      let old_base = match old_base {
        Some(old_base) => old_base.clone(),
        None => git.to_commit_hash(&format!("{old_head}~"))?,
      };
      let new_base = match new_base {
        Some(new_base) => new_base.clone(),
        None => git.to_commit_hash(&format!("{new_head}~"))?,
      };
      println!("{}", git.make_virtual_diff_target(&old_base, old_head, &new_base, new_head, parent.as_deref())?);
    }

    ToolkitCommands::ForkPoint { branches } => {
      git.verify_branch_or_commit(&branches[0])?;
      git.verify_branch_or_commit(&branches[1])?;
      println!("{}", git.fork_point(&branches[0], &branches[1])?);
    }

    ToolkitCommands::ClosestBranch { branch, allow_self } => {
      git.verify_branch_or_commit(branch)?;
      println!("{}", git.get_best_base_branch(branch, true, *allow_self)?);
    }

    ToolkitCommands::ListTopics {
      base_branch,
      relative_branch,
      commit_ids,
      titles,
    } => {
      let base_branch = config.resolve_str(base_branch, "upload", "base_branch", "");
      let relative_branch = config.resolve_str(relative_branch, "upload", "relative_branch", "");
      let mut stack = TopicStack::new(git, &base_branch, &relative_branch, "HEAD", None, None);
      stack.populate_topics(false, false)?;

      for (name, topic) in stack.topics.iter().rev() {
        println!("{name}");
        for commit in &topic.original_commits {
          if *commit_ids {
            println!("  {}", commit.commit_id);
          } else if *titles {
            println!("  {}", commit.title);
          }
        }
      }
    }
  }
  Ok(0)
}
