use crate::cli::{Cli, RestackArgs, resolve_flag};
use crate::config::RevupConfig;
use git_ops::repo::GitRepo;
use stack_core::error::RevupResult;
use stack_core::stack::TopicStack;

/// Handles the `restack` command.
pub fn run(_cli: &Cli, args: &RestackArgs, config: &RevupConfig, git: GitRepo) -> RevupResult<i32> {
  let topicless_last = resolve_flag(
    args.topicless_last,
    args.no_topicless_last,
    config.get_bool("restack", "topicless_last"),
    false,
  );
  let base_branch = config.resolve_str(&args.base_branch, "restack", "base_branch", "");
  let relative_branch = config.resolve_str(&args.relative_branch, "restack", "relative_branch", "");

  let mut stack = TopicStack::new(git, &base_branch, &relative_branch, "HEAD", None, None);
  stack.populate_topics(false, false)?;
  if stack.commits.is_empty() {
    return Ok(0);
  }
  stack.restack(topicless_last)?;
  Ok(0)
}
