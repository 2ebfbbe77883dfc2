use clap::Parser;
use git_executor::git_command_executor::GitCommandExecutor;
use git_ops::repo::{GitRepo, GitRepoOptions};
use github_client::endpoint::GitHubError;
use stack_core::error::{RevupError, RevupResult};
use tracing::error;

mod cli;
mod commands;
mod config;
mod github;
mod logging;
mod render;

use cli::{Cli, Commands, resolve_flag};
use config::RevupConfig;

fn exit_code(err: &RevupError) -> i32 {
  match err {
    RevupError::Usage(_) => 2,
    RevupError::Conflict(_) => 3,
    RevupError::Shell(_) => 4,
    RevupError::GitHub(GitHubError::Api(_)) => 5,
    RevupError::GitHub(GitHubError::Request { .. }) => 6,
    RevupError::GitHub(GitHubError::Other(_)) => 1,
    RevupError::Other(_) => 1,
  }
}

async fn run(cli: Cli) -> RevupResult<i32> {
  let executor = match &cli.git_path {
    Some(git_path) => GitCommandExecutor::with_git_path(git_path)?,
    None => GitCommandExecutor::new(),
  };
  let repo_root = executor.execute_command(&["rev-parse", "--show-toplevel"], ".")?;

  let config = RevupConfig::load(&repo_root)?;
  // So users don't accidentally leak their oauth when sharing logs
  if let Some(token) = &cli.github_oauth {
    logging::redact(token, "<GITHUB_OAUTH>");
  }
  if let Some(token) = config.get_str("revup", "github_oauth") {
    logging::redact(&token, "<GITHUB_OAUTH>");
  }

  // Config runs before anything heavier, so a broken config never locks the
  // user out of fixing it
  if let Commands::Config(args) = &cli.command {
    if args.value.is_none() && !args.delete {
      if let Some(value) = config.get_raw(&args.flag) {
        println!("{value}");
      }
      return Ok(0);
    }
    config.set(&args.flag, args.value.as_deref(), args.repo, args.delete)?;
    return Ok(0);
  }

  let remote_name = config.resolve_str(&cli.remote_name, "revup", "remote_name", "origin");
  let fork_name = config.resolve_str(&cli.fork_name, "revup", "fork_name", "");
  let git = GitRepo::discover(
    executor,
    &repo_root,
    GitRepoOptions {
      // Review heads are pushed to the fork when one is configured
      remote_name: if fork_name.is_empty() { remote_name } else { fork_name },
      main_branch: config.resolve_str(&cli.main_branch, "revup", "main_branch", "main"),
      base_branch_globs: config
        .resolve_str(&cli.base_branch_globs, "revup", "base_branch_globs", "")
        .lines()
        .map(str::trim)
        .filter(|glob| !glob.is_empty())
        .map(String::from)
        .collect(),
      keep_temp: resolve_flag(cli.keep_temp, cli.no_keep_temp, config.get_bool("revup", "keep_temp"), false),
      editor: config.resolve_str(&cli.editor, "revup", "editor", ""),
    },
  )?;

  match &cli.command {
    Commands::Upload(args) => commands::upload::run(&cli, args, &config, git).await,
    Commands::Restack(args) => commands::restack::run(&cli, args, &config, git),
    Commands::Amend(args) => commands::amend::run(&cli, args, &config, git, false),
    Commands::Commit(args) => commands::amend::run(&cli, args, &config, git, true),
    Commands::CherryPick(args) => commands::cherry_pick::run(&cli, args, &config, git),
    Commands::Toolkit(command) => commands::toolkit::run(&cli, command, &config, git),
    Commands::Config(_) => Ok(0),
  }
}

#[tokio::main]
async fn main() {
  let cli = Cli::parse();
  logging::init(cli.verbose);

  let code = match run(cli).await {
    Ok(code) => code,
    Err(err) => {
      error!("{err}");
      exit_code(&err)
    }
  };
  std::process::exit(code);
}
