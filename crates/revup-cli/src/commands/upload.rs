use crate::cli::{Cli, UploadArgs, resolve_flag};
use crate::config::RevupConfig;
use crate::github;
use crate::render::render_status;
use dialoguer::Confirm;
use git_ops::repo::GitRepo;
use stack_core::error::{RevupError, RevupResult};
use stack_core::stack::{ReviewOptions, TopicStack};
use stack_core::tags::BranchFormat;
use std::process::Command;
use tracing::info;

/// Handles the `upload` command: Parse -> Resolve -> Query -> Fetch ->
/// Classify -> Synthesize -> Confirm -> Push -> Create/Update.
pub async fn run(cli: &Cli, args: &UploadArgs, config: &RevupConfig, git: GitRepo) -> RevupResult<i32> {
  let section = "upload";
  let rebase = resolve_flag(args.rebase, args.no_rebase, config.get_bool(section, "rebase"), false);
  let skip_confirm = resolve_flag(args.skip_confirm, args.no_skip_confirm, config.get_bool(section, "skip_confirm"), false);
  let dry_run = resolve_flag(args.dry_run, args.no_dry_run, config.get_bool(section, "dry_run"), false);
  let push_only = resolve_flag(args.push_only, args.no_push_only, config.get_bool(section, "push_only"), false);
  let status = resolve_flag(args.status, args.no_status, config.get_bool(section, "status"), false);
  let update_pr_body = resolve_flag(args.update_pr_body, args.no_update_pr_body, config.get_bool(section, "update_pr_body"), true);
  let create_local_branches = resolve_flag(
    args.create_local_branches,
    args.no_create_local_branches,
    config.get_bool(section, "create_local_branches"),
    false,
  );
  let review_graph = resolve_flag(args.review_graph, args.no_review_graph, config.get_bool(section, "review_graph"), true);
  let trim_tags = resolve_flag(args.trim_tags, args.no_trim_tags, config.get_bool(section, "trim_tags"), false);
  let patchsets = resolve_flag(args.patchsets, args.no_patchsets, config.get_bool(section, "patchsets"), true);
  let self_authored_only = resolve_flag(
    args.self_authored_only,
    args.no_self_authored_only,
    config.get_bool(section, "self_authored_only"),
    true,
  );
  let relative_chain = resolve_flag(args.relative_chain, args.no_relative_chain, config.get_bool(section, "relative_chain"), false);
  let auto_topic = resolve_flag(args.auto_topic, args.no_auto_topic, config.get_bool(section, "auto_topic"), false);

  let base_branch = config.resolve_str(&args.base_branch, section, "base_branch", "");
  let relative_branch = config.resolve_str(&args.relative_branch, section, "relative_branch", "");
  let branch_format: BranchFormat = config
    .resolve_str(&args.branch_format, section, "branch_format", "user+branch")
    .parse()
    .map_err(RevupError::Usage)?;
  let auto_add_users = config.resolve_str(&args.auto_add_users, section, "auto_add_users", "no");
  let user_aliases = config.resolve_str(&args.user_aliases, section, "user_aliases", "");
  let labels = args.labels.clone().or_else(|| config.get_str(section, "labels"));
  let pre_upload = config.resolve_str(&args.pre_upload, section, "pre_upload", "");
  let uploader = config.resolve_str(&args.uploader, section, "uploader", &git.author);

  let github_url = config.resolve_str(&cli.github_url, "revup", "github_url", "github.com");
  let remote_name = config.resolve_str(&cli.remote_name, "revup", "remote_name", "origin");
  let fork_name = config.resolve_str(&cli.fork_name, "revup", "fork_name", "");
  let oauth = cli.github_oauth.clone().or_else(|| config.get_str("revup", "github_oauth"));
  let quiet = !cli.verbose;

  let connection = github::connect(&git, &github_url, &remote_name, &fork_name, oauth, cli.proxy.as_deref())?;

  let mut stack = TopicStack::new(
    git.clone(),
    &base_branch,
    &relative_branch,
    &args.head,
    Some(connection.repo_info.clone()),
    Some(connection.fork_info.clone()),
  );

  stack.populate_topics(auto_topic, trim_tags)?;
  stack.populate_reviews(&ReviewOptions {
    uploader: uploader.clone(),
    branch_format,
    force_relative_chain: relative_chain,
    labels,
    user_aliases,
    auto_add_users,
    self_authored_only,
    limit_topics: args.topics.clone(),
  })?;

  if !dry_run && !push_only {
    stack.query_github(&connection.endpoint).await?;
    // Fetch uses the oid results from the query
    stack.fetch_git_refs(quiet)?;
    // Rebase detection needs the fetched objects
    stack.mark_rebases(!rebase).await?;
  }

  if status || cli.verbose {
    render_status(&stack, false);
  }
  if status {
    return Ok(0);
  }

  // Rebase information must be settled before commits are synthesized
  stack.create_commits(trim_tags)?;

  if dry_run {
    render_status(&stack, !cli.verbose);
    return Ok(0);
  }

  if !push_only {
    stack.populate_update_info(update_pr_body)?;
  }

  if !skip_confirm && stack.num_reviews_changed() > 0 {
    render_status(&stack, !cli.verbose);
    let proceed = Confirm::new()
      .with_prompt("Continue with upload?")
      .default(true)
      .interact()
      .unwrap_or(false);
    if !proceed {
      return Ok(1);
    }
  }

  if !pre_upload.is_empty() {
    // Conflicts are all known by now, so the hook won't run for nothing
    info!("Running pre-upload command");
    let output = Command::new("sh")
      .args(["-c", &pre_upload])
      .current_dir(&git.repo_root)
      .output()
      .map_err(|e| RevupError::Shell(format!("Failed to run pre-upload command: {e}")))?;
    if !output.status.success() {
      return Err(RevupError::Shell(format!(
        "Pre-upload command failed:\n{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
      )));
    }
  }

  if patchsets {
    // Patchsets need the final commit ids
    stack.populate_patchsets()?;
  }
  // Refs must exist on the remote before any PR can reference them; this
  // also pushes the virtual diff branch used by the patchsets comments
  stack.push_git_refs(&uploader, create_local_branches, quiet)?;

  if push_only {
    render_status(&stack, !cli.verbose);
    return Ok(0);
  }

  // PRs are created after the push and updated after creation
  let result = async {
    stack.create_prs(&connection.endpoint).await?;
    if review_graph {
      // The graph needs the PR urls assigned at creation
      stack.populate_review_graph()?;
    }
    stack.update_prs(&connection.endpoint).await
  }
  .await;

  render_status(&stack, !cli.verbose);
  result?;
  Ok(0)
}
