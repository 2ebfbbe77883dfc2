use crate::cli::{AmendArgs, Cli, resolve_flag};
use crate::config::RevupConfig;
use git_ops::repo::{GitRepo, RevListFlags};
use regex::Regex;
use stack_core::amend::{apply_amend, parse_ref_or_topic, topic_summary};
use stack_core::error::{RevupError, RevupResult};
use stack_core::stack::TopicStack;
use std::process::Command;
use std::sync::OnceLock;
use tracing::info;

fn comment_lines() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?m)^\s*#.*$").unwrap())
}

const SCISSORS_LINE: &str = "# ------------------------ >8 ------------------------";

/// Apply the configured commit.cleanup mode to an edited message.
fn cleanup_message(message: &str, mode: &str) -> String {
  match mode {
    "verbatim" => message.to_string(),
    "scissors" => {
      let cut = message.split(SCISSORS_LINE).next().unwrap_or(message);
      cut.trim_end().to_string()
    }
    // "strip", "whitespace" and the default all drop comment lines
    _ => comment_lines().replace_all(message, "").trim().to_string(),
  }
}

/// Let the user modify the message in their editor, with change stats and
/// the local topic summary shown as comment lines.
fn invoke_editor_for_commit_msg(git: &GitRepo, topics_text: &str, commit_msg: &str, cache_stat: &str, stat: &str) -> RevupResult<String> {
  let mut full_stat = Vec::new();
  if !cache_stat.is_empty() {
    full_stat.push(format!("Changes to be committed:\n{cache_stat}"));
  }
  if !stat.is_empty() {
    full_stat.push(format!("Original commit:\n{stat}"));
  }
  let stat_text = full_stat.join("\n\n");

  let comment_text = format!(
    "\nPlease enter the commit message for your changes. Lines starting\nwith '#' will be ignored, \
     and an empty message aborts the commit.\n{topics_text}\n{stat_text}"
  );
  let comment_text = comment_text.split('\n').collect::<Vec<_>>().join("\n# ");

  let editmsg_path = git.scratch_dir().join("COMMIT_EDITMSG");
  std::fs::write(&editmsg_path, format!("{commit_msg}\n{comment_text}"))
    .map_err(|e| RevupError::Other(anyhow::anyhow!("Failed to write commit message file: {e}")))?;

  let mut editor_parts = git.editor.split_whitespace();
  let editor_bin = editor_parts
    .next()
    .ok_or_else(|| RevupError::Usage("No editor configured".to_string()))?;
  let status = Command::new(editor_bin)
    .args(editor_parts)
    .arg(&editmsg_path)
    .status()
    .map_err(|e| RevupError::Shell(format!("Failed to launch editor '{}': {e}", git.editor)))?;
  if !status.success() {
    return Err(RevupError::Shell(format!("Editor '{}' exited with {status}", git.editor)));
  }

  let edited = std::fs::read_to_string(&editmsg_path).map_err(|e| RevupError::Other(anyhow::anyhow!("Failed to read edited message: {e}")))?;

  let (cleanup_mode, _) = git.git_with_status(&["config", "commit.cleanup"])?;
  Ok(cleanup_message(&edited, cleanup_mode.trim()))
}

/// Handles the `amend` command (and `commit`, its --insert alias).
pub fn run(cli: &Cli, args: &AmendArgs, config: &RevupConfig, git: GitRepo, force_insert: bool) -> RevupResult<i32> {
  let section = "amend";
  let edit = resolve_flag(args.edit, args.no_edit, config.get_bool(section, "edit"), true);
  let insert = force_insert || resolve_flag(args.insert, args.no_insert, config.get_bool(section, "insert"), false);
  let drop = resolve_flag(args.drop, args.no_drop, config.get_bool(section, "drop"), false);
  let all = resolve_flag(args.all, args.no_all, config.get_bool(section, "all"), false);
  let parse_refs = resolve_flag(args.parse_refs, args.no_parse_refs, config.get_bool(section, "parse_refs"), true);
  let mut parse_topics = resolve_flag(args.parse_topics, args.no_parse_topics, config.get_bool(section, "parse_topics"), true);
  let base_branch = config.resolve_str(&args.base_branch, section, "base_branch", "");
  let relative_branch = config.resolve_str(&args.relative_branch, section, "relative_branch", "");

  let github_url = config.resolve_str(&cli.github_url, "revup", "github_url", "github.com");
  let remote_name = config.resolve_str(&cli.remote_name, "revup", "remote_name", "origin");
  if git.github_repo_info(&github_url, &remote_name)?.is_none() {
    // Topic parsing needs a resolvable base branch, which this repo lacks
    parse_topics = false;
  }

  let has_staged = git.has_staged_changes()?;
  let has_unstaged = all && git.has_unstaged_changes()?;
  let has_diff = has_staged || has_unstaged || drop;

  if !has_diff && !edit {
    return Ok(0);
  }
  if insert && !edit {
    return Err(RevupError::Usage("Can't skip wording an inserted commit!".to_string()));
  }
  if drop && insert {
    return Err(RevupError::Usage("Doesn't make sense to drop and insert".to_string()));
  }

  if has_unstaged {
    git.add_update()?;
  }

  let mut topics = TopicStack::new(git.clone(), &base_branch, &relative_branch, "HEAD", None, None);

  let commit = match &args.ref_or_topic {
    Some(ref_or_topic) => {
      let commit = parse_ref_or_topic(&mut topics, ref_or_topic, parse_refs, parse_topics)?;
      if !git.is_ancestor(&format!("{commit}~"), "HEAD")? {
        return Err(RevupError::Usage(if commit == *ref_or_topic {
          "Specified commit is not a first parent ancestor of HEAD".to_string()
        } else {
          format!("Commit ({commit}, from topic {ref_or_topic}) is not a first parent ancestor of HEAD")
        }));
      }
      commit
    }
    None => "HEAD".to_string(),
  };

  let exclude = format!("{commit}~");
  let mut stack = git.commit_headers(
    "HEAD",
    Some(exclude.as_str()),
    RevListFlags {
      first_parent: true,
      exclude_first_parent: true,
      ..Default::default()
    },
  )?;
  if stack.is_empty() {
    return Err(RevupError::Usage(format!("Couldn't find any commits between HEAD and {commit}~")));
  }

  if insert {
    // The named commit becomes the parent of a fresh empty stub
    let original_id = stack[0].commit_id.clone();
    stack[0].parents = vec![original_id];
    stack[0].author_name = String::new();
    stack[0].author_email = String::new();
    stack[0].author_date = String::new();
    stack[0].committer_name = String::new();
    stack[0].committer_email = String::new();
    stack[0].committer_date = String::new();
    stack[0].set_message(String::new());
  }

  if edit && !drop {
    let topics_text = if parse_topics { topic_summary(&mut topics)? } else { String::new() };
    let cache_stat = if has_diff { git.cached_diff_stat()? } else { String::new() };
    let original_stat = if insert {
      String::new()
    } else {
      git.diff_stat(&format!("{commit}~"), &commit)?
    };

    let new_msg = invoke_editor_for_commit_msg(&git, &topics_text, &stack[0].commit_msg, &cache_stat, &original_stat)?;
    if new_msg.trim().is_empty() {
      info!("Exited due to empty commit message.");
      return Ok(1);
    }
    if stack[0].commit_msg == new_msg && !has_diff {
      return Ok(0);
    }
    stack[0].set_message(new_msg);
  }

  let new_commit = apply_amend(&git, &mut stack, has_diff, drop)?;
  git.soft_reset(&new_commit, "reset --soft (revup amend)")?;
  Ok(0)
}

#[cfg(test)]
mod tests {
  use super::cleanup_message;
  use pretty_assertions::assert_eq;

  #[test]
  fn strip_removes_comment_lines_and_trims() {
    let message = "subject\n\nbody\n# a comment\n  # indented comment\n";
    assert_eq!(cleanup_message(message, "strip"), "subject\n\nbody");
  }

  #[test]
  fn verbatim_keeps_everything() {
    let message = "subject\n# comment\n";
    assert_eq!(cleanup_message(message, "verbatim"), message);
  }

  #[test]
  fn scissors_cuts_at_the_marker() {
    let message = "subject\n# kept comment\n# ------------------------ >8 ------------------------\ndiff text\n";
    assert_eq!(cleanup_message(message, "scissors"), "subject\n# kept comment");
  }
}
