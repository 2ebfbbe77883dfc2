use crate::error::{RevupError, RevupResult};
use crate::stack::TopicStack;
use anyhow::anyhow;
use git_ops::commit_header::CommitHeader;
use git_ops::error::GitError;
use git_ops::repo::GitRepo;
use regex::Regex;
use std::sync::OnceLock;
use tracing::instrument;

fn topic_with_modifiers() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^(?P<topic>[a-zA-Z\-_0-9]+)(?P<modifiers>[\^~]+[0-9]*)?$").unwrap())
}

/// Resolve the user's argument to a commit-ish: a plain ref, or a topic
/// name (optionally with `~`/`^` modifiers) that resolves to the topic's
/// last commit.
pub fn parse_ref_or_topic(stack: &mut TopicStack, ref_or_topic: &str, parse_refs: bool, parse_topics: bool) -> RevupResult<String> {
  if parse_refs && stack.git.is_branch_or_commit(ref_or_topic)? {
    return Ok(ref_or_topic.to_string());
  }

  if parse_topics
    && let Some(captures) = topic_with_modifiers().captures(ref_or_topic)
  {
    let topic = &captures["topic"];
    let modifiers = captures.name("modifiers").map(|m| m.as_str()).unwrap_or_default();

    stack.populate_topics(false, false)?;
    if let Some(found) = stack.topics.get(topic)
      && let Some(last_commit) = found.original_commits.last()
    {
      let reference = format!("{}{modifiers}", last_commit.commit_id);
      if stack.git.is_branch_or_commit(&reference)? {
        return Ok(reference);
      }
    }
  }

  let message = match (parse_refs, parse_topics) {
    (true, true) => format!("{ref_or_topic} is not a valid topic, commit, or branch name!"),
    (true, false) => format!("{ref_or_topic} is not a valid commit or branch name!"),
    (false, true) => format!("{ref_or_topic} is not a valid topic!"),
    (false, false) => "Can't have both --no-parse-refs and --no-parse-topics!".to_string(),
  };
  Err(RevupError::Usage(message))
}

/// Summary of the topics between head and the relative branch, rendered
/// into the editor's comment block.
pub fn topic_summary(stack: &mut TopicStack) -> RevupResult<String> {
  stack.populate_topics(false, false)?;
  if stack.topics.is_empty() {
    return Ok(String::new());
  }
  let topic_lines: String = stack.topics.keys().rev().map(|topic| format!("  {topic}\n")).collect();
  Ok(format!("\nTopics found between {} and {}:\n{topic_lines}", stack.head, stack.relative_branch))
}

/// Rewrite the stack so that its first commit absorbs the staged changes
/// (or is dropped), replaying every later commit on top. Returns the new
/// chain head; the caller soft-resets to it. The working tree and index are
/// never touched.
#[instrument(skip(git, stack), fields(commits = stack.len()))]
pub fn apply_amend(git: &GitRepo, stack: &mut [CommitHeader], has_diff: bool, drop: bool) -> RevupResult<String> {
  let mut new_commit = stack
    .first()
    .ok_or_else(|| RevupError::Other(anyhow!("Bug! amend stack is empty")))?
    .first_parent()?
    .to_string();

  if !has_diff {
    // Only text changed, so reusing the same trees is much faster
    for commit in stack.iter() {
      new_commit = git.cherry_pick_from_tree(commit, &new_commit)?;
    }
    return Ok(new_commit);
  }

  let staged_tree = git.write_index_tree()?;
  let head = git.to_commit_hash("HEAD")?;
  let last = stack.len() - 1;
  if !drop {
    // The final commit's tree must equal the staged tree, letting the last
    // replay skip the three-way merge entirely
    stack[last].tree = staged_tree.clone();
  }

  for i in 0..stack.len() {
    if i == 0 && drop {
      // Drop the target commit entirely
      continue;
    }

    if i == 0 && stack.len() > 1 {
      // Stage one: a synthetic "cached changes" commit on HEAD carrying the
      // staged tree, folded onto the target via a three-way merge
      let mut cache_commit = CommitHeader::synthetic(staged_tree.clone(), vec![head.clone()], "revup cached changes".to_string());
      cache_commit.commit_id = git.commit_tree(&cache_commit)?;

      new_commit = match git.synthetic_amend(&stack[0], &cache_commit) {
        Ok(amended) => amended,
        Err(GitError::Conflict(conflict_info)) => {
          git.dump_conflict(&conflict_info);
          return Err(RevupError::Conflict(format!(
            "Couldn't apply cached changes to\n\"{}\" ({})\nYou may need to `git rebase -i` to resolve these conflicts!",
            stack[0].title,
            &stack[0].commit_id[..8.min(stack[0].commit_id.len())],
          )));
        }
        Err(other) => return Err(other.into()),
      };
      continue;
    }

    if i == last && !drop {
      // The final state is the exact staged tree, no patch application
      // needed
      new_commit = git.cherry_pick_from_tree(&stack[i], &new_commit)?;
      continue;
    }

    new_commit = match git.synthetic_cherry_pick_from_commit(&stack[i], &new_commit) {
      Ok(picked) => picked,
      Err(GitError::Conflict(conflict_info)) => {
        git.dump_conflict(&conflict_info);
        return Err(RevupError::Conflict(format!(
          "Couldn't re-apply commit \"{}\" ({})\nYou may need to `git rebase -i` to resolve these conflicts!",
          stack[i].title,
          &stack[i].commit_id[..8.min(stack[i].commit_id.len())],
        )));
      }
      Err(other) => return Err(other.into()),
    };
  }

  Ok(new_commit)
}
