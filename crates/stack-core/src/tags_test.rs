use crate::tags::{
  BranchFormat, TAG_ASSIGNEE, TAG_BRANCH, TAG_RELATIVE, TAG_REVIEWER, TAG_TOPIC, auto_topic_name, commit_prefix_label,
  format_remote_branch, parse_commit_tags,
};
use pretty_assertions::assert_eq;

#[test]
fn recognized_tags_are_parsed_and_stripped() {
  let message = "my title\n\nsome body text\nTopic: feature\nReviewer: alice, bob\n";
  let (tags, trimmed) = parse_commit_tags("origin", message);

  assert_eq!(tags.first(TAG_TOPIC), Some("feature"));
  let reviewers: Vec<&str> = tags.values(TAG_REVIEWER).collect();
  assert_eq!(reviewers, vec!["alice", "bob"]);
  assert_eq!(trimmed, "my title\n\nsome body text");
}

#[test]
fn tag_names_are_case_insensitive_and_accept_sloppy_plurals() {
  let (tags, _) = parse_commit_tags("origin", "title\nREVIEWERS: alice\nreviewer: bob\nAssignees: carol\nBranches: release");
  let reviewers: Vec<&str> = tags.values(TAG_REVIEWER).collect();
  assert_eq!(reviewers, vec!["alice", "bob"]);
  let assignees: Vec<&str> = tags.values(TAG_ASSIGNEE).collect();
  assert_eq!(assignees, vec!["carol"]);
  let branches: Vec<&str> = tags.values(TAG_BRANCH).collect();
  assert_eq!(branches, vec!["origin/release"]);
}

#[test]
fn singular_tags_are_not_depluralized() {
  // "Topics" would strip to "topic", but topic-family names are exempt, so
  // the line stays in the message
  let (tags, trimmed) = parse_commit_tags("origin", "title\nTopics: a\nRelatives: b\nUploaders: c");
  assert_eq!(tags.count(TAG_TOPIC), 0);
  assert_eq!(tags.count(TAG_RELATIVE), 0);
  assert!(trimmed.contains("Topics: a"));
  assert!(trimmed.contains("Relatives: b"));
}

#[test]
fn unknown_tag_shaped_lines_stay_in_the_message() {
  let (tags, trimmed) = parse_commit_tags("origin", "title\nSigned-off-by: someone\nTopic: t");
  assert_eq!(tags.first(TAG_TOPIC), Some("t"));
  assert!(trimmed.contains("Signed-off-by: someone"));
}

#[test]
fn branch_values_get_the_remote_prefix_once() {
  let (tags, _) = parse_commit_tags("origin", "title\nBranch: main, origin/release-1");
  let branches: Vec<&str> = tags.values(TAG_BRANCH).collect();
  assert_eq!(branches, vec!["origin/main", "origin/release-1"]);
}

#[test]
fn repeated_tags_accumulate_and_blank_values_are_dropped() {
  let (tags, _) = parse_commit_tags("origin", "title\nReviewer: alice,\nReviewer: bob");
  let reviewers: Vec<&str> = tags.values(TAG_REVIEWER).collect();
  assert_eq!(reviewers, vec!["alice", "bob"]);
}

#[test]
fn auto_topic_uses_first_five_title_words() {
  assert_eq!(auto_topic_name("Fix the [weird] bug: in parser and more words"), "fix_the_weird_bug_in");
  assert_eq!(auto_topic_name("Short title"), "short_title");
  assert_eq!(auto_topic_name("MiXeD Case"), "mixed_case");
}

#[test]
fn commit_prefix_labels() {
  assert_eq!(commit_prefix_label("net: fix socket leak"), Some("net".to_string()));
  assert_eq!(commit_prefix_label("[CI] speed up builds"), Some("ci".to_string()));
  assert_eq!(commit_prefix_label("no prefix here"), None);
}

#[test]
fn remote_branch_formats() {
  assert_eq!(format_remote_branch("alice", "main", "fix", BranchFormat::UserBranch), "alice/revup/main/fix");
  assert_eq!(format_remote_branch("alice", "main", "fix", BranchFormat::User), "alice/revup/fix");
  assert_eq!(format_remote_branch("alice", "main", "fix", BranchFormat::Branch), "revup/main/fix");
  assert_eq!(format_remote_branch("alice", "main", "fix", BranchFormat::None), "revup/fix");
}

#[test]
fn user_aliases_rewrite_reviewers_and_assignees() {
  let (mut tags, _) = parse_commit_tags("origin", "title\nReviewer: ali\nAssignee: ali, bob");
  tags.apply_user_aliases("ali:alice");
  let reviewers: Vec<&str> = tags.values(TAG_REVIEWER).collect();
  assert_eq!(reviewers, vec!["alice"]);
  let assignees: Vec<&str> = tags.values(TAG_ASSIGNEE).collect();
  assert_eq!(assignees, vec!["alice", "bob"]);
}
