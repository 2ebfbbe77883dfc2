use crate::error::RevupError;
use crate::stack::{ReviewOptions, TopicStack};
use crate::tags::{BranchFormat, TAG_LABEL};
use git_executor::git_command_executor::GitCommandExecutor;
use git_ops::repo::{GitRepo, GitRepoOptions};
use pretty_assertions::assert_eq;
use test_utils::git_test_utils::TestRepo;

fn make_git(test: &TestRepo) -> GitRepo {
  GitRepo::discover(
    GitCommandExecutor::new(),
    test.path().to_str().unwrap(),
    GitRepoOptions {
      remote_name: "origin".to_string(),
      main_branch: "main".to_string(),
      ..Default::default()
    },
  )
  .unwrap()
}

fn make_stack(test: &TestRepo) -> TopicStack {
  TopicStack::new(make_git(test), "main", "", "HEAD", None, None)
}

fn base_repo() -> TestRepo {
  let test = TestRepo::new();
  test.create_commit("root", "base.txt", "base\n");
  test.update_ref("refs/remotes/origin/main", &test.head()).unwrap();
  test
}

fn options(uploader: &str) -> ReviewOptions {
  ReviewOptions {
    uploader: uploader.to_string(),
    ..Default::default()
  }
}

#[test]
fn topics_group_in_first_appearance_order_and_untagged_commits_are_skipped() {
  let test = base_repo();
  test.create_commit("one\n\nTopic: alpha", "a.txt", "1\n");
  test.create_commit("untagged commit", "u.txt", "u\n");
  test.create_commit("two\n\nTopic: beta", "b.txt", "2\n");
  test.create_commit("three\n\nTopic: alpha", "a.txt", "2\n");

  let mut stack = make_stack(&test);
  stack.populate_topics(false, false).unwrap();

  let names: Vec<&str> = stack.topics.keys().map(String::as_str).collect();
  assert_eq!(names, vec!["alpha", "beta"]);
  assert_eq!(stack.topics["alpha"].original_commits.len(), 2);
  assert_eq!(stack.topics["beta"].original_commits.len(), 1);
  // All four commits were parsed, grouping just skipped the untagged one
  assert_eq!(stack.commits.len(), 4);
}

#[test]
fn auto_topic_mode_synthesizes_names_from_titles() {
  let test = base_repo();
  test.create_commit("Fix the parser bug now please", "a.txt", "1\n");

  let mut stack = make_stack(&test);
  stack.populate_topics(true, false).unwrap();

  let names: Vec<&str> = stack.topics.keys().map(String::as_str).collect();
  assert_eq!(names, vec!["fix_the_parser_bug_now"]);
}

#[test]
fn a_commit_with_two_topics_is_rejected() {
  let test = base_repo();
  test.create_commit("bad\n\nTopic: one, two", "a.txt", "1\n");

  let mut stack = make_stack(&test);
  match stack.populate_topics(false, false) {
    Err(RevupError::Usage(message)) => assert!(message.contains("more than one topic")),
    other => panic!("expected usage error, got {other:?}"),
  }
}

#[test]
fn relative_forward_reference_is_rejected() {
  let test = base_repo();
  test.create_commit("c\n\nTopic: child\nRelative: parent", "c.txt", "1\n");
  test.create_commit("p\n\nTopic: parent", "p.txt", "1\n");

  let mut stack = make_stack(&test);
  stack.populate_topics(false, false).unwrap();
  match stack.populate_reviews(&options("tester")) {
    Err(RevupError::Usage(message)) => {
      assert!(message.contains("child"));
      assert!(message.contains("parent"));
      assert!(message.contains("doesn't appear after it"));
    }
    other => panic!("expected usage error, got {other:?}"),
  }
}

#[test]
fn unseen_relative_topic_is_treated_as_merged() {
  let test = base_repo();
  test.create_commit("c\n\nTopic: child\nRelative: merged-away", "c.txt", "1\n");

  let mut stack = make_stack(&test);
  stack.populate_topics(false, false).unwrap();
  stack.populate_reviews(&options("tester")).unwrap();

  let topic = &stack.topics["child"];
  assert_eq!(topic.relative_topic, None);
  let review = &topic.reviews["origin/main"];
  // With no relative topic the review bases directly on the branch point
  assert_eq!(review.remote_base, "main");
  assert!(review.base_ref.is_some());
}

#[test]
fn linear_chain_resolves_bases_heads_and_children() {
  let test = base_repo();
  let base = test.head();
  test.create_commit("one\n\nTopic: a", "a.txt", "1\n");
  test.create_commit("two\n\nTopic: b\nRelative: a", "b.txt", "1\n");
  test.create_commit("three\n\nTopic: c\nRelative: b", "c.txt", "1\n");

  let mut stack = make_stack(&test);
  stack.populate_topics(false, false).unwrap();
  stack.populate_reviews(&options("tester")).unwrap();

  let a = &stack.topics["a"].reviews["origin/main"];
  let b = &stack.topics["b"].reviews["origin/main"];
  let c = &stack.topics["c"].reviews["origin/main"];

  assert_eq!(a.remote_head, "tester/revup/main/a");
  assert_eq!(b.remote_head, "tester/revup/main/b");
  assert_eq!(c.remote_head, "tester/revup/main/c");

  // The chain: a bases on the branch point, b on a's head, c on b's head
  assert_eq!(a.base_ref.as_deref(), Some(base.as_str()));
  assert_eq!(a.remote_base, "main");
  assert_eq!(b.remote_base, "tester/revup/main/a");
  assert!(b.base_ref.is_none());
  assert_eq!(c.remote_base, "tester/revup/main/b");

  assert_eq!(a.children, vec![("b".to_string(), "origin/main".to_string())]);
  assert_eq!(b.children, vec![("c".to_string(), "origin/main".to_string())]);

  // Relative topics inherit the branch set
  assert_eq!(stack.topics["b"].relative_topic.as_deref(), Some("a"));
}

#[test]
fn branch_format_variants_change_remote_heads() {
  let test = base_repo();
  test.create_commit("one\n\nTopic: a", "a.txt", "1\n");

  let mut stack = make_stack(&test);
  stack.populate_topics(false, false).unwrap();
  let mut opts = options("tester");
  opts.branch_format = BranchFormat::Branch;
  stack.populate_reviews(&opts).unwrap();

  assert_eq!(stack.topics["a"].reviews["origin/main"].remote_head, "revup/main/a");
}

#[test]
fn branches_outside_the_relative_topics_set_are_rejected() {
  let test = base_repo();
  test.update_ref("refs/remotes/origin/release", &test.head()).unwrap();
  test.create_commit("one\n\nTopic: a\nBranch: main", "a.txt", "1\n");
  test.create_commit("two\n\nTopic: b\nRelative: a\nBranch: release", "b.txt", "1\n");

  let mut stack = make_stack(&test);
  stack.populate_topics(false, false).unwrap();
  match stack.populate_reviews(&options("tester")) {
    Err(RevupError::Usage(message)) => assert!(message.contains("not in relative topic")),
    other => panic!("expected usage error, got {other:?}"),
  }
}

#[test]
fn draft_label_marks_the_review_and_is_not_a_real_label() {
  let test = base_repo();
  test.create_commit("one\n\nTopic: a\nLabel: draft, bug", "a.txt", "1\n");

  let mut stack = make_stack(&test);
  stack.populate_topics(false, false).unwrap();
  stack.populate_reviews(&options("tester")).unwrap();

  let topic = &stack.topics["a"];
  assert!(topic.reviews["origin/main"].is_draft);
  let labels: Vec<&str> = topic.tags.values(TAG_LABEL).collect();
  assert_eq!(labels, vec!["bug"]);
}

#[test]
fn self_authored_only_drops_foreign_topics() {
  let test = base_repo();
  test.create_commit("mine\n\nTopic: mine", "m.txt", "1\n");
  test.create_commit_with_author("theirs\n\nTopic: theirs", "t.txt", "1\n", "Someone Else", "else@example.com");

  let mut stack = make_stack(&test);
  stack.populate_topics(false, false).unwrap();
  let mut opts = options("tester");
  opts.self_authored_only = true;
  stack.populate_reviews(&opts).unwrap();

  let names: Vec<&str> = stack.topics.keys().map(String::as_str).collect();
  assert_eq!(names, vec!["mine"]);
}

#[test]
fn limit_topics_keeps_transitive_relatives() {
  let test = base_repo();
  test.create_commit("one\n\nTopic: a", "a.txt", "1\n");
  test.create_commit("two\n\nTopic: b\nRelative: a", "b.txt", "1\n");
  test.create_commit("three\n\nTopic: c", "c.txt", "1\n");

  let mut stack = make_stack(&test);
  stack.populate_topics(false, false).unwrap();
  let mut opts = options("tester");
  opts.limit_topics = vec!["b".to_string()];
  stack.populate_reviews(&opts).unwrap();

  let names: Vec<&str> = stack.topics.keys().map(String::as_str).collect();
  assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn relative_chain_mode_links_each_topic_to_the_previous_one() {
  let test = base_repo();
  test.create_commit("one\n\nTopic: a", "a.txt", "1\n");
  test.create_commit("two\n\nTopic: b", "b.txt", "1\n");

  let mut stack = make_stack(&test);
  stack.populate_topics(false, false).unwrap();
  let mut opts = options("tester");
  opts.force_relative_chain = true;
  stack.populate_reviews(&opts).unwrap();

  assert_eq!(stack.topics["b"].relative_topic.as_deref(), Some("a"));
  assert_eq!(stack.topics["b"].reviews["origin/main"].remote_base, "tester/revup/main/a");
}
