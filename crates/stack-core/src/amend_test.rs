use crate::amend::{apply_amend, parse_ref_or_topic};
use crate::error::RevupError;
use crate::stack::TopicStack;
use git_executor::git_command_executor::GitCommandExecutor;
use git_ops::repo::{GitRepo, GitRepoOptions, RevListFlags};
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

fn stack_between(git: &GitRepo, commit: &str) -> Vec<git_ops::commit_header::CommitHeader> {
  let exclude = format!("{commit}~");
  git
    .commit_headers(
      "HEAD",
      Some(exclude.as_str()),
      RevListFlags {
        first_parent: true,
        exclude_first_parent: true,
        ..Default::default()
      },
    )
    .unwrap()
}

#[test]
fn staged_changes_are_folded_into_a_mid_stack_commit() {
  let test = TestRepo::new();
  test.create_commit("root", "base.txt", "base\n");
  test.update_ref("refs/remotes/origin/main", &test.head()).unwrap();
  let target = test.create_commit("target", "target.txt", "v1\n");
  test.create_commit("later work", "later.txt", "l\n");

  // Stage a change to the target commit's file
  test.stage_file("target.txt", "v2\n");

  let git = make_git(&test);
  let mut stack = stack_between(&git, &target);
  assert_eq!(stack.len(), 2);
  let new_head = apply_amend(&git, &mut stack, true, false).unwrap();

  // The target commit now carries the staged content, later work is intact
  let amended_target = git.to_commit_hash(&format!("{new_head}~")).unwrap();
  assert_eq!(git.show_tree_file(&amended_target, "target.txt").unwrap(), "v2\n");
  assert_eq!(git.show_tree_file(&new_head, "later.txt").unwrap(), "l\n");

  // The final tree equals the staged state
  assert_eq!(git.tree_hash(&new_head).unwrap(), git.write_index_tree().unwrap());
}

#[test]
fn dropping_a_commit_removes_it_from_the_chain() {
  let test = TestRepo::new();
  test.create_commit("root", "base.txt", "base\n");
  test.update_ref("refs/remotes/origin/main", &test.head()).unwrap();
  let target = test.create_commit("drop me", "dropped.txt", "d\n");
  test.create_commit("keeper", "keeper.txt", "k\n");

  let git = make_git(&test);
  let mut stack = stack_between(&git, &target);
  let new_head = apply_amend(&git, &mut stack, true, true).unwrap();

  let titles: Vec<String> = git
    .commit_headers(&new_head, Some("origin/main"), Default::default())
    .unwrap()
    .iter()
    .map(|h| h.title.clone())
    .collect();
  assert_eq!(titles, vec!["keeper"]);
  // The dropped file is gone from the final tree
  assert!(git.show_tree_file(&new_head, "dropped.txt").is_err());
}

#[test]
fn text_only_amend_reuses_trees() {
  let test = TestRepo::new();
  test.create_commit("root", "base.txt", "base\n");
  test.update_ref("refs/remotes/origin/main", &test.head()).unwrap();
  let target = test.create_commit("original message", "a.txt", "a\n");
  let original_tree = test.tree_of(&target);

  let git = make_git(&test);
  let mut stack = stack_between(&git, &target);
  stack[0].set_message("better message".to_string());
  let new_head = apply_amend(&git, &mut stack, false, false).unwrap();

  assert_eq!(git.tree_hash(&new_head).unwrap(), original_tree);
  let exclude = format!("{new_head}~");
  let header = git.commit_headers(&new_head, Some(exclude.as_str()), Default::default()).unwrap().remove(0);
  assert_eq!(header.title, "better message");
}

#[test]
fn ref_or_topic_resolution() {
  let test = TestRepo::new();
  test.create_commit("root", "base.txt", "base\n");
  test.update_ref("refs/remotes/origin/main", &test.head()).unwrap();
  let a1 = test.create_commit("one\n\nTopic: alpha", "a.txt", "1\n");
  test.create_commit("two\n\nTopic: alpha", "a.txt", "2\n");

  let git = make_git(&test);
  let mut topics = TopicStack::new(git.clone(), "main", "", "HEAD", None, None);

  // A plain ref resolves as itself
  assert_eq!(parse_ref_or_topic(&mut topics, "HEAD", true, true).unwrap(), "HEAD");

  // A topic resolves to its last commit, modifiers pass through
  let resolved = parse_ref_or_topic(&mut topics, "alpha~", true, true).unwrap();
  assert_eq!(git.to_commit_hash(&resolved).unwrap(), a1);

  match parse_ref_or_topic(&mut topics, "not-a-thing", true, true) {
    Err(RevupError::Usage(message)) => assert!(message.contains("not a valid topic, commit, or branch name")),
    other => panic!("expected usage error, got {other:?}"),
  }
}
