use crate::stack::TopicStack;
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

fn populated_stack(test: &TestRepo) -> TopicStack {
  let mut stack = TopicStack::new(make_git(test), "main", "", "HEAD", None, None);
  stack.populate_topics(false, false).unwrap();
  stack
}

#[test]
fn interleaved_topics_become_contiguous() {
  let test = TestRepo::new();
  test.create_commit("root", "base.txt", "base\n");
  test.update_ref("refs/remotes/origin/main", &test.head()).unwrap();
  test.create_commit("a one\n\nTopic: a", "a.txt", "1\n");
  test.create_commit("b one\n\nTopic: b", "b.txt", "1\n");
  test.create_commit("a two\n\nTopic: a", "a.txt", "2\n");

  let original_tree = test.tree_of("HEAD");
  let mut stack = populated_stack(&test);
  let new_head = stack.restack(false).unwrap();

  assert_eq!(test.head(), new_head);
  let git = make_git(&test);
  let titles = git
    .commit_headers("HEAD", Some("origin/main"), Default::default())
    .unwrap()
    .iter()
    .map(|h| h.title.clone())
    .collect::<Vec<_>>();
  assert_eq!(titles, vec!["a one", "a two", "b one"]);

  // The final tree is unchanged by regrouping
  assert_eq!(git.tree_hash(&new_head).unwrap(), original_tree);
}

#[test]
fn topicless_commits_can_go_first_or_last() {
  for (topicless_last, expected) in [
    (false, vec!["no topic", "a one"]),
    (true, vec!["a one", "no topic"]),
  ] {
    let test = TestRepo::new();
    test.create_commit("root", "base.txt", "base\n");
    test.update_ref("refs/remotes/origin/main", &test.head()).unwrap();
    test.create_commit("a one\n\nTopic: a", "a.txt", "1\n");
    test.create_commit("no topic", "n.txt", "1\n");

    let mut stack = populated_stack(&test);
    stack.restack(topicless_last).unwrap();

    let git = make_git(&test);
    let titles = git
      .commit_headers("HEAD", Some("origin/main"), Default::default())
      .unwrap()
      .iter()
      .map(|h| h.title.clone())
      .collect::<Vec<_>>();
    assert_eq!(titles, expected, "topicless_last = {topicless_last}");
  }
}

#[test]
fn restack_is_a_fixed_point() {
  let test = TestRepo::new();
  test.create_commit("root", "base.txt", "base\n");
  test.update_ref("refs/remotes/origin/main", &test.head()).unwrap();
  test.create_commit("a one\n\nTopic: a", "a.txt", "1\n");
  test.create_commit("b one\n\nTopic: b", "b.txt", "1\n");

  let mut stack = populated_stack(&test);
  let first_head = stack.restack(false).unwrap();

  let mut second = populated_stack(&test);
  let second_head = second.restack(false).unwrap();
  assert_eq!(first_head, second_head);
}

#[test]
fn empty_commits_are_dropped() {
  let test = TestRepo::new();
  test.create_commit("root", "base.txt", "base\n");
  test.update_ref("refs/remotes/origin/main", &test.head()).unwrap();
  test.create_commit_with_files("merged away\n\nTopic: merged", &[]);
  test.create_commit("real work\n\nTopic: real", "r.txt", "1\n");

  let mut stack = populated_stack(&test);
  stack.restack(false).unwrap();

  let git = make_git(&test);
  let titles = git
    .commit_headers("HEAD", Some("origin/main"), Default::default())
    .unwrap()
    .iter()
    .map(|h| h.title.clone())
    .collect::<Vec<_>>();
  assert_eq!(titles, vec!["real work"]);
}
