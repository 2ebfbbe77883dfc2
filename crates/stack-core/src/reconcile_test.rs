use crate::stack::{ReviewOptions, TopicStack};
use crate::topic::{PrStatus, PushStatus};
use git_executor::git_command_executor::GitCommandExecutor;
use git_ops::commit_header::CommitHeader;
use git_ops::repo::{GitRepo, GitRepoOptions, RevListFlags};
use github_client::pr::PrInfo;
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

fn header_of(git: &GitRepo, commit: &str) -> CommitHeader {
  let exclude = format!("{commit}~");
  git.commit_headers(commit, Some(exclude.as_str()), RevListFlags::default()).unwrap().remove(0)
}

fn populated_stack(test: &TestRepo, uploader: &str) -> TopicStack {
  let mut stack = TopicStack::new(make_git(test), "main", "", "HEAD", None, None);
  stack.populate_topics(false, false).unwrap();
  stack
    .populate_reviews(&ReviewOptions {
      uploader: uploader.to_string(),
      ..Default::default()
    })
    .unwrap();
  stack
}

fn fake_pr(head_ref: &str, base_ref: &str, head_oid: &str, base_oid: &str, state: &str) -> PrInfo {
  PrInfo {
    base_ref: base_ref.to_string(),
    head_ref: head_ref.to_string(),
    base_ref_oid: base_oid.to_string(),
    head_ref_oid: head_oid.to_string(),
    id: format!("PR_{head_ref}"),
    url: format!("https://github.com/o/r/pull/{head_ref}"),
    state: state.to_string(),
    ..Default::default()
  }
}

#[tokio::test]
async fn unchanged_stack_is_classified_no_change() {
  let test = TestRepo::new();
  let root = test.create_commit("root", "base.txt", "base\n");
  test.update_ref("refs/remotes/origin/main", &root).unwrap();
  let c1 = test.create_commit("one\n\nTopic: a", "a.txt", "1\n");

  let mut stack = populated_stack(&test, "tester");
  let key = ("a".to_string(), "origin/main".to_string());
  stack.review_mut(&key).unwrap().pr_info = Some(fake_pr("tester/revup/main/a", "main", &c1, &root, "OPEN"));

  stack.mark_rebases(true).await.unwrap();

  let review = stack.review(&key).unwrap();
  assert!(review.is_pure_rebase);
  assert_eq!(review.push_status, PushStatus::NoChange);
  // Remote commit ids are copied in so dependents can pick onto them
  assert_eq!(review.new_commits, vec![c1]);
  assert_eq!(stack.num_reviews_changed(), 0);
}

#[tokio::test]
async fn pure_rebase_is_skipped_only_when_requested() {
  let test = TestRepo::new();
  let root = test.create_commit("root", "base.txt", "base\n");
  let c1_old = test.create_commit("one\n\nTopic: a", "a.txt", "1\n");

  // Upstream advanced and the user rebased onto it
  test.reset_hard(&root).unwrap();
  let base1 = test.create_commit("upstream", "u.txt", "u\n");
  test.update_ref("refs/remotes/origin/main", &base1).unwrap();
  let git = make_git(&test);
  let c1_new = git.synthetic_cherry_pick_from_commit(&header_of(&git, &c1_old), &base1).unwrap();
  test.reset_hard(&c1_new).unwrap();

  for (skip_rebase, expected) in [(true, PushStatus::Rebase), (false, PushStatus::Pushed)] {
    let mut stack = populated_stack(&test, "tester");
    let key = ("a".to_string(), "origin/main".to_string());
    stack.review_mut(&key).unwrap().pr_info = Some(fake_pr("tester/revup/main/a", "main", &c1_old, &root, "OPEN"));

    stack.mark_rebases(skip_rebase).await.unwrap();

    let review = stack.review(&key).unwrap();
    assert!(review.is_pure_rebase);
    assert_eq!(review.push_status, expected, "skip_rebase = {skip_rebase}");
  }
}

#[tokio::test]
async fn reworded_review_is_pushed_and_promotes_rebased_ancestors() {
  let test = TestRepo::new();
  let root = test.create_commit("root", "base.txt", "base\n");

  // The remote chain, as previously uploaded
  let a_old = test.create_commit("one\n\nTopic: a", "a.txt", "1\n");
  let b_old = test.create_commit("two\n\nTopic: b\nRelative: a", "b.txt", "1\n");
  let c_old = test.create_commit("three\n\nTopic: c\nRelative: b", "c.txt", "1\n");

  // Upstream advanced; the user rebased and reworded only topic c
  test.reset_hard(&root).unwrap();
  let base1 = test.create_commit("upstream", "u.txt", "u\n");
  test.update_ref("refs/remotes/origin/main", &base1).unwrap();

  let git = make_git(&test);
  let a_new = git.synthetic_cherry_pick_from_commit(&header_of(&git, &a_old), &base1).unwrap();
  let b_new = git.synthetic_cherry_pick_from_commit(&header_of(&git, &b_old), &a_new).unwrap();
  let mut c_header = header_of(&git, &c_old);
  c_header.set_message("three, reworded\n\nTopic: c\nRelative: b".to_string());
  let c_new = git.synthetic_cherry_pick_from_commit(&c_header, &b_new).unwrap();
  test.reset_hard(&c_new).unwrap();

  let mut stack = populated_stack(&test, "tester");
  let a_key = ("a".to_string(), "origin/main".to_string());
  let b_key = ("b".to_string(), "origin/main".to_string());
  let c_key = ("c".to_string(), "origin/main".to_string());
  stack.review_mut(&a_key).unwrap().pr_info = Some(fake_pr("tester/revup/main/a", "main", &a_old, &root, "OPEN"));
  stack.review_mut(&b_key).unwrap().pr_info = Some(fake_pr("tester/revup/main/b", "tester/revup/main/a", &b_old, &a_old, "OPEN"));
  stack.review_mut(&c_key).unwrap().pr_info = Some(fake_pr("tester/revup/main/c", "tester/revup/main/b", &c_old, &b_old, "OPEN"));

  stack.mark_rebases(true).await.unwrap();

  // c changed content-wise not at all, but its message did
  let c = stack.review(&c_key).unwrap();
  assert!(!c.is_pure_rebase);
  assert_eq!(c.push_status, PushStatus::Pushed);

  // The ancestors were pure rebases, but pushing c forces them out too
  assert_eq!(stack.review(&a_key).unwrap().push_status, PushStatus::Pushed);
  assert_eq!(stack.review(&b_key).unwrap().push_status, PushStatus::Pushed);
}

#[tokio::test]
async fn merged_relative_topic_collapses_remote_base() {
  let test = TestRepo::new();
  let root = test.create_commit("root", "base.txt", "base\n");
  test.update_ref("refs/remotes/origin/main", &root).unwrap();
  let a1 = test.create_commit("one\n\nTopic: a", "a.txt", "1\n");
  let b1 = test.create_commit("two\n\nTopic: b\nRelative: a", "b.txt", "1\n");

  let mut stack = populated_stack(&test, "tester");
  let a_key = ("a".to_string(), "origin/main".to_string());
  let b_key = ("b".to_string(), "origin/main".to_string());
  stack.review_mut(&a_key).unwrap().pr_info = Some(fake_pr("tester/revup/main/a", "main", &a1, &root, "MERGED"));
  stack.review_mut(&a_key).unwrap().status = PrStatus::Merged;
  stack.review_mut(&b_key).unwrap().pr_info = Some(fake_pr("tester/revup/main/b", "tester/revup/main/a", &b1, &a1, "OPEN"));

  stack.mark_rebases(true).await.unwrap();

  // b no longer points at a's head; it targets the base branch directly
  assert_eq!(stack.review(&b_key).unwrap().remote_base, "main");
  assert_eq!(stack.review(&a_key).unwrap().status, PrStatus::Merged);
}

#[tokio::test]
async fn pr_merged_into_unexpected_base_becomes_new() {
  let test = TestRepo::new();
  let root = test.create_commit("root", "base.txt", "base\n");
  test.update_ref("refs/remotes/origin/main", &root).unwrap();
  let a1 = test.create_commit("one\n\nTopic: a", "a.txt", "1\n");

  let mut stack = populated_stack(&test, "tester");
  let key = ("a".to_string(), "origin/main".to_string());
  stack.review_mut(&key).unwrap().pr_info = Some(fake_pr("tester/revup/main/a", "some-other-branch", &a1, &root, "MERGED"));
  stack.review_mut(&key).unwrap().status = PrStatus::Merged;

  stack.mark_rebases(true).await.unwrap();

  assert_eq!(stack.review(&key).unwrap().status, PrStatus::New);
}
