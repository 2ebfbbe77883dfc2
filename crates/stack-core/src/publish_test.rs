use crate::publish::{PATCHSETS_FIRST_LINE, REVIEW_GRAPH_FIRST_LINE};
use crate::stack::{ReviewOptions, TopicStack};
use crate::topic::PushStatus;
use git_executor::git_command_executor::GitCommandExecutor;
use git_ops::repo::{GitRepo, GitRepoOptions};
use github_client::pr::RepoInfo;
use github_client::testing::StaticEndpoint;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::process::Command;
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

fn repo_info() -> RepoInfo {
  RepoInfo {
    owner: "owner".to_string(),
    name: "repo".to_string(),
  }
}

fn add_bare_remote(test: &TestRepo) -> tempfile::TempDir {
  let remote_dir = tempfile::tempdir().unwrap();
  let status = Command::new("git")
    .args(["init", "-q", "--bare"])
    .current_dir(remote_dir.path())
    .status()
    .unwrap();
  assert!(status.success());
  let status = Command::new("git")
    .args(["remote", "add", "origin", remote_dir.path().to_str().unwrap()])
    .current_dir(test.path())
    .status()
    .unwrap();
  assert!(status.success());
  remote_dir
}

fn remote_ref(remote_dir: &tempfile::TempDir, name: &str) -> Option<String> {
  let output = Command::new("git")
    .args(["--git-dir", remote_dir.path().to_str().unwrap(), "rev-parse", "--verify", "--quiet", name])
    .output()
    .unwrap();
  if output.status.success() {
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
  } else {
    None
  }
}

fn empty_pr_connection() -> serde_json::Value {
  json!({ "nodes": [], "totalCount": 0 })
}

/// First upload of a linear three-topic stack: three PRs created, chained
/// bases, one atomic push with three refspecs, review-graph and patchsets
/// comments added.
#[tokio::test]
async fn linear_stack_first_upload() {
  let test = TestRepo::new();
  test.create_commit("root", "base.txt", "base\n");
  test.update_ref("refs/remotes/origin/main", &test.head()).unwrap();
  let remote_dir = add_bare_remote(&test);
  test.create_commit("one\n\nTopic: a", "a.txt", "1\n");
  test.create_commit("two\n\nTopic: b\nRelative: a", "b.txt", "1\n");
  test.create_commit("three\n\nTopic: c\nRelative: b", "c.txt", "1\n");

  let mut stack = TopicStack::new(make_git(&test), "main", "", "HEAD", Some(repo_info()), Some(repo_info()));
  stack.populate_topics(false, false).unwrap();
  stack
    .populate_reviews(&ReviewOptions {
      uploader: "tester".to_string(),
      ..Default::default()
    })
    .unwrap();

  let ep = StaticEndpoint::new(vec![
    // Query: no PRs exist yet, no labels found
    json!({ "data": { "repository": {
      "id": "R_repo",
      "pr_out0": empty_pr_connection(),
      "pr_out1": empty_pr_connection(),
      "pr_out2": empty_pr_connection(),
      "label_out0": null,
    } } }),
    // Creation succeeds for all three
    json!({ "data": {
      "pr_out0": { "pullRequest": { "id": "PR_a", "url": "https://github.com/owner/repo/pull/1" } },
      "pr_out1": { "pullRequest": { "id": "PR_b", "url": "https://github.com/owner/repo/pull/2" } },
      "pr_out2": { "pullRequest": { "id": "PR_c", "url": "https://github.com/owner/repo/pull/3" } },
    } }),
    // Update acknowledges
    json!({ "data": {} }),
  ]);

  stack.query_github(&ep).await.unwrap();
  stack.fetch_git_refs(true).unwrap();
  stack.mark_rebases(true).await.unwrap();
  stack.create_commits(false).unwrap();
  stack.populate_update_info(true).unwrap();
  assert_eq!(stack.num_reviews_changed(), 3);

  stack.populate_patchsets().unwrap();
  stack.push_git_refs("tester", false, true).unwrap();

  // Exactly the three review heads exist on the remote
  let a_key = ("a".to_string(), "origin/main".to_string());
  let b_key = ("b".to_string(), "origin/main".to_string());
  let c_key = ("c".to_string(), "origin/main".to_string());
  for (key, branch) in [(&a_key, "tester/revup/main/a"), (&b_key, "tester/revup/main/b"), (&c_key, "tester/revup/main/c")] {
    let pushed = remote_ref(&remote_dir, &format!("refs/heads/{branch}"));
    let expected = stack.review(key).unwrap().new_commits.last().cloned();
    assert_eq!(pushed, expected, "wrong remote head for {branch}");
  }
  assert!(remote_ref(&remote_dir, "refs/heads/tester/revup/virtual_diff_targets").is_none());

  stack.create_prs(&ep).await.unwrap();
  stack.populate_review_graph().unwrap();
  stack.update_prs(&ep).await.unwrap();

  // PR b sits on a's remote head, c on b's
  assert_eq!(stack.review(&b_key).unwrap().remote_base, "tester/revup/main/a");
  assert_eq!(stack.review(&c_key).unwrap().remote_base, "tester/revup/main/b");

  // One query, one create, one update
  assert_eq!(ep.executed_count(), 3);
  let executed = ep.executed();

  let (create_query, create_vars) = &executed[1];
  assert!(create_query.contains("pr_out2: createPullRequest(input: $pr2)"));
  assert_eq!(create_vars["pr0"]["headRefName"], "tester/revup/main/a");
  assert_eq!(create_vars["pr1"]["baseRefName"], "tester/revup/main/a");
  assert_eq!(create_vars["pr2"]["baseRefName"], "tester/revup/main/b");

  let (update_query, update_vars) = &executed[2];
  assert!(update_query.contains("addComment"));
  // Each PR gets a review graph comment followed by a patchsets comment
  let graph_body = update_vars["com0"]["body"].as_str().unwrap();
  assert!(graph_body.starts_with(REVIEW_GRAPH_FIRST_LINE));
  assert!(graph_body.contains("**https://github.com/owner/repo/pull/1**"));
  assert!(graph_body.contains("https://github.com/owner/repo/pull/3"));
  let patchsets_body = update_vars["com1"]["body"].as_str().unwrap();
  assert!(patchsets_body.starts_with(PATCHSETS_FIRST_LINE));
  assert!(patchsets_body.contains("| 0 |"));
}

/// Re-running upload with no local changes produces zero pushes and zero
/// mutations.
#[tokio::test]
async fn no_op_reupload_is_quiet() {
  let test = TestRepo::new();
  let root = test.create_commit("root", "base.txt", "base\n");
  test.update_ref("refs/remotes/origin/main", &root).unwrap();
  let a1 = test.create_commit("one\n\nTopic: a", "a.txt", "1\n");

  let mut stack = TopicStack::new(make_git(&test), "main", "", "HEAD", Some(repo_info()), Some(repo_info()));
  stack.populate_topics(false, false).unwrap();
  stack
    .populate_reviews(&ReviewOptions {
      uploader: "tester".to_string(),
      ..Default::default()
    })
    .unwrap();

  let graph_comment = format!("{REVIEW_GRAPH_FIRST_LINE}└**https://github.com/owner/repo/pull/1** **one**\n");
  let ep = StaticEndpoint::new(vec![json!({ "data": { "repository": {
    "id": "R_repo",
    "pr_out0": { "nodes": [ {
      "id": "PR_a",
      "state": "OPEN",
      "url": "https://github.com/owner/repo/pull/1",
      "baseRefName": "main",
      "headRefOid": a1,
      "body": "Topic: a",
      "title": "one",
      "isDraft": false,
      "updatedAt": "2024-01-01T00:00:00Z",
      "commits": { "nodes": [ { "commit": { "parents": { "nodes": [ { "oid": root } ] } } } ] },
      "reviewRequests": { "nodes": [] },
      "latestReviews": { "nodes": [] },
      "assignees": { "nodes": [] },
      "labels": { "nodes": [] },
      "comments": { "nodes": [ { "body": graph_comment, "id": "C_graph" } ] }
    } ], "totalCount": 1 },
    "label_out0": null,
  } } })]);

  stack.query_github(&ep).await.unwrap();
  stack.fetch_git_refs(true).unwrap();
  stack.mark_rebases(true).await.unwrap();
  stack.create_commits(false).unwrap();
  stack.populate_update_info(true).unwrap();
  assert_eq!(stack.num_reviews_changed(), 0);

  stack.populate_patchsets().unwrap();
  // No remote is configured, so this would fail if any refspec was pushed
  stack.push_git_refs("tester", false, true).unwrap();
  stack.create_prs(&ep).await.unwrap();
  stack.populate_review_graph().unwrap();
  stack.update_prs(&ep).await.unwrap();

  let key = ("a".to_string(), "origin/main".to_string());
  assert_eq!(stack.review(&key).unwrap().push_status, PushStatus::NoChange);
  // Only the initial query went over the wire
  assert_eq!(ep.executed_count(), 1);
}
