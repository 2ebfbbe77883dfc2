use crate::error::GitError;
use crate::repo::{GitRepo, GitRepoOptions, RevListFlags};
use git_executor::git_command_executor::GitCommandExecutor;
use pretty_assertions::assert_eq;
use test_utils::git_test_utils::TestRepo;

fn make_repo(test: &TestRepo) -> GitRepo {
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

fn header_of(repo: &GitRepo, commit: &str) -> crate::commit_header::CommitHeader {
  let exclude = format!("{commit}~");
  repo.commit_headers(commit, Some(exclude.as_str()), RevListFlags::default()).unwrap().remove(0)
}

#[test]
fn synthetic_cherry_pick_reparents_and_keeps_metadata() {
  let test = TestRepo::new();
  test.create_commit("root", "a.txt", "a\n");
  let change = test.create_commit("add feature", "feature.txt", "feature\n");
  test.reset_hard(&format!("{change}~")).unwrap();
  let new_parent = test.create_commit("other work", "other.txt", "other\n");

  let repo = make_repo(&test);
  let picked = repo.synthetic_cherry_pick_from_commit(&header_of(&repo, &change), &new_parent).unwrap();

  let picked_header = header_of(&repo, &picked);
  assert_eq!(picked_header.parents, vec![new_parent.clone()]);
  assert_eq!(picked_header.title, "add feature");
  assert_eq!(picked_header.author_email, "test@example.com");

  // The result tree contains both sides of the merge
  let feature = repo.show_tree_file(&picked, "feature.txt").unwrap();
  assert_eq!(feature, "feature\n");
  let other = repo.show_tree_file(&picked, "other.txt").unwrap();
  assert_eq!(other, "other\n");

  // The working tree was not touched
  assert_eq!(test.head(), new_parent);
}

#[test]
fn conflicting_cherry_pick_reports_paths() {
  let test = TestRepo::new();
  test.create_commit("root", "shared.txt", "base\n");
  let change = test.create_commit("my version", "shared.txt", "mine\n");
  test.reset_hard(&format!("{change}~")).unwrap();
  let new_parent = test.create_commit("their version", "shared.txt", "theirs\n");

  let repo = make_repo(&test);
  let result = repo.synthetic_cherry_pick_from_commit(&header_of(&repo, &change), &new_parent);

  match result {
    Err(GitError::Conflict(info)) => {
      assert!(!info.tree.is_empty());
      assert!(info.conflicting_paths().contains(&"shared.txt"));
    }
    other => panic!("expected a conflict, got {other:?}"),
  }
}

#[test]
fn cherry_pick_from_tree_preserves_tree_exactly() {
  let test = TestRepo::new();
  test.create_commit("root", "a.txt", "a\n");
  let change = test.create_commit("tip", "b.txt", "b\n");
  test.reset_hard(&format!("{change}~")).unwrap();
  let new_parent = test.create_commit("sibling", "c.txt", "c\n");

  let repo = make_repo(&test);
  let header = header_of(&repo, &change);
  let picked = repo.cherry_pick_from_tree(&header, &new_parent).unwrap();

  assert_eq!(test.tree_of(&picked), header.tree);
  assert_eq!(header_of(&repo, &picked).parents, vec![new_parent]);
}

#[test]
fn synthetic_amend_folds_new_content_into_target() {
  let test = TestRepo::new();
  test.create_commit("root", "a.txt", "a\n");
  let target = test.create_commit("target commit", "target.txt", "v1\n");
  let amendment = test.create_commit("fixup content", "target.txt", "v2\n");

  let repo = make_repo(&test);
  let amended = repo.synthetic_amend(&header_of(&repo, &target), &header_of(&repo, &amendment)).unwrap();

  let content = repo.show_tree_file(&amended, "target.txt").unwrap();
  assert_eq!(content, "v2\n");
  let amended_header = header_of(&repo, &amended);
  assert_eq!(amended_header.title, "target commit");
}
