use crate::git_command_executor::GitCommandExecutor;
use std::process::Command;
use tempfile::TempDir;

fn init_repo() -> TempDir {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path();
  assert!(Command::new("git").args(["init", "-q"]).current_dir(path).status().unwrap().success());
  assert!(Command::new("git").args(["config", "user.name", "Test User"]).current_dir(path).status().unwrap().success());
  assert!(
    Command::new("git")
      .args(["config", "user.email", "test@example.com"])
      .current_dir(path)
      .status()
      .unwrap()
      .success()
  );
  dir
}

#[test]
fn rejects_blank_repository_path() {
  let executor = GitCommandExecutor::new();
  assert!(executor.execute_command(&["status"], "").is_err());
}

#[test]
fn captures_trimmed_stdout() {
  let dir = init_repo();
  let executor = GitCommandExecutor::new();
  let out = executor.execute_command(&["rev-parse", "--is-inside-work-tree"], dir.path().to_str().unwrap()).unwrap();
  assert_eq!(out, "true");
}

#[test]
fn status_variant_reports_exit_code_without_error() {
  let dir = init_repo();
  let executor = GitCommandExecutor::new();
  let (_, code) = executor
    .execute_command_with_status(&["rev-parse", "--verify", "--quiet", "no-such-ref"], dir.path().to_str().unwrap())
    .unwrap();
  assert_ne!(code, 0);
}

#[test]
fn env_vars_reach_the_subprocess() {
  let dir = init_repo();
  let path = dir.path().to_str().unwrap();
  let executor = GitCommandExecutor::new();
  let empty_tree = executor.execute_command(&["hash-object", "-t", "tree", "/dev/null"], path).unwrap();
  let commit = executor
    .execute_command_with_env(
      &["commit-tree", &empty_tree, "-m", "root"],
      path,
      &[
        ("GIT_AUTHOR_NAME", "Someone Else"),
        ("GIT_AUTHOR_EMAIL", "else@example.com"),
        ("GIT_AUTHOR_DATE", "1700000000 +0000"),
        ("GIT_COMMITTER_NAME", "Someone Else"),
        ("GIT_COMMITTER_EMAIL", "else@example.com"),
        ("GIT_COMMITTER_DATE", "1700000000 +0000"),
      ],
    )
    .unwrap();
  let author = executor.execute_command(&["log", "-1", "--format=%an <%ae>", &commit], path).unwrap();
  assert_eq!(author, "Someone Else <else@example.com>");
}

#[test]
fn input_is_piped_to_stdin() {
  let dir = init_repo();
  let path = dir.path().to_str().unwrap();
  let executor = GitCommandExecutor::new();
  let oid = executor.execute_command_with_input(&["hash-object", "-w", "--stdin"], path, "contents\n").unwrap();
  let readback = executor.execute_command(&["cat-file", "blob", &oid], path).unwrap();
  assert_eq!(readback, "contents");
}
