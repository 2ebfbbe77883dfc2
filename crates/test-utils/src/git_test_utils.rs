use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Git test repository wrapper with helper methods
pub struct TestRepo {
  dir: TempDir,
}

impl Default for TestRepo {
  fn default() -> Self {
    Self::new()
  }
}

impl TestRepo {
  /// Creates a new test repository with a deterministic identity
  pub fn new() -> Self {
    let dir = tempfile::tempdir().unwrap();
    let repo_path = dir.path();

    let output = Command::new("git").args(["init", "-q", "-b", "main"]).current_dir(repo_path).output().unwrap();
    if !output.status.success() {
      panic!("git init failed: {}", String::from_utf8_lossy(&output.stderr));
    }

    let repo = Self { dir };
    repo.set_config("user.name", "Test User").unwrap();
    repo.set_config("user.email", "test@example.com").unwrap();
    repo
  }

  /// Get the repository path
  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  fn git(&self, args: &[&str]) -> Result<String, String> {
    let output = Command::new("git").args(args).current_dir(self.path()).output().unwrap();
    if output.status.success() {
      Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
      Err(String::from_utf8_lossy(&output.stderr).to_string())
    }
  }

  /// Creates a commit with a single file
  pub fn create_commit(&self, message: &str, filename: &str, content: &str) -> String {
    self.create_commit_with_files(message, &[(filename, content)])
  }

  /// Creates a commit with multiple files
  pub fn create_commit_with_files(&self, message: &str, files: &[(&str, &str)]) -> String {
    for (filename, content) in files {
      let file_path = self.path().join(filename);
      if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent).unwrap();
      }
      fs::write(&file_path, content).unwrap();
      self.git(&["add", filename]).unwrap();
    }

    self.git(&["commit", "-q", "--allow-empty", "-m", message]).unwrap_or_else(|e| panic!("git commit failed: {e}"));
    self.head()
  }

  /// Creates a commit authored by someone other than the configured user
  pub fn create_commit_with_author(&self, message: &str, filename: &str, content: &str, name: &str, email: &str) -> String {
    let file_path = self.path().join(filename);
    fs::write(&file_path, content).unwrap();
    self.git(&["add", filename]).unwrap();

    let output = Command::new("git")
      .args(["commit", "-q", "-m", message])
      .env("GIT_AUTHOR_NAME", name)
      .env("GIT_AUTHOR_EMAIL", email)
      .current_dir(self.path())
      .output()
      .unwrap();
    if !output.status.success() {
      panic!("git commit failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    self.head()
  }

  /// Get the current HEAD commit hash
  pub fn head(&self) -> String {
    self.git(&["rev-parse", "HEAD"]).unwrap()
  }

  /// Get the commit hash of a reference
  pub fn rev_parse(&self, ref_name: &str) -> Result<String, String> {
    self.git(&["rev-parse", ref_name])
  }

  /// Creates a branch pointing to the current HEAD
  pub fn create_branch(&self, branch_name: &str) -> Result<(), String> {
    self.git(&["branch", branch_name]).map(|_| ())
  }

  /// Creates a branch pointing to a specific commit
  pub fn create_branch_at(&self, branch_name: &str, commit_hash: &str) -> Result<(), String> {
    self.git(&["branch", branch_name, commit_hash]).map(|_| ())
  }

  /// Point an arbitrary ref at a commit. Tests use this to fabricate
  /// remote-tracking refs like refs/remotes/origin/main without a network.
  pub fn update_ref(&self, ref_name: &str, commit_hash: &str) -> Result<(), String> {
    self.git(&["update-ref", ref_name, commit_hash]).map(|_| ())
  }

  /// Checkout a branch or commit
  pub fn checkout(&self, ref_name: &str) -> Result<(), String> {
    self.git(&["checkout", "-q", ref_name]).map(|_| ())
  }

  /// Hard reset to a commit
  pub fn reset_hard(&self, commit_hash: &str) -> Result<(), String> {
    self.git(&["reset", "--hard", "-q", commit_hash]).map(|_| ())
  }

  /// Stage a file without committing
  pub fn stage_file(&self, filename: &str, content: &str) {
    let file_path = self.path().join(filename);
    if let Some(parent) = file_path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&file_path, content).unwrap();
    self.git(&["add", filename]).unwrap();
  }

  /// Set config value
  pub fn set_config(&self, key: &str, value: &str) -> Result<(), String> {
    self.git(&["config", key, value]).map(|_| ())
  }

  /// Tree hash of a commit-ish
  pub fn tree_of(&self, ref_name: &str) -> String {
    self.git(&["rev-parse", &format!("{ref_name}^{{tree}}")]).unwrap()
  }
}
