use crate::git_info::GitInfo;
use anyhow::{Result, anyhow};
use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// Runs git subcommands in a repository without ever touching the working
/// tree or the user's index. All durable object writes go through here.
#[derive(Clone, Debug)]
pub struct GitCommandExecutor {
  info: Arc<Mutex<Option<GitInfo>>>,
}

impl Default for GitCommandExecutor {
  fn default() -> Self {
    Self::new()
  }
}

impl GitCommandExecutor {
  #[must_use]
  pub fn new() -> Self {
    Self { info: Arc::new(Mutex::new(None)) }
  }

  /// Use a specific git binary instead of discovering one on PATH.
  pub fn with_git_path(git_path: &str) -> Result<Self> {
    let info = GitInfo::from_path(git_path).map_err(|e| anyhow!(e))?;
    info.validate_minimum_version().map_err(|e| anyhow!(e))?;
    Ok(Self {
      info: Arc::new(Mutex::new(Some(info))),
    })
  }

  #[instrument(skip(self))]
  pub fn get_info(&self) -> Result<GitInfo> {
    let mut guard = self.info.lock().map_err(|e| anyhow!("Failed to acquire git info lock: {e}"))?;
    if guard.is_none() {
      let info = GitInfo::discover().map_err(|e| anyhow!(e))?;
      info.validate_minimum_version().map_err(|e| anyhow!(e))?;
      tracing::debug!(git_version = %info.version, git_path = %info.path, "discovered git");
      *guard = Some(info);
    }
    guard.as_ref().ok_or_else(|| anyhow!("git info should be initialized")).cloned()
  }

  fn validate_path(repository_path: &str) -> Result<()> {
    if repository_path.is_empty() {
      Err(anyhow!("repository path cannot be blank"))
    } else {
      Ok(())
    }
  }

  fn command_failure<T>(&self, output: &Output, args: &[&str]) -> Result<T> {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    tracing::Span::current().record("success", false);
    tracing::debug!(stderr = %stderr, "git command failed");
    Err(anyhow!("git {} failed with code {}\n{stderr}", args.join(" "), output.status.code().unwrap_or(-1)))
  }

  fn trimmed_stdout(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    tracing::Span::current().record("success", true);
    stdout
  }

  fn run(&self, args: &[&str], repository_path: &str, env_vars: &[(&str, &str)], input: Option<&str>) -> Result<Output> {
    Self::validate_path(repository_path)?;
    let git_info = self.get_info()?;

    let mut cmd = Command::new(&git_info.path);
    cmd.args(args).current_dir(repository_path);
    for (key, value) in env_vars {
      cmd.env(key, value);
    }

    if let Some(input) = input {
      cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
      let mut child = cmd.spawn().map_err(|e| anyhow!("Failed to spawn git: {e}"))?;
      if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).map_err(|e| anyhow!("Failed to write git stdin: {e}"))?;
      }
      child.wait_with_output().map_err(|e| anyhow!("Failed to wait for git: {e}"))
    } else {
      cmd.output().map_err(|e| anyhow!("Failed to execute git: {e}"))
    }
  }

  /// Run git and return trimmed stdout, failing on a nonzero exit.
  #[instrument(
    skip(self),
    fields(
      git_command = args.join(" "),
      repository_path = repository_path,
      success = tracing::field::Empty,
    )
  )]
  pub fn execute_command(&self, args: &[&str], repository_path: &str) -> Result<String> {
    let output = self.run(args, repository_path, &[], None)?;
    if output.status.success() {
      Ok(Self::trimmed_stdout(&output))
    } else {
      self.command_failure(&output, args)
    }
  }

  /// Run git and return raw untrimmed stdout. Used when exact formatting
  /// matters, e.g. diff output that gets piped into `git patch-id`.
  #[instrument(
    skip(self),
    fields(
      git_command = args.join(" "),
      repository_path = repository_path,
      success = tracing::field::Empty,
    )
  )]
  pub fn execute_command_raw(&self, args: &[&str], repository_path: &str) -> Result<String> {
    let output = self.run(args, repository_path, &[], None)?;
    if output.status.success() {
      tracing::Span::current().record("success", true);
      Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
      self.command_failure(&output, args)
    }
  }

  /// Run git and return (stdout, exit code) without treating a nonzero exit
  /// as an error. `merge-tree --write-tree` reports conflicts via exit 1 and
  /// `rev-parse --verify --quiet` probes refs this way.
  #[instrument(
    skip(self),
    fields(
      git_command = args.join(" "),
      repository_path = repository_path,
      success = tracing::field::Empty,
    )
  )]
  pub fn execute_command_with_status(&self, args: &[&str], repository_path: &str) -> Result<(String, i32)> {
    let output = self.run(args, repository_path, &[], None)?;
    let exit_code = output.status.code().unwrap_or(-1);
    tracing::Span::current().record("success", output.status.success());
    if output.status.success() {
      Ok((Self::trimmed_stdout(&output), exit_code))
    } else {
      let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      tracing::debug!(stderr = %stderr, exit_code, "git command exited nonzero");
      Ok((stdout, exit_code))
    }
  }

  /// Run git with text piped to stdin.
  #[instrument(
    skip(self, input),
    fields(
      git_command = args.join(" "),
      repository_path = repository_path,
      input_length = input.len(),
      success = tracing::field::Empty,
    )
  )]
  pub fn execute_command_with_input(&self, args: &[&str], repository_path: &str, input: &str) -> Result<String> {
    let output = self.run(args, repository_path, &[], Some(input))?;
    if output.status.success() {
      Ok(Self::trimmed_stdout(&output))
    } else {
      self.command_failure(&output, args)
    }
  }

  /// Run git with extra environment variables (commit identity, alternate
  /// index file, reflog action).
  #[instrument(
    skip(self, env_vars),
    fields(
      git_command = args.join(" "),
      repository_path = repository_path,
      success = tracing::field::Empty,
    )
  )]
  pub fn execute_command_with_env(&self, args: &[&str], repository_path: &str, env_vars: &[(&str, &str)]) -> Result<String> {
    let output = self.run(args, repository_path, env_vars, None)?;
    if output.status.success() {
      Ok(Self::trimmed_stdout(&output))
    } else {
      self.command_failure(&output, args)
    }
  }

  /// Run git with both extra environment variables and piped stdin.
  /// `update-index --index-info` against a scratch GIT_INDEX_FILE needs this.
  #[instrument(
    skip(self, env_vars, input),
    fields(
      git_command = args.join(" "),
      repository_path = repository_path,
      input_length = input.len(),
      success = tracing::field::Empty,
    )
  )]
  pub fn execute_command_with_env_and_input(&self, args: &[&str], repository_path: &str, env_vars: &[(&str, &str)], input: &str) -> Result<String> {
    let output = self.run(args, repository_path, env_vars, Some(input))?;
    if output.status.success() {
      Ok(Self::trimmed_stdout(&output))
    } else {
      self.command_failure(&output, args)
    }
  }

  /// Run git and return stdout as trimmed non-empty lines.
  #[instrument(
    skip(self),
    fields(
      git_command = args.join(" "),
      repository_path = repository_path,
      success = tracing::field::Empty,
    )
  )]
  pub fn execute_command_lines(&self, args: &[&str], repository_path: &str) -> Result<Vec<String>> {
    let output = self.execute_command_raw(args, repository_path)?;
    Ok(output.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
  }
}
