use std::process::Command;

#[derive(Debug, Clone)]
pub struct GitInfo {
  pub version: String,
  pub path: String,
}

impl GitInfo {
  // attempts to discover the git executable path and version
  pub fn discover() -> Result<Self, String> {
    Self::from_path(&default_git_path())
  }

  // creates GitInfo from a specific git path
  pub fn from_path(git_path: &str) -> Result<Self, String> {
    let output = Command::new(git_path)
      .arg("version")
      .output()
      .map_err(|e| format!("Could not run '{git_path} version': {e}"))?;
    if !output.status.success() {
      return Err(format!("'{git_path} version' failed: {}", String::from_utf8_lossy(&output.stderr)));
    }
    let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(Self {
      version: raw.strip_prefix("git version ").unwrap_or(&raw).to_string(),
      path: git_path.to_string(),
    })
  }

  /// Parse version string into (major, minor) tuple for comparison
  pub fn parse_version(&self) -> Result<(u32, u32), String> {
    let mut parts = self.version.split('.');
    let major = parts
      .next()
      .and_then(|v| v.parse::<u32>().ok())
      .ok_or_else(|| format!("Invalid git version format: {}", self.version))?;
    let minor = parts
      .next()
      .and_then(|v| v.split(|c: char| !c.is_ascii_digit()).next().unwrap_or("").parse::<u32>().ok())
      .ok_or_else(|| format!("Invalid git version format: {}", self.version))?;
    Ok((major, minor))
  }

  /// Check that the installed git supports `merge-tree --write-tree` and
  /// `rev-list --exclude-first-parent-only`, which landed in 2.38.
  pub fn validate_minimum_version(&self) -> Result<(), String> {
    const MIN_MAJOR: u32 = 2;
    const MIN_MINOR: u32 = 38;

    let (major, minor) = self.parse_version()?;
    if major < MIN_MAJOR || (major == MIN_MAJOR && minor < MIN_MINOR) {
      Err(format!(
        "git {major}.{minor} is too old, revup requires git {MIN_MAJOR}.{MIN_MINOR} or newer for tree-level merges"
      ))
    } else {
      Ok(())
    }
  }
}

fn default_git_path() -> String {
  std::env::var("REVUP_GIT_PATH").unwrap_or_else(|_| String::from("git"))
}
