use anyhow::{Context, Result, anyhow};
use config::{Config, File, FileFormat};
use stack_core::error::{RevupError, RevupResult};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = ".revupconfig";
pub const CONFIG_PATH_ENV_VAR: &str = "REVUP_CONFIG_PATH";

/// Layered flag defaults: the user-global file overlaid with the repo-local
/// one. Every long flag is addressable as `<command>.<flag>`, with global
/// flags under `[revup]`.
pub struct RevupConfig {
  cfg: Config,
  user_path: PathBuf,
  repo_path: PathBuf,
}

/// Path of the user-global config file.
pub fn user_config_path() -> PathBuf {
  if let Ok(path) = std::env::var(CONFIG_PATH_ENV_VAR) {
    return PathBuf::from(path);
  }
  let home = std::env::var("HOME").unwrap_or_default();
  Path::new(&home).join(CONFIG_FILE_NAME)
}

/// The config file holds credentials, so refuse to read one other users
/// can touch.
#[cfg(unix)]
fn enforce_permissions(path: &Path) -> RevupResult<()> {
  use std::os::unix::fs::MetadataExt;

  let Ok(metadata) = std::fs::metadata(path) else {
    return Ok(());
  };
  if metadata.mode() & 0o177 != 0 {
    return Err(RevupError::Usage(format!(
      "Permissions too loose on config file!\nTry `chmod 0600 {}`",
      path.display()
    )));
  }
  // The file must belong to whoever owns $HOME
  if let Ok(home) = std::env::var("HOME")
    && let Ok(home_metadata) = std::fs::metadata(&home)
    && metadata.uid() != home_metadata.uid()
  {
    return Err(RevupError::Usage("Config file is not owned by the current user!".to_string()));
  }
  Ok(())
}

#[cfg(not(unix))]
fn enforce_permissions(_path: &Path) -> RevupResult<()> {
  Ok(())
}

impl RevupConfig {
  pub fn load(repo_root: &str) -> RevupResult<Self> {
    let user_path = user_config_path();
    enforce_permissions(&user_path)?;
    let repo_path = Path::new(repo_root).join(CONFIG_FILE_NAME);

    let cfg = Config::builder()
      .add_source(File::from(user_path.clone()).format(FileFormat::Ini).required(false))
      .add_source(File::from(repo_path.clone()).format(FileFormat::Ini).required(false))
      .build()
      .map_err(|e| RevupError::Usage(format!("Failed to parse config: {e}")))?;

    Ok(Self { cfg, user_path, repo_path })
  }

  pub fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
    self.cfg.get_bool(&format!("{section}.{key}")).ok()
  }

  pub fn get_str(&self, section: &str, key: &str) -> Option<String> {
    self.cfg.get_string(&format!("{section}.{key}")).ok()
  }

  /// A string option resolved as CLI flag, then config, then default.
  pub fn resolve_str(&self, flag: &Option<String>, section: &str, key: &str, default: &str) -> String {
    flag
      .clone()
      .or_else(|| self.get_str(section, key))
      .unwrap_or_else(|| default.to_string())
  }

  /// Write or delete one key. `flag` is `<section>.<key>` or a bare key in
  /// the `[revup]` section.
  pub fn set(&self, flag: &str, value: Option<&str>, repo: bool, delete: bool) -> Result<()> {
    let (section, key) = match flag.split_once('.') {
      Some((section, key)) => (section.to_string(), key.to_string()),
      None => ("revup".to_string(), flag.to_string()),
    };

    let path = if repo { &self.repo_path } else { &self.user_path };
    let mut document = if path.exists() {
      ini::Ini::load_from_file(path).with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
      ini::Ini::new()
    };

    if delete {
      if let Some(properties) = document.section_mut(Some(section.as_str())) {
        properties.remove(&key);
      }
    } else {
      let value = value.ok_or_else(|| anyhow!("A value is required to set {section}.{key}"))?;
      document.with_section(Some(section.as_str())).set(key.as_str(), value);
    }

    document.write_to_file(path).with_context(|| format!("Failed to write {}", path.display()))?;
    restrict_permissions(path)?;
    debug!(path = %path.display(), "updated config");
    Ok(())
  }

  /// Read one key back, for `revup config <flag>` with no value.
  pub fn get_raw(&self, flag: &str) -> Option<String> {
    let (section, key) = match flag.split_once('.') {
      Some((section, key)) => (section, key),
      None => ("revup", flag),
    };
    self.get_str(section, key)
  }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
  use std::os::unix::fs::PermissionsExt;
  let metadata = std::fs::metadata(path)?;
  let mut permissions = metadata.permissions();
  permissions.set_mode(0o600);
  std::fs::set_permissions(path, permissions)?;
  Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn set_and_read_back_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let repo_root = dir.path().to_str().unwrap();
    let user_path = dir.path().join("userconfig");

    // Point the user config inside the temp dir
    unsafe { std::env::set_var(CONFIG_PATH_ENV_VAR, &user_path) };
    let cfg = RevupConfig::load(repo_root).unwrap();
    cfg.set("upload.skip_confirm", Some("true"), false, false).unwrap();
    cfg.set("remote_name", Some("upstream"), false, false).unwrap();

    let cfg = RevupConfig::load(repo_root).unwrap();
    assert_eq!(cfg.get_bool("upload", "skip_confirm"), Some(true));
    assert_eq!(cfg.get_str("revup", "remote_name").as_deref(), Some("upstream"));

    cfg.set("upload.skip_confirm", None, false, true).unwrap();
    let cfg = RevupConfig::load(repo_root).unwrap();
    assert_eq!(cfg.get_bool("upload", "skip_confirm"), None);
    unsafe { std::env::remove_var(CONFIG_PATH_ENV_VAR) };
  }

  #[test]
  #[serial]
  fn repo_config_overrides_user_config() {
    let dir = tempfile::tempdir().unwrap();
    let repo_root = dir.path().to_str().unwrap();
    let user_path = dir.path().join("userconfig");
    std::fs::write(&user_path, "[upload]\nrebase = false\n").unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[upload]\nrebase = true\n").unwrap();

    unsafe { std::env::set_var(CONFIG_PATH_ENV_VAR, &user_path) };
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      std::fs::set_permissions(&user_path, std::fs::Permissions::from_mode(0o600)).unwrap();
    }
    let cfg = RevupConfig::load(repo_root).unwrap();
    assert_eq!(cfg.get_bool("upload", "rebase"), Some(true));
    unsafe { std::env::remove_var(CONFIG_PATH_ENV_VAR) };
  }
}
