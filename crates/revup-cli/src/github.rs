use crate::logging;
use git_ops::repo::GitRepo;
use github_client::endpoint::RealGitHubEndpoint;
use github_client::pr::RepoInfo;
use stack_core::error::{RevupError, RevupResult};
use tracing::debug;

/// Everything needed to talk to the review platform for one invocation.
pub struct GitHubConnection {
  pub endpoint: RealGitHubEndpoint,
  pub repo_info: RepoInfo,
  pub fork_info: RepoInfo,
}

/// Resolve repo identity and credentials, preferring the explicit flag or
/// config value, then $GITHUB_TOKEN, then the git credential helper.
pub fn connect(
  git: &GitRepo,
  github_url: &str,
  remote_name: &str,
  fork_name: &str,
  oauth_flag: Option<String>,
  proxy: Option<&str>,
) -> RevupResult<GitHubConnection> {
  let repo_info = git
    .github_repo_info(github_url, remote_name)?
    .map(|info| RepoInfo {
      owner: info.owner,
      name: info.name,
    })
    .ok_or_else(|| {
      RevupError::Usage(format!(
        "Configured remote \"{remote_name}\" does not point to a github repository! You can set it \
         manually by running `git remote set-url {remote_name} git@{github_url}:{{OWNER}}/{{PROJECT}}` \
         or change the configured remote in .revupconfig."
      ))
    })?;

  let fork_info = if !fork_name.is_empty() && fork_name != remote_name {
    git
      .github_repo_info(github_url, fork_name)?
      .map(|info| RepoInfo {
        owner: info.owner,
        name: info.name,
      })
      .ok_or_else(|| RevupError::Usage(format!("Configured remote fork \"{fork_name}\" does not point to a github repository!")))?
  } else {
    repo_info.clone()
  };

  if repo_info.name != fork_info.name {
    return Err(RevupError::Usage(format!(
      "Configured remote fork \"{fork_name}\" is not the same repo as the remote {remote_name}."
    )));
  }

  let mut token = oauth_flag.unwrap_or_default();
  if token.is_empty() {
    if let Ok(env_token) = std::env::var("GITHUB_TOKEN") {
      token = env_token;
      if !token.is_empty() {
        logging::redact(&token, "<GITHUB_OAUTH>");
        debug!("Used GitHub token from environment variable");
      }
    }
  }
  if token.is_empty() {
    if let Some(credential) = credential_helper_token(git, github_url, &fork_info)? {
      token = credential;
      logging::redact(&token, "<GITHUB_OAUTH>");
      debug!("Used credential from git-credential");
    }
  }
  if token.is_empty() {
    return Err(RevupError::Usage(
      "No Github OAuth token found! Set the GITHUB_TOKEN environment variable, login with \
       'gh auth login', or make one at https://github.com/settings/tokens/new (revup needs full \
       repo permissions) then set it with `revup config github_oauth`."
        .to_string(),
    ));
  }

  let endpoint = RealGitHubEndpoint::new(token, github_url, proxy)?;
  Ok(GitHubConnection {
    endpoint,
    repo_info,
    fork_info,
  })
}

/// Ask the configured git credential helper for a token.
fn credential_helper_token(git: &GitRepo, github_url: &str, repo: &RepoInfo) -> RevupResult<Option<String>> {
  let input = format!("protocol=https\nhost={github_url}\npath={}/{}.git\n\n", repo.owner, repo.name);
  let output = git
    .executor()
    .execute_command_with_input(&["credential", "fill"], &git.repo_root, &input);
  let Ok(output) = output else {
    return Ok(None);
  };
  for line in output.lines() {
    if let Some(password) = line.strip_prefix("password=") {
      if password.is_empty() {
        return Ok(None);
      }
      return Ok(Some(password.to_string()));
    }
  }
  Ok(None)
}
