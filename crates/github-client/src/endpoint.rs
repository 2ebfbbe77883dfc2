use anyhow::anyhow;
use backoff::ExponentialBackoffBuilder;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by the GraphQL transport. Distinct variants map to
/// distinct exit codes in the CLI.
#[derive(Debug, Error)]
pub enum GitHubError {
  /// The endpoint answered but the GraphQL layer reported errors that are
  /// not in the retryable set.
  #[error("GitHub returned errors: {0}")]
  Api(String),

  /// Non-2xx HTTP response, or the transport failed after retries.
  #[error("GitHub request failed ({status}): {message}")]
  Request { status: u16, message: String },

  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

pub type GitHubResult<T> = Result<T, GitHubError>;

/// The single polymorphism point towards the review platform: execute a
/// GraphQL document and get the parsed JSON tree back. Production wraps an
/// HTTP client; tests replay canned responses.
pub trait GitHubEndpoint {
  fn graphql(
    &self,
    query: &str,
    variables: Value,
    require_success: bool,
  ) -> impl std::future::Future<Output = GitHubResult<Value>>;
}

const RETRYABLE_GRAPHQL_ERROR: &str = "RESOURCE_LIMITS_EXCEEDED";

/// GitHub GraphQL endpoint over HTTP. Retries 5xx responses and
/// rate-limited GraphQL errors with exponential backoff (base 1s, factor 2,
/// 3 attempts).
pub struct RealGitHubEndpoint {
  client: reqwest::Client,
  graphql_endpoint: String,
  oauth_token: String,
}

impl RealGitHubEndpoint {
  pub fn new(oauth_token: String, github_url: &str, proxy: Option<&str>) -> GitHubResult<Self> {
    let mut builder = reqwest::Client::builder();
    if let Some(proxy) = proxy {
      builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(|e| anyhow!("Invalid proxy {proxy}: {e}"))?);
    }
    let client = builder.build().map_err(|e| anyhow!("Failed to build http client: {e}"))?;
    Ok(Self {
      client,
      graphql_endpoint: format!("https://api.{github_url}/graphql"),
      oauth_token,
    })
  }

  async fn post_once(&self, query: &str, variables: &Value) -> Result<Value, backoff::Error<GitHubError>> {
    debug!("POST {}", self.graphql_endpoint);

    let response = self
      .client
      .post(&self.graphql_endpoint)
      .bearer_auth(&self.oauth_token)
      .json(&serde_json::json!({ "query": query, "variables": variables }))
      .send()
      .await
      .map_err(|e| {
        // Connection-level failures are worth one more try
        backoff::Error::transient(GitHubError::Request {
          status: 0,
          message: e.to_string(),
        })
      })?;

    let status = response.status();
    for header in ["x-ratelimit-remaining", "x-ratelimit-reset"] {
      if let Some(value) = response.headers().get(header) {
        debug!(header, value = ?value, "rate limit");
      }
    }

    let body: Value = response.json().await.map_err(|e| {
      backoff::Error::permanent(GitHubError::Request {
        status: status.as_u16(),
        message: format!("response body was not JSON: {e}"),
      })
    })?;

    if status.is_server_error() {
      return Err(backoff::Error::transient(GitHubError::Request {
        status: status.as_u16(),
        message: body.to_string(),
      }));
    }
    if !status.is_success() {
      return Err(backoff::Error::permanent(GitHubError::Request {
        status: status.as_u16(),
        message: body.to_string(),
      }));
    }

    if let Some(errors) = body.get("errors").and_then(Value::as_array)
      && !errors.is_empty()
    {
      let all_retryable = errors
        .iter()
        .all(|e| e.get("type").and_then(Value::as_str) == Some(RETRYABLE_GRAPHQL_ERROR));
      if all_retryable {
        return Err(backoff::Error::transient(GitHubError::Api(Value::Array(errors.clone()).to_string())));
      }
    }

    Ok(body)
  }
}

impl GitHubEndpoint for RealGitHubEndpoint {
  async fn graphql(&self, query: &str, variables: Value, require_success: bool) -> GitHubResult<Value> {
    let policy = ExponentialBackoffBuilder::new()
      .with_initial_interval(Duration::from_secs(1))
      .with_multiplier(2.0)
      .with_randomization_factor(0.0)
      // Allows the two retry sleeps (1s + 2s) and no more, so a request is
      // attempted at most 3 times
      .with_max_elapsed_time(Some(Duration::from_secs(4)))
      .build();

    let body = backoff::future::retry_notify(
      policy,
      || self.post_once(query, &variables),
      |err, delay| warn!("GitHub request failed, retrying in {delay:?}: {err}"),
    )
    .await?;

    if let Some(errors) = body.get("errors").and_then(Value::as_array)
      && !errors.is_empty()
    {
      if require_success {
        return Err(GitHubError::Api(Value::Array(errors.clone()).to_string()));
      }
      let partial_errors = Value::Array(errors.clone());
      warn!("GitHub reported partial errors: {}", partial_errors);
    }

    Ok(body)
  }
}
