use crate::endpoint::{GitHubEndpoint, GitHubError, GitHubResult};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Endpoint that replays canned responses in order and records every
/// executed document, for tests that drive the engine without a network.
#[derive(Default)]
pub struct StaticEndpoint {
  responses: Mutex<VecDeque<Value>>,
  executed: Mutex<Vec<(String, Value)>>,
}

impl StaticEndpoint {
  pub fn new(responses: Vec<Value>) -> Self {
    Self {
      responses: Mutex::new(responses.into()),
      executed: Mutex::new(Vec::new()),
    }
  }

  /// All (query, variables) pairs executed so far.
  pub fn executed(&self) -> Vec<(String, Value)> {
    self.executed.lock().unwrap().clone()
  }

  pub fn executed_count(&self) -> usize {
    self.executed.lock().unwrap().len()
  }
}

impl GitHubEndpoint for StaticEndpoint {
  async fn graphql(&self, query: &str, variables: Value, _require_success: bool) -> GitHubResult<Value> {
    self.executed.lock().unwrap().push((query.to_string(), variables));
    self
      .responses
      .lock()
      .unwrap()
      .pop_front()
      .ok_or_else(|| GitHubError::Api("StaticEndpoint has no response queued for this request".to_string()))
  }
}
