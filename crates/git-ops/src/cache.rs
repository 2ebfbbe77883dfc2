use dashmap::DashMap;
use std::sync::Arc;

/// Memoization for repeated ref lookups within one invocation. Keys are the
/// exact argument strings, so symbolic refs like HEAD are cached too; the
/// caches must be cleared whenever HEAD moves.
#[derive(Clone, Default)]
pub struct QueryCaches {
  pub(crate) ref_exists: Arc<DashMap<String, bool>>,
  pub(crate) commit_hashes: Arc<DashMap<String, String>>,
  pub(crate) tree_hashes: Arc<DashMap<String, String>>,
  pub(crate) fork_points: Arc<DashMap<String, String>>,
  pub(crate) fork_distances: Arc<DashMap<String, usize>>,
  pub(crate) identical_trees: Arc<DashMap<String, bool>>,
}

impl QueryCaches {
  pub fn new() -> Self {
    Self::default()
  }

  /// Drop every memoized result. Coarse, but cache rebuilds are cheap
  /// compared to reasoning about which entries a HEAD move invalidated.
  pub fn clear(&self) {
    self.ref_exists.clear();
    self.commit_hashes.clear();
    self.tree_hashes.clear();
    self.fork_points.clear();
    self.fork_distances.clear();
    self.identical_trees.clear();
  }

  /// Composite cache key for two-ref queries.
  pub(crate) fn pair_key(a: &str, b: &str) -> String {
    format!("{a}\u{0}{b}")
  }
}
