use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

use crate::concurrency::MAX_DEGREE_OF_PARALLELISM;

/// Static inputs of a crawl run: where the bucket lists live and which
/// searches discover buckets on GitHub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketsConfig {
    /// JSON object mapping official bucket names to repository URIs.
    pub official_buckets_list_url: Url,
    /// GitHub search API URLs; paging parameters are appended per request.
    #[serde(default)]
    pub github_buckets_search_queries: Vec<Url>,
    /// CSV list (with a `url` column) of buckets to exclude.
    pub ignored_buckets_list_url: Url,
    /// CSV list (with a `url` column) of buckets to include on top of discovery.
    pub manual_buckets_list_url: Url,
    #[serde(default)]
    pub ignored_buckets: HashSet<Url>,
    #[serde(default)]
    pub manual_buckets: HashSet<Url>,
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
}

fn default_max_parallelism() -> usize {
    MAX_DEGREE_OF_PARALLELISM
}

impl BucketsConfig {
    /// Fan-out ceiling for this run, never below one.
    pub fn parallelism(&self) -> usize {
        self.max_parallelism.max(1)
    }

    pub fn trace_loaded(&self) {
        info!(
            official_list = %self.official_buckets_list_url,
            search_queries = self.github_buckets_search_queries.len(),
            ignored_list = %self.ignored_buckets_list_url,
            manual_list = %self.manual_buckets_list_url,
            ignored_buckets = self.ignored_buckets.len(),
            manual_buckets = self.manual_buckets.len(),
            max_parallelism = self.parallelism(),
            "Loaded BucketsConfig"
        );
        debug!(?self, "BucketsConfig loaded (full debug)");
    }
}
