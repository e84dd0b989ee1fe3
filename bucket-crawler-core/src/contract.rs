//! # contract: collaborator interfaces for the crawler
//!
//! This module defines the three traits the crawl orchestration talks to, plus the
//! plain data types that cross those boundaries:
//!
//! - [`GitHubClient`]: text fetches, code/repository search pages, HEAD probes and
//!   single repository lookups.
//! - [`Indexer`]: the search index holding manifest documents, keyed by bucket.
//! - [`BucketQueue`]: the outbound queue receiving one [`QueueItem`] per bucket.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; the `test-export-mocks` feature (on by
//!   default) exports `MockGitHubClient`, `MockIndexer` and `MockBucketQueue` so
//!   integration tests and the CLI crate can build deterministic doubles.
//!
//! ## Error Handling
//! - Fallible calls return a boxed [`ClientError`]. Calls whose failure the crawl
//!   treats as "no data" (`search`, `get_repository`) return `Option` instead, and
//!   the implementor logs the underlying cause.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use mockall::{automock, predicate::*};

/// Error type shared by all collaborator calls.
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// One page of GitHub search results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SearchResults {
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

/// A repository hit on a search page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchItem {
    /// Browser URL of the repository, used as the bucket identity.
    #[serde(rename = "html_url")]
    pub uri: Url,
    #[serde(rename = "stargazers_count")]
    pub stars: i64,
}

/// Outcome of a probe request (usually HEAD) against a bucket URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    /// Location the request ended up at after any redirects that were followed.
    pub final_uri: Option<Url>,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Live repository metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    #[serde(rename = "stargazers_count")]
    pub stars: i64,
}

/// Minimal manifest document, fetched only so it can be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestStub {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Metadata")]
    pub metadata: ManifestMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestMetadata {
    pub repository: String,
    #[serde(default)]
    pub repository_stars: i64,
    #[serde(default)]
    pub sha: Option<String>,
}

/// Work item handed to downstream manifest indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueItem {
    pub bucket: Url,
    pub stars: i64,
    pub official: bool,
}

/// Access to GitHub (and arbitrary bucket hosts for probing).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GitHubClient: Send + Sync {
    /// Download the body at `uri` as text.
    async fn fetch_text(&self, uri: &Url) -> Result<String, ClientError>;

    /// Run one search page. `None` when the page could not be retrieved.
    async fn search(&self, uri: &Url) -> Option<SearchResults>;

    /// Send a bodiless request, following redirects only when asked to.
    async fn send(
        &self,
        method: Method,
        uri: &Url,
        follow_redirects: bool,
    ) -> Result<ProbeResponse, ClientError>;

    /// Look up a single repository by its bucket identity.
    async fn get_repository(&self, bucket: &Url) -> Option<Repository>;
}

/// The search index holding manifests for every known bucket.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Every bucket that currently has at least one manifest in the index.
    async fn list_buckets(&self) -> Result<Vec<Url>, ClientError>;

    async fn get_manifests(&self, bucket: &Url) -> Result<Vec<ManifestStub>, ClientError>;

    async fn delete_manifests(&self, manifests: &[ManifestStub]) -> Result<(), ClientError>;

    /// Write path used by downstream indexing; the crawler never calls it.
    async fn add_manifests(&self, manifests: &[ManifestStub]) -> Result<(), ClientError>;
}

/// Append-only outbound queue of buckets to index.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BucketQueue: Send + Sync {
    async fn enqueue(&self, item: &QueueItem) -> Result<(), ClientError>;
}
