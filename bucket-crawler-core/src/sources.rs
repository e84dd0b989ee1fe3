//! Bucket source readers.
//!
//! - [`official_buckets`]: JSON object of official bucket names to URIs, trusted as canonical.
//! - [`listed_buckets`]: externally hosted CSV lists (ignored / manual) whose `url`
//!   column is probed and redirect-normalized row by row.
//!
//! A list that cannot be fetched or parsed logs an error and contributes nothing;
//! one broken list never aborts the crawl.

use std::collections::{HashMap, HashSet};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use crate::concurrency::map_bounded;
use crate::contract::{ClientError, GitHubClient};
use crate::identity::validate_bucket;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to fetch list: {0}")]
    Fetch(ClientError),

    #[error("failed to parse JSON list: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse CSV list: {0}")]
    Csv(#[from] csv::Error),

    #[error("cancelled")]
    Cancelled,
}

/// Header of the only column a bucket list needs.
const URL_COLUMN: &str = "url";

async fn fetch_list<G>(github: &G, list_url: &Url, cancel: &CancellationToken) -> Result<String, SourceError>
where
    G: GitHubClient + ?Sized,
{
    cancel
        .run_until_cancelled(github.fetch_text(list_url))
        .await
        .ok_or(SourceError::Cancelled)?
        .map_err(SourceError::Fetch)
}

/// Parse the official list: `{ "name": "https://github.com/owner/repo", ... }`.
pub fn parse_official_list(content: &str) -> Result<HashSet<Url>, SourceError> {
    let entries: HashMap<String, String> = serde_json::from_str(content)?;
    let buckets = entries
        .into_iter()
        .filter_map(|(name, uri)| match Url::parse(&uri) {
            Ok(uri) => Some(uri),
            Err(e) => {
                warn!(name = %name, uri = %uri, error = %e, "Skipping invalid official bucket URI");
                None
            }
        })
        .collect();
    Ok(buckets)
}

/// Extract the non-empty `url` values of a CSV list with a header row.
///
/// Rows are independent: a short row, a row with an empty `url` or a row the
/// reader rejects is skipped without affecting the others.
pub fn parse_bucket_list(content: &str) -> Result<Vec<String>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let Some(url_column) = reader
        .headers()?
        .iter()
        .position(|header| header.eq_ignore_ascii_case(URL_COLUMN))
    else {
        warn!("Bucket list has no url column");
        return Ok(Vec::new());
    };

    let mut urls = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable bucket list row");
                continue;
            }
        };
        match record.get(url_column) {
            Some(url) if !url.is_empty() => urls.push(url.to_string()),
            _ => debug!(
                line = record.position().map(|p| p.line()),
                "Skipping bucket list row without url"
            ),
        }
    }
    Ok(urls)
}

async fn try_official_buckets<G>(github: &G, list_url: &Url, cancel: &CancellationToken) -> Result<HashSet<Url>, SourceError>
where
    G: GitHubClient + ?Sized,
{
    let content = fetch_list(github, list_url, cancel).await?;
    parse_official_list(&content)
}

/// Official buckets, or an empty set when the list is unavailable.
pub async fn official_buckets<G>(github: &G, list_url: &Url, cancel: &CancellationToken) -> HashSet<Url>
where
    G: GitHubClient + ?Sized,
{
    match try_official_buckets(github, list_url, cancel).await {
        Ok(buckets) => buckets,
        Err(e) => {
            error!(list = %list_url, error = %e, "Unable to read/parse official buckets list");
            HashSet::new()
        }
    }
}

async fn try_listed_buckets<G>(
    github: &G,
    list_url: &Url,
    follow_redirects: bool,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<HashSet<Url>, SourceError>
where
    G: GitHubClient + ?Sized,
{
    let content = fetch_list(github, list_url, cancel).await?;
    let rows = parse_bucket_list(&content)?;
    debug!(list = %list_url, rows = rows.len(), "Validating bucket list rows");

    let validated = map_bounded(rows, limit, cancel, |raw| async move {
        validate_bucket(github, &raw, follow_redirects, list_url, cancel).await
    })
    .await;

    Ok(validated.into_iter().flatten().collect())
}

/// Validated buckets of an external CSV list, or an empty set when the list is
/// unavailable.
pub async fn listed_buckets<G>(
    github: &G,
    list_url: &Url,
    follow_redirects: bool,
    limit: usize,
    cancel: &CancellationToken,
) -> HashSet<Url>
where
    G: GitHubClient + ?Sized,
{
    match try_listed_buckets(github, list_url, follow_redirects, limit, cancel).await {
        Ok(buckets) => buckets,
        Err(e) => {
            error!(list = %list_url, error = %e, "Unable to read/parse data from bucket list");
            HashSet::new()
        }
    }
}
