//! High-level crawl: discover buckets, reconcile with the index, dispatch work.
//!
//! This module provides the top-level orchestration of one crawl run:
//!   - Reads the official list, GitHub search, and the ignored/manual CSV lists,
//!     concurrently with listing the buckets currently present in the index
//!   - Reconciles the sources into the authoritative bucket set
//!   - Deletes the manifests of every indexed bucket that is no longer authoritative
//!   - Resolves star count and official flag per bucket
//!   - Enqueues one [`QueueItem`] per bucket for downstream indexing
//!
//! # Error Handling
//! Failures are contained at the smallest unit (one list, one query, one bucket)
//! and logged. The only error a run surfaces is [`CrawlError::Cancelled`], checked
//! between stages and before every fan-out item. A run cancelled during dispatch
//! still returns its report, listing only the items actually enqueued.
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Stages: [`clean_index`], [`resolve_buckets`], [`dispatch`]

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::concurrency::map_bounded;
use crate::config::BucketsConfig;
use crate::contract::{BucketQueue, GitHubClient, Indexer, QueueItem};
use crate::reconcile::{reconcile, SourceSets};
use crate::search::search_buckets;
use crate::sources::{listed_buckets, official_buckets};

/// Star count recorded when neither search nor a live lookup knows the bucket.
pub const UNKNOWN_STARS: i64 = -1;

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("crawl cancelled")]
    Cancelled,
}

/// Outcome of one crawl run.
#[derive(Debug, Default)]
pub struct CrawlReport {
    pub official_buckets: usize,
    pub github_buckets: usize,
    pub ignored_config_buckets: usize,
    pub ignored_list_buckets: usize,
    pub manual_config_buckets: usize,
    pub manual_list_buckets: usize,
    pub authoritative_buckets: usize,
    pub cleanup: CleanupReport,
    pub dispatch: DispatchReport,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted_buckets: Vec<Url>,
    pub deleted_manifests: usize,
    pub failed_buckets: Vec<Url>,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub dispatched: Vec<QueueItem>,
    pub failed: Vec<Url>,
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), CrawlError> {
    if cancel.is_cancelled() {
        warn!("[CRAWL] Cancellation requested, stopping run");
        return Err(CrawlError::Cancelled);
    }
    Ok(())
}

async fn indexed_buckets<I>(indexer: &I, cancel: &CancellationToken) -> Vec<Url>
where
    I: Indexer + ?Sized,
{
    match cancel.run_until_cancelled(indexer.list_buckets()).await {
        Some(Ok(buckets)) => buckets,
        Some(Err(e)) => {
            error!(error = %e, "[CRAWL][INDEX] Failed to list indexed buckets, skipping cleanup");
            Vec::new()
        }
        None => Vec::new(),
    }
}

pub async fn synchronise<G, I, Q>(
    config: &BucketsConfig,
    github: &G,
    indexer: &I,
    queue: &Q,
    cancel: &CancellationToken,
) -> Result<CrawlReport, CrawlError>
where
    G: GitHubClient + ?Sized,
    I: Indexer + ?Sized,
    Q: BucketQueue + ?Sized,
{
    info!("[CRAWL] Starting bucket discovery");
    let limit = config.parallelism();

    let (official, github_buckets, ignored_list, manual_list, index_buckets) = tokio::join!(
        official_buckets(github, &config.official_buckets_list_url, cancel),
        search_buckets(github, &config.github_buckets_search_queries, limit, cancel),
        listed_buckets(github, &config.ignored_buckets_list_url, false, limit, cancel),
        listed_buckets(github, &config.manual_buckets_list_url, true, limit, cancel),
        indexed_buckets(indexer, cancel),
    );
    ensure_not_cancelled(cancel)?;

    let sources = SourceSets {
        official,
        github: github_buckets,
        manual_config: config.manual_buckets.clone(),
        manual_list,
        ignored_config: config.ignored_buckets.clone(),
        ignored_list,
    };

    info!(count = sources.official.len(), "[CRAWL] Found official buckets");
    info!(count = sources.github.len(), "[CRAWL] Found buckets on GitHub");
    info!(count = sources.ignored_config.len(), "[CRAWL] Found buckets to ignore");
    info!(count = sources.ignored_list.len(), "[CRAWL] Found buckets to ignore from external list");
    info!(count = sources.manual_config.len(), "[CRAWL] Found buckets to manually add");
    info!(count = sources.manual_list.len(), "[CRAWL] Found buckets to manually add from external list");

    let authoritative = reconcile(&sources);
    info!(count = authoritative.len(), "[CRAWL] Reconciled authoritative bucket set");

    let cleanup = clean_index(indexer, &authoritative, index_buckets, limit, cancel).await;
    ensure_not_cancelled(cancel)?;

    let items = resolve_buckets(github, &authoritative, &sources, limit, cancel).await;
    ensure_not_cancelled(cancel)?;

    // Once dispatch has started the report is returned, even if cancelled midway.
    let dispatch = dispatch(queue, items, limit, cancel).await;

    info!(
        cancelled = cancel.is_cancelled(),
        authoritative = authoritative.len(),
        deleted_buckets = cleanup.deleted_buckets.len(),
        dispatched = dispatch.dispatched.len(),
        failed_dispatches = dispatch.failed.len(),
        "[CRAWL] Run complete"
    );

    Ok(CrawlReport {
        official_buckets: sources.official.len(),
        github_buckets: sources.github.len(),
        ignored_config_buckets: sources.ignored_config.len(),
        ignored_list_buckets: sources.ignored_list.len(),
        manual_config_buckets: sources.manual_config.len(),
        manual_list_buckets: sources.manual_list.len(),
        authoritative_buckets: authoritative.len(),
        cleanup,
        dispatch,
    })
}

/// Delete the manifests of every indexed bucket missing from `authoritative`.
///
/// Buckets are handled independently; a failure on one is logged and recorded.
/// Once cancelled, buckets not yet started are skipped while started ones finish.
pub async fn clean_index<I>(
    indexer: &I,
    authoritative: &HashSet<Url>,
    index_buckets: Vec<Url>,
    limit: usize,
    cancel: &CancellationToken,
) -> CleanupReport
where
    I: Indexer + ?Sized,
{
    let deleted: HashSet<Url> = index_buckets
        .into_iter()
        .filter(|bucket| !authoritative.contains(bucket))
        .collect();
    info!(count = deleted.len(), "[CRAWL][INDEX] Buckets to remove from the index");

    let outcomes = map_bounded(deleted, limit, cancel, |bucket| async move {
        let manifests = match indexer.get_manifests(&bucket).await {
            Ok(manifests) => manifests,
            Err(e) => {
                error!(bucket = %bucket, error = %e, "[CRAWL][INDEX] Failed to fetch manifests of removed bucket");
                return (bucket, None);
            }
        };
        debug!(bucket = %bucket, manifests = manifests.len(), "[CRAWL][INDEX] Deleting manifests from bucket");
        if manifests.is_empty() {
            return (bucket, Some(0));
        }
        match indexer.delete_manifests(&manifests).await {
            Ok(()) => (bucket, Some(manifests.len())),
            Err(e) => {
                error!(bucket = %bucket, error = %e, "[CRAWL][INDEX] Failed to delete manifests of removed bucket");
                (bucket, None)
            }
        }
    })
    .await;

    let mut report = CleanupReport::default();
    for (bucket, deleted) in outcomes {
        match deleted {
            Some(count) => {
                report.deleted_manifests += count;
                report.deleted_buckets.push(bucket);
            }
            None => report.failed_buckets.push(bucket),
        }
    }
    report
}

/// Build one work item per authoritative bucket.
///
/// Stars come from the search merge when present, otherwise from a live lookup,
/// otherwise [`UNKNOWN_STARS`].
pub async fn resolve_buckets<G>(
    github: &G,
    authoritative: &HashSet<Url>,
    sources: &SourceSets,
    limit: usize,
    cancel: &CancellationToken,
) -> Vec<QueueItem>
where
    G: GitHubClient + ?Sized,
{
    map_bounded(authoritative, limit, cancel, |bucket| async move {
        let stars = match sources.github.get(bucket) {
            Some(stars) => *stars,
            None => cancel
                .run_until_cancelled(github.get_repository(bucket))
                .await
                .flatten()
                .map(|repo| repo.stars)
                .unwrap_or_else(|| {
                    debug!(bucket = %bucket, "[CRAWL] Star count unknown");
                    UNKNOWN_STARS
                }),
        };
        QueueItem {
            bucket: bucket.clone(),
            stars,
            official: sources.official.contains(bucket),
        }
    })
    .await
}

/// Enqueue every item for indexing. Failed enqueues are logged and recorded.
pub async fn dispatch<Q>(
    queue: &Q,
    items: Vec<QueueItem>,
    limit: usize,
    cancel: &CancellationToken,
) -> DispatchReport
where
    Q: BucketQueue + ?Sized,
{
    info!(count = items.len(), "[CRAWL][QUEUE] Adding buckets for indexing");

    let outcomes = map_bounded(items, limit, cancel, |item| async move {
        debug!(
            bucket = %item.bucket,
            stars = item.stars,
            official = item.official,
            "[CRAWL][QUEUE] Adding bucket to queue"
        );
        match queue.enqueue(&item).await {
            Ok(()) => Ok(item),
            Err(e) => {
                error!(bucket = %item.bucket, error = %e, "[CRAWL][QUEUE] Failed to enqueue bucket");
                Err(item.bucket)
            }
        }
    })
    .await;

    let mut report = DispatchReport::default();
    for outcome in outcomes {
        match outcome {
            Ok(item) => report.dispatched.push(item),
            Err(bucket) => report.failed.push(bucket),
        }
    }
    report
}
