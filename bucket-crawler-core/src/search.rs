//! GitHub search pagination.
//!
//! Each configured query is a GitHub search API URL. The first page tells us the
//! total result count; the remaining pages of that query are fetched one after the
//! other, while different queries run concurrently under the run's limiter.
//! Missing pages count as empty. Star counts are merged by identity and the last
//! page folded in wins.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::concurrency::map_bounded;
use crate::contract::{GitHubClient, SearchResults};

/// Results requested per search page.
pub const RESULTS_PER_PAGE: u64 = 100;

/// Build the URI of a single result page for `query`.
pub fn search_page_uri(query: &Url, page: u64) -> Url {
    let mut uri = query.clone();
    uri.query_pairs_mut()
        .append_pair("per_page", &RESULTS_PER_PAGE.to_string())
        .append_pair("page", &page.to_string())
        .append_pair("sort", "updated");
    uri
}

/// Number of pages needed to cover `total_count` results.
pub fn total_pages(total_count: u64) -> u64 {
    total_count.div_ceil(RESULTS_PER_PAGE)
}

fn merge_page(target: &mut HashMap<Url, i64>, page: SearchResults) {
    for item in page.items {
        target.insert(item.uri, item.stars);
    }
}

/// Walk every page of a single query.
async fn search_query<G>(github: &G, query: &Url, cancel: &CancellationToken) -> HashMap<Url, i64>
where
    G: GitHubClient + ?Sized,
{
    let mut buckets = HashMap::new();

    let first = cancel
        .run_until_cancelled(github.search(&search_page_uri(query, 1)))
        .await
        .flatten();
    let Some(first) = first else {
        debug!(query = %query, "Search query returned no results");
        return buckets;
    };

    let pages = total_pages(first.total_count);
    debug!(query = %query, total_count = first.total_count, pages, "Search query first page received");
    merge_page(&mut buckets, first);

    for page in 2..=pages {
        if cancel.is_cancelled() {
            break;
        }
        let results = cancel
            .run_until_cancelled(github.search(&search_page_uri(query, page)))
            .await
            .flatten();
        match results {
            Some(results) => merge_page(&mut buckets, results),
            None => debug!(query = %query, page, "Search page returned no results"),
        }
    }

    buckets
}

/// Run every query and merge the discovered `identity -> stars` pairs.
pub async fn search_buckets<G>(
    github: &G,
    queries: &[Url],
    limit: usize,
    cancel: &CancellationToken,
) -> HashMap<Url, i64>
where
    G: GitHubClient + ?Sized,
{
    let per_query = map_bounded(queries, limit, cancel, |query| search_query(github, query, cancel)).await;

    let mut buckets = HashMap::new();
    for found in per_query {
        buckets.extend(found);
    }
    info!(queries = queries.len(), buckets = buckets.len(), "GitHub search completed");
    buckets
}
