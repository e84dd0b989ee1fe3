//! Bounded fan-out helpers shared by every stage of a crawl.
//!
//! Items run at most `limit` at a time. Once the cancellation token fires, items
//! that have not started yet are skipped; started items finish on their own.
//! A failing item never affects its siblings, since results are per item.

use futures::stream::{self, StreamExt};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Default ceiling for concurrent external operations.
pub const MAX_DEGREE_OF_PARALLELISM: usize = 8;

/// Map every item through `f`, at most `limit` in flight. Results come back in
/// completion order; skipped items are absent.
pub async fn map_bounded<I, F, Fut, T>(
    items: I,
    limit: usize,
    cancel: &CancellationToken,
    f: F,
) -> Vec<T>
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    let f = &f;
    stream::iter(items)
        .map(move |item| async move {
            if cancel.is_cancelled() {
                return None;
            }
            Some(f(item).await)
        })
        .buffer_unordered(limit.max(1))
        .filter_map(|res| async move { res })
        .collect()
        .await
}
