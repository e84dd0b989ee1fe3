use bucket_crawler_core::config::BucketsConfig;
use bucket_crawler_core::contract::{
    ManifestMetadata, ManifestStub, MockBucketQueue, MockGitHubClient, MockIndexer, ProbeResponse,
    QueueItem, Repository, SearchItem, SearchResults,
};
use bucket_crawler_core::synchronise::{clean_index, synchronise, CrawlError, UNKNOWN_STARS};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

const OFFICIAL_LIST: &str = "https://lists.example.com/buckets.json";
const IGNORED_LIST: &str = "https://lists.example.com/ignored.csv";
const MANUAL_LIST: &str = "https://lists.example.com/manual.csv";
const SEARCH_QUERY: &str = "https://api.github.com/search/repositories?q=topic:scoop-bucket";

fn bucket(name: &str) -> Url {
    Url::parse(&format!("https://github.com/owner/{name}")).unwrap()
}

fn config() -> BucketsConfig {
    BucketsConfig {
        official_buckets_list_url: Url::parse(OFFICIAL_LIST).unwrap(),
        github_buckets_search_queries: vec![Url::parse(SEARCH_QUERY).unwrap()],
        ignored_buckets_list_url: Url::parse(IGNORED_LIST).unwrap(),
        manual_buckets_list_url: Url::parse(MANUAL_LIST).unwrap(),
        ignored_buckets: HashSet::new(),
        manual_buckets: HashSet::new(),
        max_parallelism: 8,
    }
}

fn stub(id: &str, repository: &Url) -> ManifestStub {
    ManifestStub {
        id: id.to_string(),
        metadata: ManifestMetadata {
            repository: repository.to_string(),
            repository_stars: 3,
            sha: Some("abc123".into()),
        },
    }
}

/// GitHub double serving the lists and a single search page, probing every URI
/// as reachable at its own location.
fn github_with_lists(manual_csv: Option<&'static str>) -> MockGitHubClient {
    let mut github = MockGitHubClient::new();
    github.expect_fetch_text().returning(move |uri| match uri.as_str() {
        OFFICIAL_LIST => Ok(r#"{"a": "https://github.com/owner/A"}"#.to_string()),
        IGNORED_LIST => Ok("name,url\nc,https://github.com/owner/C\n".to_string()),
        MANUAL_LIST => match manual_csv {
            Some(csv) => Ok(csv.to_string()),
            None => Err("503 service unavailable".into()),
        },
        other => Err(format!("unexpected fetch {other}").into()),
    });
    github.expect_search().returning(|uri| {
        assert!(uri.as_str().starts_with(SEARCH_QUERY));
        Some(SearchResults {
            total_count: 2,
            items: vec![
                SearchItem { uri: bucket("B"), stars: 5 },
                SearchItem { uri: bucket("C"), stars: 10 },
            ],
        })
    });
    github.expect_send().returning(|_, uri, _| {
        Ok(ProbeResponse {
            status: 200,
            final_uri: Some(uri.clone()),
        })
    });
    github
}

fn collecting_queue() -> (MockBucketQueue, Arc<Mutex<Vec<QueueItem>>>) {
    let items = Arc::new(Mutex::new(Vec::new()));
    let sink = items.clone();
    let mut queue = MockBucketQueue::new();
    queue.expect_enqueue().returning(move |item| {
        sink.lock().unwrap().push(item.clone());
        Ok(())
    });
    (queue, items)
}

fn sorted(items: &Arc<Mutex<Vec<QueueItem>>>) -> Vec<QueueItem> {
    let mut items = items.lock().unwrap().clone();
    items.sort_by(|a, b| a.bucket.as_str().cmp(b.bucket.as_str()));
    items
}

#[tokio::test]
async fn test_synchronise_end_to_end_scenario() {
    let mut github = github_with_lists(Some("url\nhttps://github.com/owner/D.git\n"));
    github
        .expect_get_repository()
        .withf(|uri| *uri == bucket("A"))
        .returning(|_| Some(Repository { stars: 42 }));
    github
        .expect_get_repository()
        .withf(|uri| *uri == bucket("D"))
        .returning(|_| None);

    let mut indexer = MockIndexer::new();
    indexer
        .expect_list_buckets()
        .return_once(|| Ok(vec![bucket("A"), bucket("E")]));
    indexer
        .expect_get_manifests()
        .withf(|uri| *uri == bucket("E"))
        .times(1)
        .returning(|uri| Ok(vec![stub("e1", uri), stub("e2", uri)]));
    indexer
        .expect_delete_manifests()
        .withf(|manifests| manifests.len() == 2 && manifests.iter().all(|m| m.metadata.repository == bucket("E").as_str()))
        .times(1)
        .returning(|_| Ok(()));

    let (queue, enqueued) = collecting_queue();
    let cancel = CancellationToken::new();

    let report = synchronise(&config(), &github, &indexer, &queue, &cancel)
        .await
        .expect("crawl should succeed");

    assert_eq!(report.official_buckets, 1);
    assert_eq!(report.github_buckets, 2);
    assert_eq!(report.ignored_list_buckets, 1);
    assert_eq!(report.manual_list_buckets, 1);
    assert_eq!(report.authoritative_buckets, 3);
    assert_eq!(report.cleanup.deleted_buckets, vec![bucket("E")]);
    assert_eq!(report.cleanup.deleted_manifests, 2);
    assert!(report.cleanup.failed_buckets.is_empty());
    assert_eq!(report.dispatch.dispatched.len(), 3);

    assert_eq!(
        sorted(&enqueued),
        vec![
            QueueItem { bucket: bucket("A"), stars: 42, official: true },
            QueueItem { bucket: bucket("B"), stars: 5, official: false },
            QueueItem { bucket: bucket("D"), stars: UNKNOWN_STARS, official: false },
        ]
    );
}

#[tokio::test]
async fn test_search_stars_take_precedence_over_live_lookup() {
    let mut github = github_with_lists(Some("url\n"));
    github
        .expect_get_repository()
        .withf(|uri| *uri == bucket("B"))
        .never();
    github
        .expect_get_repository()
        .withf(|uri| *uri != bucket("B"))
        .returning(|_| Some(Repository { stars: 1000 }));

    let mut indexer = MockIndexer::new();
    indexer.expect_list_buckets().return_once(|| Ok(vec![]));
    indexer.expect_get_manifests().never();

    let (queue, enqueued) = collecting_queue();
    let cancel = CancellationToken::new();

    synchronise(&config(), &github, &indexer, &queue, &cancel)
        .await
        .expect("crawl should succeed");

    let items = sorted(&enqueued);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0], QueueItem { bucket: bucket("A"), stars: 1000, official: true });
    assert_eq!(items[1], QueueItem { bucket: bucket("B"), stars: 5, official: false });
}

#[tokio::test]
async fn test_failing_csv_list_does_not_block_other_sources() {
    let mut github = github_with_lists(None);
    github.expect_get_repository().returning(|_| None);

    let mut indexer = MockIndexer::new();
    indexer.expect_list_buckets().return_once(|| Ok(vec![]));

    let (queue, enqueued) = collecting_queue();
    let cancel = CancellationToken::new();

    let report = synchronise(&config(), &github, &indexer, &queue, &cancel)
        .await
        .expect("a broken list must not fail the run");

    assert_eq!(report.manual_list_buckets, 0);
    assert_eq!(report.official_buckets, 1);
    assert_eq!(report.github_buckets, 2);
    let buckets: Vec<Url> = sorted(&enqueued).into_iter().map(|i| i.bucket).collect();
    assert_eq!(buckets, vec![bucket("A"), bucket("B")]);
}

#[tokio::test]
async fn test_config_lists_are_merged_and_subtracted() {
    let mut github = github_with_lists(Some("url\n"));
    github.expect_get_repository().returning(|_| None);

    let mut indexer = MockIndexer::new();
    indexer.expect_list_buckets().return_once(|| Ok(vec![bucket("B")]));
    indexer
        .expect_get_manifests()
        .withf(|uri| *uri == bucket("B"))
        .returning(|uri| Ok(vec![stub("b1", uri)]));
    indexer.expect_delete_manifests().times(1).returning(|_| Ok(()));

    let mut config = config();
    config.manual_buckets.insert(bucket("M"));
    config.ignored_buckets.insert(bucket("B"));

    let (queue, enqueued) = collecting_queue();
    let cancel = CancellationToken::new();

    let report = synchronise(&config, &github, &indexer, &queue, &cancel)
        .await
        .expect("crawl should succeed");

    assert_eq!(report.cleanup.deleted_buckets, vec![bucket("B")]);
    let buckets: Vec<Url> = sorted(&enqueued).into_iter().map(|i| i.bucket).collect();
    assert_eq!(buckets, vec![bucket("A"), bucket("M")]);
}

#[tokio::test]
async fn test_index_listing_failure_skips_cleanup_only() {
    let mut github = github_with_lists(Some("url\n"));
    github.expect_get_repository().returning(|_| None);

    let mut indexer = MockIndexer::new();
    indexer
        .expect_list_buckets()
        .return_once(|| Err("index unavailable".into()));
    indexer.expect_get_manifests().never();
    indexer.expect_delete_manifests().never();

    let (queue, enqueued) = collecting_queue();
    let cancel = CancellationToken::new();

    let report = synchronise(&config(), &github, &indexer, &queue, &cancel)
        .await
        .expect("crawl should succeed");

    assert!(report.cleanup.deleted_buckets.is_empty());
    assert_eq!(enqueued.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_deletion_and_dispatch_do_not_abort_siblings() {
    let mut github = github_with_lists(Some("url\n"));
    github.expect_get_repository().returning(|_| None);

    let mut indexer = MockIndexer::new();
    indexer
        .expect_list_buckets()
        .return_once(|| Ok(vec![bucket("X"), bucket("Y")]));
    indexer
        .expect_get_manifests()
        .returning(|uri| Ok(vec![stub("m", uri)]));
    indexer
        .expect_delete_manifests()
        .withf(|manifests| manifests[0].metadata.repository == bucket("X").as_str())
        .returning(|_| Err("batch rejected".into()));
    indexer
        .expect_delete_manifests()
        .withf(|manifests| manifests[0].metadata.repository != bucket("X").as_str())
        .returning(|_| Ok(()));

    let mut queue = MockBucketQueue::new();
    queue
        .expect_enqueue()
        .withf(|item| item.bucket == bucket("A"))
        .returning(|_| Err("queue throttled".into()));
    queue
        .expect_enqueue()
        .withf(|item| item.bucket != bucket("A"))
        .returning(|_| Ok(()));

    let cancel = CancellationToken::new();
    let report = synchronise(&config(), &github, &indexer, &queue, &cancel)
        .await
        .expect("crawl should succeed");

    assert_eq!(report.cleanup.deleted_buckets, vec![bucket("Y")]);
    assert_eq!(report.cleanup.failed_buckets, vec![bucket("X")]);
    assert_eq!(report.dispatch.failed, vec![bucket("A")]);
    assert_eq!(report.dispatch.dispatched.len(), 1);
    assert_eq!(report.dispatch.dispatched[0].bucket, bucket("B"));
}

#[tokio::test]
async fn test_cancelled_run_dispatches_nothing() {
    let mut github = MockGitHubClient::new();
    github.expect_fetch_text().returning(|_| Ok(String::new()));
    github.expect_search().returning(|_| None);

    let mut indexer = MockIndexer::new();
    indexer.expect_list_buckets().returning(|| Ok(vec![]));
    indexer.expect_delete_manifests().never();

    let mut queue = MockBucketQueue::new();
    queue.expect_enqueue().never();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = synchronise(&config(), &github, &indexer, &queue, &cancel).await;
    assert!(matches!(result, Err(CrawlError::Cancelled)));
}

#[tokio::test]
async fn test_cancel_during_cleanup_finishes_started_bucket_only() {
    let cancel = CancellationToken::new();
    let on_fetch = cancel.clone();

    let mut indexer = MockIndexer::new();
    indexer.expect_get_manifests().times(1).returning(move |uri| {
        on_fetch.cancel();
        Ok(vec![stub("m", uri)])
    });
    indexer.expect_delete_manifests().times(1).returning(|_| Ok(()));

    let stale: Vec<Url> = ["S1", "S2", "S3", "S4", "S5"].iter().map(|n| bucket(n)).collect();
    let report = clean_index(&indexer, &HashSet::new(), stale, 1, &cancel).await;

    assert_eq!(report.deleted_buckets.len(), 1);
    assert_eq!(report.deleted_manifests, 1);
    assert!(report.failed_buckets.is_empty());
}

#[tokio::test]
async fn test_cancel_during_dispatch_returns_partial_report() {
    let mut github = github_with_lists(Some("url\n"));
    github.expect_get_repository().returning(|_| None);

    let mut indexer = MockIndexer::new();
    indexer.expect_list_buckets().return_once(|| Ok(vec![]));

    let cancel = CancellationToken::new();
    let on_enqueue = cancel.clone();
    let mut queue = MockBucketQueue::new();
    queue.expect_enqueue().times(1).returning(move |_| {
        on_enqueue.cancel();
        Ok(())
    });

    let mut config = config();
    config.max_parallelism = 1;

    let report = synchronise(&config, &github, &indexer, &queue, &cancel)
        .await
        .expect("work already dispatched is reported");

    assert_eq!(report.authoritative_buckets, 2);
    assert_eq!(report.dispatch.dispatched.len(), 1);
    assert!(report.dispatch.failed.is_empty());
}
