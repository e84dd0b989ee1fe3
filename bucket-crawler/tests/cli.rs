use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::NamedTempFile;

#[test]
fn help_lists_crawl_command() {
    let mut cmd = Command::cargo_bin("bucket-crawler").expect("Binary exists");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("crawl"));
}

#[test]
fn crawl_requires_config_argument() {
    let mut cmd = Command::cargo_bin("bucket-crawler").expect("Binary exists");
    cmd.arg("crawl");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--config"));
}

#[test]
fn crawl_fails_without_admin_key() {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        b"buckets:\n  official_buckets_list_url: \"https://example.com/buckets.json\"\n  ignored_buckets_list_url: \"https://example.com/ignored.csv\"\n  manual_buckets_list_url: \"https://example.com/manual.csv\"\nindex:\n  service_name: svc\n  index_name: idx\nqueue:\n  type: jsonl\n  path: ./queue.jsonl\n",
    )
    .expect("Writing temp config failed");

    let mut cmd = Command::cargo_bin("bucket-crawler").expect("Binary exists");
    cmd.arg("crawl")
        .arg("--config")
        .arg(config.path())
        .env_remove("AZURE_SEARCH_ADMIN_KEY");

    // The binary loads .env from its working directory; run it somewhere without one.
    let workdir = tempfile::tempdir().expect("temp dir");
    cmd.current_dir(workdir.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("AZURE_SEARCH_ADMIN_KEY"));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use bucket_crawler::cli::{run, Cli, Commands};

    // A missing config file fails the run after the initial event.
    let cli = Cli {
        command: Commands::Crawl {
            config: std::path::PathBuf::from("dummy.yaml"),
            max_parallelism: None,
        },
    };

    let result = run(cli).await;
    assert!(result.is_err());

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
