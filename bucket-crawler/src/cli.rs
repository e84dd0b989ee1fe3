///
/// This module implements the CLI interface for bucket-crawler: command parsing,
/// client construction, and the async entrypoint that runs one crawl.
///
/// All crawl logic (sources, reconciliation, cleanup, dispatch) lives in the
/// [`bucket-crawler-core`] crate. This module is strictly for CLI glue: it wires
/// the configured HTTP clients into [`synchronise`] and turns Ctrl-C into cancellation.
///
/// ## How To Use
/// - For command-line users: use the installed `bucket-crawler` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`bucket-crawler-core`]: ../../bucket-crawler-core/
/// [`Cli`]: struct.Cli.html
/// [`run`]: fn.run.html
use crate::github::GitHubHttpClient;
use crate::index::AzureSearchIndexer;
use crate::load_config::load_config;
use crate::queue::QueueClient;
use anyhow::Result;
use bucket_crawler_core::synchronise::{synchronise, CrawlError, CrawlReport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// CLI for bucket-crawler: discover buckets and queue them for indexing.
#[derive(Parser)]
#[clap(
    name = "bucket-crawler",
    version,
    about = "Discover package buckets, remove stale ones from the search index, and queue the rest for indexing"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one crawl using the given config file
    Crawl {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Override the configured number of concurrent network operations
        #[clap(long)]
        max_parallelism: Option<usize>,
    },
}

fn log_report(report: &CrawlReport) {
    tracing::info!(
        command = "crawl",
        official = report.official_buckets,
        github = report.github_buckets,
        manual_config = report.manual_config_buckets,
        manual_list = report.manual_list_buckets,
        ignored_config = report.ignored_config_buckets,
        ignored_list = report.ignored_list_buckets,
        authoritative = report.authoritative_buckets,
        deleted_buckets = report.cleanup.deleted_buckets.len(),
        deleted_manifests = report.cleanup.deleted_manifests,
        dispatched = report.dispatch.dispatched.len(),
        "Crawl complete"
    );
    if !report.cleanup.failed_buckets.is_empty() || !report.dispatch.failed.is_empty() {
        tracing::warn!(
            command = "crawl",
            cleanup_failures = ?report.cleanup.failed_buckets,
            dispatch_failures = ?report.dispatch.failed,
            "Crawl finished with failures"
        );
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Crawl {
            config,
            max_parallelism,
        } => {
            let mut config = load_config(config)?;
            if let Some(limit) = max_parallelism {
                config.buckets.max_parallelism = limit;
            }
            tracing::info!(command = "crawl", "Starting crawl");

            let github = GitHubHttpClient::new(&config.github, config.secrets.github_token.clone())
                .map_err(|e| anyhow::anyhow!("Failed to construct GitHub client: {e}"))?;
            let indexer = AzureSearchIndexer::new(&config.index, config.secrets.search_admin_key.clone())
                .map_err(|e| anyhow::anyhow!("Failed to construct index client: {e}"))?;
            let queue = QueueClient::from_config(&config.queue, config.secrets.queue_sas.as_deref())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to construct queue client: {e}"))?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!(command = "crawl", "Interrupt received, cancelling crawl");
                    on_interrupt.cancel();
                }
            });

            let result = synchronise(&config.buckets, &github, &indexer, &queue, &cancel).await;
            interrupt.abort();

            match result {
                Ok(report) => {
                    log_report(&report);
                    Ok(())
                }
                Err(CrawlError::Cancelled) => {
                    tracing::error!(command = "crawl", "Crawl cancelled");
                    Err(anyhow::Error::msg(CrawlError::Cancelled))
                }
            }
        }
    }
}
