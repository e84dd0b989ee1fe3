//! Outbound queue sinks for dispatched buckets.
//!
//! [`AzureStorageQueue`] posts each item as a base64-encoded JSON message, the format
//! the downstream indexing function consumes. [`JsonLinesQueue`] appends items to a
//! local file, one JSON object per line.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bucket_crawler_core::contract::{BucketQueue, ClientError, QueueItem};
use reqwest::Client;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use url::Url;

use crate::load_config::QueueSection;

pub struct AzureStorageQueue {
    client: Client,
    messages_uri: Url,
}

/// Append `/messages` to the queue URL and attach the SAS token as its query.
pub fn messages_uri(queue_url: &Url, sas: &str) -> Result<Url, ClientError> {
    let mut uri = queue_url.clone();
    uri.path_segments_mut()
        .map_err(|_| format!("queue URL cannot be a base: {queue_url}"))?
        .pop_if_empty()
        .push("messages");
    uri.set_query(Some(sas.trim_start_matches('?')));
    Ok(uri)
}

/// XML envelope of a queue message carrying `item` as base64 JSON.
pub fn queue_message(item: &QueueItem) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(item)?;
    Ok(format!(
        "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
        STANDARD.encode(json)
    ))
}

impl AzureStorageQueue {
    pub fn new(queue_url: &Url, sas: &str) -> Result<Self, ClientError> {
        let messages_uri = messages_uri(queue_url, sas)?;
        tracing::info!(queue = %queue_url, "Initialized Azure Storage queue");
        Ok(Self {
            client: Client::new(),
            messages_uri,
        })
    }
}

#[async_trait]
impl BucketQueue for AzureStorageQueue {
    async fn enqueue(&self, item: &QueueItem) -> Result<(), ClientError> {
        let body = queue_message(item)?;
        self.client
            .post(self.messages_uri.clone())
            .header("content-type", "application/xml")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

pub struct JsonLinesQueue {
    file: Mutex<File>,
}

impl JsonLinesQueue {
    pub async fn open(path: &Path) -> Result<Self, ClientError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        tracing::info!(path = %path.display(), "Opened JSON-lines queue");
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl BucketQueue for JsonLinesQueue {
    async fn enqueue(&self, item: &QueueItem) -> Result<(), ClientError> {
        let mut line = serde_json::to_vec(item)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Queue selected by the `queue` config section.
pub enum QueueClient {
    Azure(AzureStorageQueue),
    JsonLines(JsonLinesQueue),
}

impl QueueClient {
    pub async fn from_config(section: &QueueSection, sas: Option<&str>) -> Result<Self, ClientError> {
        match section {
            QueueSection::Azure { queue_url } => {
                let sas = sas.ok_or("AZURE_QUEUE_SAS is required for the azure queue")?;
                Ok(QueueClient::Azure(AzureStorageQueue::new(queue_url, sas)?))
            }
            QueueSection::Jsonl { path } => Ok(QueueClient::JsonLines(JsonLinesQueue::open(path).await?)),
        }
    }
}

#[async_trait]
impl BucketQueue for QueueClient {
    async fn enqueue(&self, item: &QueueItem) -> Result<(), ClientError> {
        match self {
            QueueClient::Azure(queue) => queue.enqueue(item).await,
            QueueClient::JsonLines(queue) => queue.enqueue(item).await,
        }
    }
}
