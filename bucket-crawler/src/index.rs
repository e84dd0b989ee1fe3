#![doc = "Azure Cognitive Search implementation of the crawler's Indexer trait."]
//
//! # Index client
//!
//! Talks to the documents REST API of an Azure Cognitive Search index holding one
//! document per manifest. Bucket membership is the `Metadata/Repository` field:
//!
//! - `list_buckets`: facet-only query over `Metadata/Repository`.
//! - `get_manifests`: filtered search selecting only the stub fields, ordered by `Id`.
//! - `delete_manifests` / `add_manifests`: `delete` / `mergeOrUpload` batches.
//!
//! Searches follow `@search.nextPageParameters` until the service stops returning one.

use async_trait::async_trait;
use bucket_crawler_core::contract::{ClientError, Indexer, ManifestStub};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use url::Url;

use crate::load_config::IndexSection;

pub const ID_FIELD: &str = "Id";
pub const REPOSITORY_FIELD: &str = "Metadata/Repository";
pub const REPOSITORY_STARS_FIELD: &str = "Metadata/RepositoryStars";
pub const SHA_FIELD: &str = "Metadata/Sha";

/// Documents per indexing batch, the service maximum.
const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
struct SearchPage<T> {
    #[serde(rename = "@search.facets", default)]
    facets: HashMap<String, Vec<FacetValue>>,
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@search.nextPageParameters", default)]
    next_page_parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FacetValue {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct IndexingResult {
    key: String,
    status: bool,
    #[serde(rename = "errorMessage", default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexingResponse {
    #[serde(default)]
    value: Vec<IndexingResult>,
}

pub struct AzureSearchIndexer {
    client: Client,
    docs_uri: Url,
    api_version: String,
    admin_key: String,
}

/// Quote a string literal for an OData filter.
pub fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn facets_request() -> Value {
    json!({
        "search": "*",
        "facets": [format!("{REPOSITORY_FIELD},count:{}", i32::MAX)],
        "top": 0,
    })
}

pub fn manifests_request(bucket: &Url) -> Value {
    let select = [ID_FIELD, REPOSITORY_FIELD, REPOSITORY_STARS_FIELD, SHA_FIELD].join(",");
    json!({
        "search": "*",
        "filter": format!("{REPOSITORY_FIELD} eq {}", odata_literal(bucket.as_str())),
        "select": select,
        "orderby": ID_FIELD,
        "top": i32::MAX,
    })
}

/// Build an indexing batch applying `action` to every manifest.
pub fn index_batch(action: &str, manifests: &[ManifestStub]) -> Result<Value, serde_json::Error> {
    let documents = manifests
        .iter()
        .map(|manifest| {
            let mut document = if action == "delete" {
                let mut fields = serde_json::Map::new();
                fields.insert(ID_FIELD.to_string(), Value::String(manifest.id.clone()));
                Value::Object(fields)
            } else {
                serde_json::to_value(manifest)?
            };
            if let Value::Object(fields) = &mut document {
                fields.insert("@search.action".to_string(), Value::String(action.to_string()));
            }
            Ok(document)
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
    Ok(json!({ "value": documents }))
}

impl AzureSearchIndexer {
    pub fn new(section: &IndexSection, admin_key: String) -> Result<Self, ClientError> {
        let docs_uri = Url::parse(&format!(
            "https://{}.search.windows.net/indexes/{}/docs/",
            section.service_name, section.index_name
        ))?;
        tracing::info!(
            service = %section.service_name,
            index = %section.index_name,
            api_version = %section.api_version,
            "Initialized Azure Search indexer"
        );
        Ok(Self {
            client: Client::new(),
            docs_uri,
            api_version: section.api_version.clone(),
            admin_key,
        })
    }

    fn endpoint(&self, operation: &str) -> Result<Url, ClientError> {
        let mut uri = self.docs_uri.join(operation)?;
        uri.query_pairs_mut().append_pair("api-version", &self.api_version);
        Ok(uri)
    }

    async fn post<T: DeserializeOwned>(&self, operation: &str, body: &Value) -> Result<(StatusCode, T), ClientError> {
        let response = self
            .client
            .post(self.endpoint(operation)?)
            .header("api-key", &self.admin_key)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        let status = response.status();
        Ok((status, response.json::<T>().await?))
    }

    /// Run a search and follow its continuations, handing every page to `on_page`.
    async fn search_all<T, F>(&self, body: Value, mut on_page: F) -> Result<(), ClientError>
    where
        T: DeserializeOwned,
        F: FnMut(SearchPage<T>),
    {
        let mut next = Some(body);
        while let Some(body) = next.take() {
            let (_, mut page): (_, SearchPage<T>) = self.post("search", &body).await?;
            next = page.next_page_parameters.take();
            on_page(page);
        }
        Ok(())
    }

    async fn index(&self, action: &str, manifests: &[ManifestStub]) -> Result<(), ClientError> {
        for chunk in manifests.chunks(MAX_BATCH_SIZE) {
            let batch = index_batch(action, chunk)?;
            let (status, response): (_, IndexingResponse) = self.post("index", &batch).await?;
            if status == StatusCode::MULTI_STATUS {
                let failed: Vec<String> = response
                    .value
                    .iter()
                    .filter(|r| !r.status)
                    .map(|r| format!("{}: {}", r.key, r.error_message.as_deref().unwrap_or("unknown error")))
                    .collect();
                tracing::error!(action, failed = failed.len(), "Index batch partially failed");
                return Err(format!("{action} batch partially failed: {}", failed.join("; ")).into());
            }
            tracing::debug!(action, documents = chunk.len(), "Index batch applied");
        }
        Ok(())
    }
}

#[async_trait]
impl Indexer for AzureSearchIndexer {
    async fn list_buckets(&self) -> Result<Vec<Url>, ClientError> {
        let mut buckets = Vec::new();
        self.search_all::<Value, _>(facets_request(), |page| {
            for facet in page.facets.into_values().flatten() {
                match facet.value.as_str().map(Url::parse) {
                    Some(Ok(uri)) => buckets.push(uri),
                    _ => tracing::warn!(value = %facet.value, "Skipping invalid repository facet"),
                }
            }
        })
        .await?;
        tracing::info!(count = buckets.len(), "Listed buckets present in the index");
        Ok(buckets)
    }

    async fn get_manifests(&self, bucket: &Url) -> Result<Vec<ManifestStub>, ClientError> {
        let mut manifests = Vec::new();
        self.search_all::<ManifestStub, _>(manifests_request(bucket), |page| manifests.extend(page.value))
            .await?;
        tracing::debug!(bucket = %bucket, count = manifests.len(), "Fetched manifests of bucket");
        Ok(manifests)
    }

    async fn delete_manifests(&self, manifests: &[ManifestStub]) -> Result<(), ClientError> {
        self.index("delete", manifests).await
    }

    async fn add_manifests(&self, manifests: &[ManifestStub]) -> Result<(), ClientError> {
        self.index("mergeOrUpload", manifests).await
    }
}
