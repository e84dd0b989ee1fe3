//! # GitHub client
//!
//! Implements [`GitHubClient`] over `reqwest` for the crawler:
//!
//! - Plain text downloads of bucket lists (`fetch_text`).
//! - Search API pages (`search`) and repository lookups (`get_repository`), which
//!   log and return `None` on any failure, including rate limiting.
//! - Probe requests (`send`) through one of two clients: one following redirects,
//!   one with redirects disabled so a moved repository surfaces as a 3xx status.
//!
//! The token is only attached to requests for GitHub hosts.

use async_trait::async_trait;
use bucket_crawler_core::contract::{
    ClientError, GitHubClient, ProbeResponse, Repository, SearchResults,
};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{redirect, Client, Method, RequestBuilder, Response, StatusCode};
use url::Url;

use crate::load_config::GitHubSection;

const DEFAULT_USER_AGENT: &str = concat!("bucket-crawler/", env!("CARGO_PKG_VERSION"));
const GITHUB_JSON: &str = "application/vnd.github+json";

pub struct GitHubHttpClient {
    client: Client,
    no_redirect: Client,
    api_base_url: Url,
    token: Option<String>,
}

impl GitHubHttpClient {
    pub fn new(section: &GitHubSection, token: Option<String>) -> Result<Self, ClientError> {
        let user_agent = section
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let client = Client::builder().user_agent(user_agent.clone()).build()?;
        let no_redirect = Client::builder()
            .user_agent(user_agent)
            .redirect(redirect::Policy::none())
            .build()?;

        tracing::info!(
            api_base_url = %section.api_base_url,
            authenticated = token.is_some(),
            "Initialized GitHub client"
        );

        Ok(Self {
            client,
            no_redirect,
            api_base_url: section.api_base_url.clone(),
            token,
        })
    }

    fn is_github_host(&self, uri: &Url) -> bool {
        match uri.host_str() {
            Some(host) => {
                Some(host) == self.api_base_url.host_str()
                    || host == "github.com"
                    || host.ends_with(".githubusercontent.com")
            }
            None => false,
        }
    }

    fn authorize(&self, request: RequestBuilder, uri: &Url) -> RequestBuilder {
        match &self.token {
            Some(token) if self.is_github_host(uri) => match HeaderValue::from_str(&format!("token {token}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    request.header(AUTHORIZATION, value)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "GitHub token is not a valid header value, sending unauthenticated");
                    request
                }
            },
            _ => request,
        }
    }

    async fn get_api(&self, uri: &Url) -> Result<Response, reqwest::Error> {
        self.authorize(self.client.get(uri.clone()), uri)
            .header(ACCEPT, GITHUB_JSON)
            .send()
            .await
    }
}

/// Map `https://github.com/<owner>/<repo>` to the repository API endpoint.
pub fn repository_api_uri(api_base_url: &Url, bucket: &Url) -> Option<Url> {
    if bucket.host_str() != Some("github.com") {
        return None;
    }
    let mut segments = bucket.path_segments()?.filter(|s| !s.is_empty());
    let (owner, repo) = (segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let mut uri = api_base_url.clone();
    uri.path_segments_mut().ok()?.pop_if_empty().extend(["repos", owner, repo]);
    Some(uri)
}

fn log_unsuccessful(uri: &Url, response: &Response, what: &str) {
    let status = response.status();
    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        let reset = response
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        tracing::warn!(uri = %uri, status = %status, reset, "GitHub rate limit hit during {what}");
    } else {
        tracing::warn!(uri = %uri, status = %status, "GitHub returned an unsuccessful status during {what}");
    }
}

#[async_trait]
impl GitHubClient for GitHubHttpClient {
    async fn fetch_text(&self, uri: &Url) -> Result<String, ClientError> {
        tracing::debug!(uri = %uri, "Fetching text");
        let response = self
            .authorize(self.client.get(uri.clone()), uri)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    async fn search(&self, uri: &Url) -> Option<SearchResults> {
        tracing::debug!(uri = %uri, "Running GitHub search page");
        let response = match self.get_api(uri).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "GitHub search request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            log_unsuccessful(uri, &response, "search");
            return None;
        }
        match response.json::<SearchResults>().await {
            Ok(results) => Some(results),
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "Failed to decode GitHub search results");
                None
            }
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &Url,
        follow_redirects: bool,
    ) -> Result<ProbeResponse, ClientError> {
        let client = if follow_redirects {
            &self.client
        } else {
            &self.no_redirect
        };
        let response = self
            .authorize(client.request(method, uri.clone()), uri)
            .send()
            .await?;
        tracing::debug!(
            uri = %uri,
            status = %response.status(),
            final_uri = %response.url(),
            follow_redirects,
            "Probed bucket URI"
        );
        Ok(ProbeResponse {
            status: response.status().as_u16(),
            final_uri: Some(response.url().clone()),
        })
    }

    async fn get_repository(&self, bucket: &Url) -> Option<Repository> {
        let Some(uri) = repository_api_uri(&self.api_base_url, bucket) else {
            tracing::debug!(bucket = %bucket, "Not a GitHub repository, skipping lookup");
            return None;
        };
        let response = match self.get_api(&uri).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(bucket = %bucket, error = %e, "GitHub repository request failed");
                return None;
            }
        };
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(bucket = %bucket, "GitHub repository not found");
            return None;
        }
        if !response.status().is_success() {
            log_unsuccessful(&uri, &response, "repository lookup");
            return None;
        }
        match response.json::<Repository>().await {
            Ok(repo) => Some(repo),
            Err(e) => {
                tracing::warn!(bucket = %bucket, error = %e, "Failed to decode GitHub repository");
                None
            }
        }
    }
}
