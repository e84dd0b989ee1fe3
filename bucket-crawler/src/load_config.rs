/// `load_config` module: Loads a static YAML config and injects secrets from the environment.
///
/// This module is the only place where the untrusted YAML file is parsed and mapped
/// to the typed configuration used by the crawler and its clients.
///
/// # Responsibilities
/// - Parse the YAML file into [`CliConfig`] (bucket lists, GitHub, index and queue sections)
/// - Canonicalize the bucket identities written directly in the config
/// - Inject secrets (`GITHUB_TOKEN`, `AZURE_SEARCH_ADMIN_KEY`, `AZURE_QUEUE_SAS`) from the environment
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use bucket_crawler_core::config::BucketsConfig;
use bucket_crawler_core::identity::canonical_identity;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use url::Url;

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
pub const DEFAULT_SEARCH_API_VERSION: &str = "2020-06-30";

#[derive(Debug)]
pub struct CliConfig {
    pub buckets: BucketsConfig,
    pub github: GitHubSection,
    pub index: IndexSection,
    pub queue: QueueSection,
    pub secrets: Secrets,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubSection {
    #[serde(default = "default_github_api")]
    pub api_base_url: Url,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            api_base_url: default_github_api(),
            user_agent: None,
        }
    }
}

fn default_github_api() -> Url {
    Url::parse(DEFAULT_GITHUB_API).expect("default GitHub API URL is valid")
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexSection {
    pub service_name: String,
    pub index_name: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_api_version() -> String {
    DEFAULT_SEARCH_API_VERSION.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueueSection {
    /// Azure Storage queue, authorized by a SAS token from `AZURE_QUEUE_SAS`.
    Azure { queue_url: Url },
    /// Local JSON-lines file, one work item per line.
    Jsonl { path: PathBuf },
}

/// Secrets never read from the YAML file.
#[derive(Clone, Default)]
pub struct Secrets {
    pub github_token: Option<String>,
    pub search_admin_key: String,
    pub queue_sas: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("github_token", &self.github_token.as_ref().map(|_| "<redacted>"))
            .field("search_admin_key", &"<redacted>")
            .field("queue_sas", &self.queue_sas.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    buckets: BucketsConfig,
    #[serde(default)]
    github: GitHubSection,
    index: IndexSection,
    queue: QueueSection,
}

fn canonicalize_all(buckets: &HashSet<Url>, kind: &str) -> HashSet<Url> {
    buckets
        .iter()
        .filter_map(|uri| match canonical_identity(uri.as_str()) {
            Ok(canonical) => Some(canonical),
            Err(e) => {
                warn!(bucket = %uri, kind, error = %e, "Dropping config bucket that cannot be canonicalized");
                None
            }
        })
        .collect()
}

fn required_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => {
            info!(var = name, "Secret found in env");
            Ok(value)
        }
        Ok(_) => {
            error!(var = name, "Environment variable is empty");
            Err(anyhow::anyhow!("{name} environment variable is empty"))
        }
        Err(e) => {
            error!(error = ?e, var = name, "Environment variable not set");
            Err(anyhow::anyhow!("{name} environment variable not set: {e}"))
        }
    }
}

/// Loads a static YAML config file (no secrets) and injects required env vars for secrets.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    raw.buckets.ignored_buckets = canonicalize_all(&raw.buckets.ignored_buckets, "ignored");
    raw.buckets.manual_buckets = canonicalize_all(&raw.buckets.manual_buckets, "manual");
    raw.buckets.trace_loaded();

    let github_token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
    if github_token.is_none() {
        warn!("GITHUB_TOKEN not set, GitHub requests will be unauthenticated");
    }

    let search_admin_key = required_env("AZURE_SEARCH_ADMIN_KEY")?;

    let queue_sas = match &raw.queue {
        QueueSection::Azure { .. } => Some(required_env("AZURE_QUEUE_SAS")?),
        QueueSection::Jsonl { .. } => None,
    };

    info!(
        service = %raw.index.service_name,
        index = %raw.index.index_name,
        queue = ?raw.queue,
        "Config loaded and merged successfully"
    );

    Ok(CliConfig {
        buckets: raw.buckets,
        github: raw.github,
        index: raw.index,
        queue: raw.queue,
        secrets: Secrets {
            github_token,
            search_admin_key,
            queue_sas,
        },
    })
}
