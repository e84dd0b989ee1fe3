//! Bucket identities: canonical repository URIs and their validation.

use reqwest::Method;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use crate::contract::GitHubClient;

/// Canonical form of a repository URI: surrounding whitespace, trailing slashes
/// and any trailing `.git` suffix removed. Applying it twice changes nothing.
pub fn canonical_identity(raw: &str) -> Result<Url, url::ParseError> {
    let mut trimmed = raw.trim();
    loop {
        let next = trimmed.trim_end_matches('/');
        let next = next.strip_suffix(".git").unwrap_or(next);
        if next == trimmed {
            break;
        }
        trimmed = next;
    }
    Url::parse(trimmed)
}

/// Probe a bucket URI listed in `list_url` and return where it really lives.
///
/// The probe is a HEAD request, redirect-following only when `follow_redirects`
/// is set. Unparseable URIs, failed requests, unsuccessful statuses and probes
/// without a final URI are dropped with a warning. A redirect is reported but
/// its canonical target is accepted as the identity.
pub async fn validate_bucket<G>(
    github: &G,
    raw: &str,
    follow_redirects: bool,
    list_url: &Url,
    cancel: &CancellationToken,
) -> Option<Url>
where
    G: GitHubClient + ?Sized,
{
    let uri = match canonical_identity(raw) {
        Ok(uri) => uri,
        Err(e) => {
            warn!(raw = %raw, list = %list_url, error = %e, "Skipping unparseable bucket URI");
            return None;
        }
    };

    let response = cancel
        .run_until_cancelled(github.send(Method::HEAD, &uri, follow_redirects))
        .await?;

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!(bucket = %uri, list = %list_url, error = %e, "Skipping bucket because the probe failed");
            return None;
        }
    };

    if !response.is_success() {
        warn!(
            bucket = %uri,
            list = %list_url,
            status = response.status,
            "Skipping bucket because it returns an unsuccessful status"
        );
        return None;
    }

    let final_uri = match canonical_identity(response.final_uri?.as_str()) {
        Ok(final_uri) => final_uri,
        Err(e) => {
            warn!(bucket = %uri, list = %list_url, error = %e, "Skipping bucket with an unparseable redirect target");
            return None;
        }
    };
    if final_uri != uri {
        warn!(bucket = %uri, redirect = %final_uri, list = %list_url, "Bucket redirects to another location");
    }
    Some(final_uri)
}
