use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use larder_core::models::{DeleteResponse, PushItem, ServerRecord, SyncPushResponse};
use larder_core::namespace::Namespace;
use larder_core::stats::ExpiryStats;
use larder_core::sync::{SyncError, SyncTransport};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Talks to a reconciliation server over HTTP+JSON.
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
}

#[derive(Serialize)]
struct PushBody<'a> {
    items: &'a [PushItem],
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base =
            Url::parse(base_url).with_context(|| format!("Invalid server URL '{base_url}'"))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            bail!("Server URL must be an http:// or https:// URL (got '{base_url}')");
        }
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "larder-cli/{} (expiry tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, base })
    }

    /// Append path segments to the base URL. Each segment is
    /// percent-encoded, so namespaces with spaces or `?` stay one segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::Transport("server URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn request_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else if err.is_decode() {
        SyncError::MalformedResponse(err.to_string())
    } else {
        SyncError::Transport(error_chain(&err))
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Map non-2xx to `Rejected` (using the server's `{error}` body when present)
/// and decode the rest.
async fn decode<R: DeserializeOwned>(resp: Response) -> Result<R, SyncError> {
    let status = resp.status();
    if !status.is_success() {
        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        return Err(SyncError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    resp.json::<R>().await.map_err(|e| {
        if e.is_timeout() {
            SyncError::Timeout
        } else {
            SyncError::MalformedResponse(e.to_string())
        }
    })
}

impl SyncTransport for HttpTransport {
    async fn push(&self, namespace: &Namespace, items: &[PushItem]) -> Result<(), SyncError> {
        let url = self.endpoint(&["sync", namespace.as_str()])?;
        let resp = self
            .client
            .post(url)
            .json(&PushBody { items })
            .send()
            .await
            .map_err(request_error)?;
        let body: SyncPushResponse = decode(resp).await?;
        if !body.success {
            return Err(SyncError::MalformedResponse(
                "server did not acknowledge push".to_string(),
            ));
        }
        Ok(())
    }

    async fn pull(&self, namespace: &Namespace) -> Result<Vec<ServerRecord>, SyncError> {
        let url = self.endpoint(&["sync", namespace.as_str()])?;
        let resp = self.client.get(url).send().await.map_err(request_error)?;
        decode(resp).await
    }

    async fn delete(&self, namespace: &Namespace, local_id: i64) -> Result<bool, SyncError> {
        let id = local_id.to_string();
        let url = self.endpoint(&["sync", namespace.as_str(), &id])?;
        let resp = self.client.delete(url).send().await.map_err(request_error)?;
        let body: DeleteResponse = decode(resp).await?;
        Ok(body.deleted)
    }

    async fn stats(&self, namespace: &Namespace) -> Result<ExpiryStats, SyncError> {
        let url = self.endpoint(&["stats", namespace.as_str()])?;
        let resp = self.client.get(url).send().await.map_err(request_error)?;
        decode(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_rejects_non_http_urls() {
        assert!(HttpTransport::new("ftp://example.com", Duration::from_secs(5)).is_err());
        assert!(HttpTransport::new("mailto:someone@example.com", Duration::from_secs(5)).is_err());
        assert!(HttpTransport::new("not a url", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_endpoint_encodes_namespace() {
        let t = transport("http://127.0.0.1:3000");
        let url = t.endpoint(&["sync", "THE SMITHS?#"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:3000/sync/THE%20SMITHS%3F%23");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let t = transport("https://example.com/larder/");
        let url = t.endpoint(&["stats", "HOME"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/larder/stats/HOME");

        let t = transport("https://example.com/larder");
        let url = t.endpoint(&["sync", "HOME", "7"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/larder/sync/HOME/7");
    }
}
