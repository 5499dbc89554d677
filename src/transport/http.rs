//! HTTP transport against an SDK server, plus the shared client.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use super::{Transport, TransportRequest, TransportResponse};
use crate::error::{GptscriptError, Result};

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// No overall timeout: a run streams for as long as the model keeps working.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Default headers, with a Bearer token when one is configured.
pub fn bearer_headers(token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    headers
}

/// Ensure a URL carries a scheme; bare `host:port` becomes `http://host:port`.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

/// Talks to a running `sys.sdkserver`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl AsRef<str>, token: Option<String>) -> Self {
        Self {
            base_url: normalize_url(base_url.as_ref()),
            token: token.filter(|t| !t.is_empty()),
            client: shared_client().clone(),
        }
    }

    /// Use a custom client (proxies, TLS roots).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = self.endpoint(&request.path);
        let builder = match &request.body {
            None => self.client.get(&url),
            Some(body) => self.client.post(&url).json(body),
        };

        debug!(url = %url, has_body = request.body.is_some(), "sending engine request");
        let resp = builder
            .headers(bearer_headers(self.token.as_deref()))
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(GptscriptError::from))
            .boxed();

        Ok(TransportResponse { status, body })
    }

    fn base_url(&self) -> Option<&str> {
        Some(&self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_addresses_get_a_scheme() {
        assert_eq!(normalize_url("127.0.0.1:9090"), "http://127.0.0.1:9090");
        assert_eq!(normalize_url("https://engine.local/"), "https://engine.local");
        assert_eq!(normalize_url(" 127.0.0.1:1234\n"), "http://127.0.0.1:1234");
    }

    #[test]
    fn token_is_optional() {
        assert!(bearer_headers(None).get(AUTHORIZATION).is_none());
        assert!(bearer_headers(Some("")).get(AUTHORIZATION).is_none());
        let headers = bearer_headers(Some("abc"));
        assert_eq!(headers.get(AUTHORIZATION).unwrap().to_str().unwrap(), "Bearer abc");
    }

    #[test]
    fn endpoint_joins_path() {
        let transport = HttpTransport::new("127.0.0.1:9090/", None);
        assert_eq!(transport.endpoint("run"), "http://127.0.0.1:9090/run");
        assert_eq!(
            transport.endpoint("/confirm/abc"),
            "http://127.0.0.1:9090/confirm/abc"
        );
    }
}
