//! HTTP POST of a SOAP body, returning status and body. Used by the STS exchange and the query call.

use crate::error::KpsResult;
use async_trait::async_trait;
use std::time::Duration;

/// Content type required by both SOAP 1.2 endpoints.
pub const SOAP12_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Status and body of one HTTP exchange. Non-2xx statuses are not errors here;
/// callers decide what a status means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// One POST round-trip. Implementations fail only for connection-level problems.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: &str, content_type: &str, body: String) -> KpsResult<HttpReply>;
}

/// reqwest-backed transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> KpsResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Use a caller-built client (proxies, custom roots, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(&self, url: &str, content_type: &str, body: String) -> KpsResult<HttpReply> {
        let res = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        let status = res.status().as_u16();
        let body = res.text().await?;
        tracing::debug!(target: "kps::transport", url, status, bytes = body.len(), "POST completed");
        Ok(HttpReply { status, body })
    }
}
