//! Query orchestration: negotiate → sign → send → parse.

use crate::config::ClientConfig;
use crate::envelope::{build_query_body, build_signed_envelope};
use crate::error::{KpsError, KpsResult, QueryFailure};
use crate::models::{QueryRequest, VerificationResult};
use crate::protocol::{self, ValidityWindow};
use crate::response;
use crate::sts;
use crate::transport::{ReqwestTransport, Transport, SOAP12_CONTENT_TYPE};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

/// Identity verification client.
///
/// Holds only immutable configuration and a shared transport, so it is cheap to
/// clone and safe to use from many tasks at once. Every query negotiates its own
/// token; nothing is cached between calls.
#[derive(Clone)]
pub struct KpsClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
}

impl KpsClient {
    /// Client over HTTPS with the configured per-call timeout.
    pub fn new(config: ClientConfig) -> KpsResult<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(config.timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run one verification. On failure the error carries a displayable partial result.
    pub async fn query(&self, request: &QueryRequest) -> Result<VerificationResult, QueryFailure> {
        tracing::info!(target: "kps::client", query_url = %self.config.query_url, "verification query started");

        let result = self.run(request).await;
        match &result {
            Ok(res) => tracing::info!(
                target: "kps::client",
                code = res.code,
                person = ?res.person,
                "verification query completed"
            ),
            Err(failure) => tracing::warn!(
                target: "kps::client",
                error = %failure.source,
                "verification query failed"
            ),
        }
        result
    }

    /// [`query`](Self::query), abandoned with [`KpsError::Cancelled`] once `deadline` passes.
    pub async fn query_until(
        &self,
        request: &QueryRequest,
        deadline: Instant,
    ) -> Result<VerificationResult, QueryFailure> {
        self.query_with_signal(request, tokio::time::sleep_until(deadline))
            .await
    }

    /// [`query`](Self::query), abandoned with [`KpsError::Cancelled`] as soon as `signal`
    /// completes. The in-flight request is dropped.
    pub async fn query_with_signal<F>(
        &self,
        request: &QueryRequest,
        signal: F,
    ) -> Result<VerificationResult, QueryFailure>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.query(request) => result,
            _ = signal => {
                tracing::warn!(target: "kps::client", "verification query cancelled");
                Err(QueryFailure::new(
                    KpsError::Cancelled,
                    VerificationResult::failed("request cancelled", ""),
                ))
            }
        }
    }

    async fn run(&self, request: &QueryRequest) -> Result<VerificationResult, QueryFailure> {
        let artifacts = sts::negotiate(self.transport.as_ref(), &self.config)
            .await
            .map_err(|e| failure("token negotiation failed", e))?;

        let raw = self
            .call_service(artifacts, request)
            .await
            .map_err(|e| failure("service call failed", e))?;

        response::parse_response(&raw)
    }

    async fn call_service(
        &self,
        artifacts: sts::TokenArtifacts,
        request: &QueryRequest,
    ) -> KpsResult<String> {
        let body = build_query_body(request);
        let envelope = build_signed_envelope(
            artifacts,
            &body,
            &self.config.query_url,
            &ValidityWindow::now(),
            &protocol::message_id(),
        )?;
        tracing::debug!(
            target: "kps::client",
            message_id = envelope.message_id(),
            digest = envelope.digest_value(),
            "envelope signed"
        );

        let reply = self
            .transport
            .post(&self.config.query_url, SOAP12_CONTENT_TYPE, envelope.into_string())
            .await?;
        if !reply.is_ok() {
            tracing::warn!(target: "kps::client", status = reply.status, "service returned non-200");
            return Err(KpsError::ServiceHttp {
                status: reply.status,
                body: reply.body,
            });
        }
        Ok(reply.body)
    }
}

fn failure(stage: &str, err: KpsError) -> QueryFailure {
    let partial = VerificationResult::failed(
        format!("{stage}: {err}"),
        err.body().unwrap_or_default(),
    );
    QueryFailure::new(err, partial)
}
