//! Error types for the KPS client

use crate::models::VerificationResult;
use thiserror::Error;

/// Result type alias for KPS operations
pub type KpsResult<T> = Result<T, KpsError>;

/// Errors that can occur while negotiating, signing, sending or parsing a query
#[derive(Error, Debug)]
pub enum KpsError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Token negotiation failed: HTTP {status}")]
    NegotiationFailed { status: u16, body: String },

    #[error("Token negotiation response unusable: {reason}")]
    NegotiationParseError { reason: String, body: String },

    #[error("Signing failed at {stage}: {reason}")]
    SigningFailed { stage: &'static str, reason: String },

    #[error("Service returned HTTP {status}")]
    ServiceHttp { status: u16, body: String },

    #[error("Response is not well-formed XML: {0}")]
    ResponseMalformed(String),

    #[error("Malformed XML fragment: {0}")]
    MalformedFragment(String),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Request cancelled before completion")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl KpsError {
    /// Raw response body carried by the error, if the failing endpoint sent one.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::NegotiationFailed { body, .. }
            | Self::NegotiationParseError { body, .. }
            | Self::ServiceHttp { body, .. } => Some(body),
            _ => None,
        }
    }

    pub(crate) fn signing(stage: &'static str, err: KpsError) -> Self {
        let reason = match err {
            Self::MalformedFragment(r) | Self::InvalidKey(r) => r,
            other => other.to_string(),
        };
        Self::SigningFailed { stage, reason }
    }
}

impl From<reqwest::Error> for KpsError {
    fn from(err: reqwest::Error) -> Self {
        KpsError::Transport(err.to_string())
    }
}

impl From<config::ConfigError> for KpsError {
    fn from(err: config::ConfigError) -> Self {
        KpsError::Config(err.to_string())
    }
}

/// A failed query: the error plus the best-effort result a caller can still display.
///
/// `partial` always has `status == false` and `code == 2`; `partial.raw` holds the
/// last response body seen, when there was one.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct QueryFailure {
    #[source]
    pub source: KpsError,
    pub partial: VerificationResult,
}

impl QueryFailure {
    pub fn new(source: KpsError, partial: VerificationResult) -> Self {
        Self { source, partial }
    }

    pub fn into_parts(self) -> (KpsError, VerificationResult) {
        (self.source, self.partial)
    }
}
