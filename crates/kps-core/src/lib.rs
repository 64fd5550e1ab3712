//! # KPS Core - Signed identity verification client
//!
//! Talks to the population registry's all-registries verification service. Each
//! query negotiates a fresh symmetric token from the WS-Trust STS, signs the
//! request timestamp with it, and reads the verdict out of whichever person
//! bucket the service filled.
//!
//! ## Pipeline
//!
//! ```text
//! ┌────────────────┐   ┌───────────────────┐   ┌─────────────┐   ┌─────────────────┐
//! │ sts::negotiate │ → │ envelope (c14n,   │ → │  Transport  │ → │ response::parse │
//! │ (WS-Trust 1.3) │   │ SHA-1, HMAC-SHA1) │   │ (SOAP 1.2)  │   │ (bucket order)  │
//! └────────────────┘   └───────────────────┘   └─────────────┘   └─────────────────┘
//! ```
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use kps_core::{ClientConfig, KpsClient, QueryRequest};
//!
//! let client = KpsClient::new(ClientConfig::from_env()?)?;
//! let request = QueryRequest::new("99999999999", "JOHN", "DOE", "1990");
//! match client.query(&request).await {
//!     Ok(result) => println!("code {}", result.code),
//!     Err(failure) => println!("{}: {}", failure.source, failure.partial.aciklama),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod models;
pub mod protocol;
pub mod response;
pub mod signer;
pub mod sts;
pub mod transport;
pub mod xml;

pub use client::KpsClient;
pub use config::ClientConfig;
pub use envelope::{build_query_body, build_signed_envelope, SignedEnvelope};
pub use error::{KpsError, KpsResult, QueryFailure};
pub use models::{
    PersonCategory, PersonField, QueryRequest, VerificationResult, CODE_ACTIVE, CODE_DECEASED,
    CODE_NOT_FOUND, RECORD_NOT_FOUND,
};
pub use response::{join_date, parse_response, BucketOrder};
pub use sts::{negotiate, OpaqueToken, TokenArtifacts};
pub use transport::{HttpReply, ReqwestTransport, Transport, SOAP12_CONTENT_TYPE};
pub use xml::canonicalize;
