//! Client configuration: credentials, endpoints and the per-call timeout.
//!
//! The client never reads the environment itself; build a [`ClientConfig`]
//! explicitly, from env with [`ClientConfig::from_env`], or from a TOML file
//! layered under `KPS__*` variables with [`ClientConfig::load`].
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | KPS_USERNAME | (required) | STS username. |
//! | KPS_PASSWORD | (required) | STS password. |
//! | KPS_STS_URL | production issuer | WS-Trust 1.3 endpoint. |
//! | KPS_QUERY_URL | production routing service | Query endpoint, also the token's `AppliesTo`. |
//! | KPS_TIMEOUT_SECS | 30 | Timeout applied to each of the two HTTP calls. |

use crate::error::{KpsError, KpsResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_STS_URL: &str =
    "https://kimlikdogrulama.nvi.gov.tr/Services/Issuer.svc/IWSTrust13";
pub const DEFAULT_QUERY_URL: &str = "https://kpsv2.nvi.gov.tr/Services/RoutingService.svc";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_sts_url() -> String {
    DEFAULT_STS_URL.to_string()
}

fn default_query_url() -> String {
    DEFAULT_QUERY_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Immutable client settings. `Debug` never prints the password.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub username: String,
    pub password: String,
    #[serde(default = "default_sts_url")]
    pub sts_url: String,
    #[serde(default = "default_query_url")]
    pub query_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("sts_url", &self.sts_url)
            .field("query_url", &self.query_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ClientConfig {
    /// Production endpoints and the default timeout.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            sts_url: default_sts_url(),
            query_url: default_query_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_sts_url(mut self, url: impl Into<String>) -> Self {
        self.sts_url = url.into();
        self
    }

    pub fn with_query_url(mut self, url: impl Into<String>) -> Self {
        self.query_url = url.into();
        self
    }

    /// The timeout is kept in whole seconds. A fractional part rounds up, so
    /// 1.5 s becomes 2 s and anything under a second becomes 1 s.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let rounded = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.timeout_secs = rounded.max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Load from `KPS_*` environment variables (see module docs).
    pub fn from_env() -> KpsResult<Self> {
        let username = env_opt_string("KPS_USERNAME").unwrap_or_default();
        let password = env_opt_string("KPS_PASSWORD").unwrap_or_default();
        let mut config = Self::new(username, password);
        if let Some(url) = env_opt_string("KPS_STS_URL") {
            config.sts_url = url;
        }
        if let Some(url) = env_opt_string("KPS_QUERY_URL") {
            config.query_url = url;
        }
        config.timeout_secs = env_timeout_secs();
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file (if it exists) overlaid with `KPS__*` variables,
    /// e.g. `KPS__PASSWORD`, `KPS__TIMEOUT_SECS`.
    pub fn load(path: impl AsRef<Path>) -> KpsResult<Self> {
        let path = path.as_ref();
        let builder = config::Config::builder()
            .set_default("sts_url", DEFAULT_STS_URL)?
            .set_default("query_url", DEFAULT_QUERY_URL)?
            .set_default("timeout_secs", DEFAULT_TIMEOUT_SECS as i64)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix("KPS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Credentials present, endpoints set and a non-zero timeout.
    pub fn validate(&self) -> KpsResult<()> {
        if self.username.trim().is_empty() || self.password.trim().is_empty() {
            return Err(KpsError::Config(
                "username and password are required (KPS_USERNAME / KPS_PASSWORD)".to_string(),
            ));
        }
        if self.sts_url.trim().is_empty() || self.query_url.trim().is_empty() {
            return Err(KpsError::Config("endpoint URLs must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(KpsError::Config("timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_timeout_secs() -> u64 {
    match std::env::var("KPS_TIMEOUT_SECS") {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|&s| s > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
        Err(_) => DEFAULT_TIMEOUT_SECS,
    }
}
