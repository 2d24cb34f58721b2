//! Immutable client configuration.
//!
//! A `ClientConfig` is built once and handed to `Client`; nothing about the
//! account, key or endpoint lives in process-wide state.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};

pub const ENV_SUBDOMAIN: &str = "RECURLY_SUBDOMAIN";
pub const ENV_API_KEY: &str = "RECURLY_API_KEY";
pub const ENV_BASE_URL: &str = "RECURLY_BASE_URL";

/// Credentials and endpoint for one Recurly site.
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    subdomain: String,
    api_key: String,
    /// Overrides `https://{subdomain}.recurly.com/`.
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

impl ClientConfig {
    pub fn new(subdomain: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into(),
            api_key: api_key.into(),
            base_url: None,
            timeout_ms: None,
        }
    }

    /// Point the client at another host, e.g. a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Upper bound for a single HTTP round-trip.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Read `RECURLY_SUBDOMAIN`, `RECURLY_API_KEY` and optionally
    /// `RECURLY_BASE_URL` from the environment.
    pub fn from_env() -> Result<Self> {
        let subdomain = std::env::var(ENV_SUBDOMAIN).unwrap_or_default();
        let api_key =
            std::env::var(ENV_API_KEY).map_err(|_| Error::Config(format!("{ENV_API_KEY} is not set")))?;
        let mut config = Self::new(subdomain, api_key);
        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            config = config.with_base_url(base_url);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("API key is empty".to_string()));
        }
        if self.base_url.is_none() && self.subdomain.trim().is_empty() {
            return Err(Error::Config("subdomain is empty and no base URL is set".to_string()));
        }
        Ok(())
    }

    /// Host root with a trailing slash, before the API version prefix.
    pub fn base_url(&self) -> Result<Url> {
        let raw = match &self.base_url {
            Some(base_url) => base_url.clone(),
            None => format!("https://{}.recurly.com/", self.subdomain),
        };
        let mut url = Url::parse(&raw).map_err(|e| Error::Config(format!("base URL {raw:?}: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(Error::Config(format!("base URL {raw:?} cannot hold a path")));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("subdomain", &self.subdomain)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}
