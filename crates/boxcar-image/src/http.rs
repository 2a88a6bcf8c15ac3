//! Shared HTTP client pool.
//!
//! A single pull re-uses two pooled reqwest clients: one that verifies TLS
//! certificates and one that does not. Which pool a registry gets is decided
//! by its `insecure_tls` flag; the directory service always goes through the
//! verifying pool.

use std::time::Duration;

use reqwest::Client;

use crate::config::RegistryConfig;
use crate::error::Result;

/// User agent sent on every request.
pub const USER_AGENT: &str = concat!("boxcar/", env!("CARGO_PKG_VERSION"));

/// Connect timeout shared by both pools. Request deadlines are applied per
/// call so that long blob downloads are not bounded by the probe timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The pooled transport pair shared by all components within a pull.
#[derive(Debug, Clone)]
pub struct HttpClients {
    verifying: Client,
    insecure: Client,
}

impl HttpClients {
    /// Builds both client pools.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        let verifying = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let insecure = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            verifying,
            insecure,
        })
    }

    /// Returns the pool matching the registry's TLS policy.
    #[must_use]
    pub fn for_registry(&self, registry: &RegistryConfig) -> &Client {
        if registry.insecure_tls {
            &self.insecure
        } else {
            &self.verifying
        }
    }

    /// Returns the certificate-verifying pool.
    #[must_use]
    pub fn verifying(&self) -> &Client {
        &self.verifying
    }
}

/// Converts a registry host into a base URL. Hosts already carrying a scheme
/// are used verbatim, everything else is `https`.
#[must_use]
pub fn base_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{host}")
    }
}
