//! Configuration types for unifi-names-dns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::DnsError;
use crate::unifi::Fingerprint;
use crate::zones::ZoneTable;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    #[serde(default)]
    pub dns: DnsConfig,

    /// Controller configuration.
    pub unifi: UnifiConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for DNS server to listen on (UDP and TCP).
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Refresh interval of the client list in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Network tag -> domain, e.g. `LAN = "example.com"`.
    /// A client named "Joe's Notebook" on `LAN` becomes
    /// `joe-s-notebook.example.com.`.
    #[serde(default)]
    pub networks: HashMap<String, String>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            ttl: default_ttl(),
            networks: HashMap::new(),
        }
    }
}

/// UniFi controller configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct UnifiConfig {
    /// Controller URL, e.g. `https://localhost:8443`.
    #[serde(default)]
    pub url: String,

    /// Site name, usually `default`.
    #[serde(default)]
    pub site: String,

    /// Login user.
    #[serde(default)]
    pub username: String,

    /// Login password.
    #[serde(default)]
    pub password: String,

    /// Expected SHA-1 fingerprint of the controller certificate, in hex.
    /// Without it the controller certificate is not verified at all.
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl std::fmt::Debug for UnifiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiConfig")
            .field("url", &self.url)
            .field("site", &self.site)
            .field("username", &self.username)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "unifi_names_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0u16; 8], 53))
}

fn default_ttl() -> u32 {
    60 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration after validation, ready to build the server from.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    /// Listen address.
    pub listen_addr: SocketAddr,
    /// Refresh interval.
    pub ttl: Duration,
    /// Network -> zone table.
    pub zones: ZoneTable,
    /// Controller URL without trailing slash.
    pub url: String,
    /// Controller site.
    pub site: String,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Optional certificate pin.
    pub fingerprint: Option<Fingerprint>,
}

impl Config {
    /// Check required settings and normalize them.
    pub fn validate(&self) -> Result<ValidatedConfig, DnsError> {
        let zones = ZoneTable::new(&self.dns.networks)?;

        let unifi = &self.unifi;
        let url = unifi.url.trim_end_matches('/').to_string();
        if url.is_empty() {
            return Err(DnsError::Config("no controller url set".into()));
        }
        if unifi.site.is_empty() {
            return Err(DnsError::Config("no controller site set".into()));
        }
        if unifi.username.is_empty() {
            return Err(DnsError::Config("no controller username set".into()));
        }
        if unifi.password.is_empty() {
            return Err(DnsError::Config("no controller password set".into()));
        }

        let fingerprint = unifi
            .fingerprint
            .as_deref()
            .map(str::parse::<Fingerprint>)
            .transpose()
            .map_err(DnsError::Config)?;

        Ok(ValidatedConfig {
            listen_addr: self.dns.listen_addr,
            ttl: Duration::from_secs(u64::from(self.dns.ttl)),
            zones,
            url,
            site: unifi.site.clone(),
            username: unifi.username.clone(),
            password: unifi.password.clone(),
            fingerprint,
        })
    }
}
