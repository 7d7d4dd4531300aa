//! Network tag to zone suffix mapping.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::error::DnsError;

/// Maximum length of a single DNS label.
const MAX_LABEL_LEN: usize = 63;

/// Maximum length of a textual domain name.
const MAX_NAME_LEN: usize = 253;

/// Immutable map from lower-cased network tag to absolute zone suffix.
///
/// A client on network `LAN` with a table entry `lan -> example.com.` is
/// published as `<label>.example.com.`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneTable {
    zones: HashMap<String, String>,
}

impl ZoneTable {
    /// Build a table from raw `(network, domain)` pairs.
    ///
    /// Network tags are lower-cased. Domains are lower-cased, stripped of
    /// surrounding dots and re-suffixed with exactly one trailing dot.
    pub fn new<I, K, V>(networks: I) -> Result<Self, DnsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut zones = HashMap::new();
        for (network, domain) in networks {
            let domain = domain.as_ref().trim_matches('.').to_lowercase();
            if !is_dns_name(&domain) {
                return Err(DnsError::Config(format!(
                    "'{domain}' is not a valid domain name"
                )));
            }
            zones.insert(network.as_ref().to_lowercase(), format!("{domain}."));
        }

        if zones.is_empty() {
            return Err(DnsError::Config("there are no networks to handle".into()));
        }

        Ok(Self { zones })
    }

    /// Zone suffix for a network tag, matched case-insensitively.
    pub fn zone_for(&self, network: &str) -> Option<&str> {
        self.zones.get(&network.to_lowercase()).map(String::as_str)
    }

    /// Whether an absolute, lower-cased query name falls under any zone.
    pub fn covers(&self, name: &str) -> bool {
        self.zones.values().any(|zone| name.ends_with(zone.as_str()))
    }

    /// Number of configured networks.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Always false for a constructed table.
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Hostname check: labels of `[A-Za-z0-9_][A-Za-z0-9_-]{0,62}` joined by
/// dots, and not an IP literal.
fn is_dns_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.parse::<IpAddr>().is_ok() {
        return false;
    }

    name.split('.').all(|label| {
        let mut chars = label.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphanumeric() || first == '_' => {}
            _ => return false,
        }
        label.len() <= MAX_LABEL_LEN
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    })
}
