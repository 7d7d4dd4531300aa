//! Synthesis of DNS records from controller client entries.

use std::net::IpAddr;

use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordType};
use serde::Deserialize;
use tracing::trace;

use crate::names::sanitize;
use crate::zones::ZoneTable;

/// A client as reported by the controller's `stat/sta` endpoint.
///
/// Missing and `null` fields decode as empty strings; unknown fields are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientEntry {
    /// Display name set on the controller.
    #[serde(default, deserialize_with = "string_or_null")]
    pub name: String,
    /// Network tag, e.g. `LAN`.
    #[serde(default, deserialize_with = "string_or_null")]
    pub network: String,
    /// Last known IP address.
    #[serde(default, deserialize_with = "string_or_null")]
    pub ip: String,
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// An address record derived from a client entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedRecord {
    /// Absolute, lower-cased owner name ending in a configured zone.
    pub fqdn: LowerName,
    /// Address; its family decides between A and AAAA.
    pub address: IpAddr,
}

impl SynthesizedRecord {
    /// `A` for IPv4 addresses, `AAAA` for IPv6.
    pub fn record_type(&self) -> RecordType {
        match self.address {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::AAAA,
        }
    }

    /// Build the wire record. Class is IN and TTL is left at zero.
    pub fn to_record(&self) -> Record {
        let rdata = match self.address {
            IpAddr::V4(v4) => RData::A(A(v4)),
            IpAddr::V6(v6) => RData::AAAA(AAAA(v6)),
        };
        let mut record = Record::from_rdata(Name::from(self.fqdn.clone()), 0, rdata);
        record.set_dns_class(DNSClass::IN);
        record
    }
}

/// The record set produced by one refresh, split by record type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSnapshot {
    /// A records in controller order.
    pub a: Vec<SynthesizedRecord>,
    /// AAAA records in controller order.
    pub aaaa: Vec<SynthesizedRecord>,
}

impl RecordSnapshot {
    /// First record of the given type whose name matches.
    pub fn find(&self, fqdn: &LowerName, rtype: RecordType) -> Option<&SynthesizedRecord> {
        let records = match rtype {
            RecordType::A => &self.a,
            RecordType::AAAA => &self.aaaa,
            _ => return None,
        };
        records.iter().find(|record| &record.fqdn == fqdn)
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.a.len() + self.aaaa.len()
    }

    /// True when no records were synthesized.
    pub fn is_empty(&self) -> bool {
        self.a.is_empty() && self.aaaa.is_empty()
    }
}

/// Map client entries to records, dropping entries that have no usable
/// name, no parseable address or an unmapped network.
pub fn synthesize<'a, I>(entries: I, zones: &ZoneTable) -> RecordSnapshot
where
    I: IntoIterator<Item = &'a ClientEntry>,
{
    let mut snapshot = RecordSnapshot::default();

    for entry in entries {
        let Some(record) = synthesize_one(entry, zones) else {
            continue;
        };
        match record.address {
            IpAddr::V4(_) => snapshot.a.push(record),
            IpAddr::V6(_) => snapshot.aaaa.push(record),
        }
    }

    snapshot
}

fn synthesize_one(entry: &ClientEntry, zones: &ZoneTable) -> Option<SynthesizedRecord> {
    let label = sanitize(&entry.name);
    if label.is_empty() {
        trace!(name = %entry.name, "skipping client: no usable name");
        return None;
    }

    let address = match entry.ip.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        Ok(v4) => v4,
        Err(_) => {
            trace!(
                name = %entry.name,
                ip = %entry.ip,
                "skipping client: invalid address"
            );
            return None;
        }
    };

    let Some(zone) = zones.zone_for(&entry.network) else {
        trace!(
            name = %entry.name,
            network = %entry.network,
            "skipping client: unmapped network"
        );
        return None;
    };

    let fqdn = match Name::from_ascii(format!("{label}.{zone}")) {
        Ok(name) => LowerName::from(name),
        Err(e) => {
            trace!(
                name = %entry.name,
                error = %e,
                "skipping client: invalid owner name"
            );
            return None;
        }
    };

    Some(SynthesizedRecord { fqdn, address })
}
