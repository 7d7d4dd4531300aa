//! Per-request query matching against the record cache.

use std::sync::Arc;

use hickory_proto::op::LowerQuery;
use hickory_proto::rr::{DNSClass, Record, RecordType};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::cache::RecordCache;
use crate::zones::ZoneTable;

/// Decides which questions of a request this engine answers.
#[derive(Clone)]
pub struct Resolver {
    zones: Arc<ZoneTable>,
    cache: Arc<RecordCache>,
}

impl Resolver {
    /// Create a resolver over the given zones and cache.
    pub fn new(zones: Arc<ZoneTable>, cache: Arc<RecordCache>) -> Self {
        Self { zones, cache }
    }

    /// The cache backing this resolver.
    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    /// Collect at most one answer per question.
    ///
    /// Only IN-class A and AAAA questions under a configured zone are
    /// considered; a failed refresh is logged and the cached records are used.
    pub async fn resolve(&self, queries: &[LowerQuery]) -> Vec<Record> {
        let mut answers = Vec::new();

        for query in queries {
            if query.query_class() != DNSClass::IN {
                trace!(class = ?query.query_class(), "skipping non-IN question");
                continue;
            }

            let rtype = query.query_type();
            if !matches!(rtype, RecordType::A | RecordType::AAAA) {
                continue;
            }

            let mut name = query.name().to_string().to_lowercase();
            if !name.ends_with('.') {
                name.push('.');
            }
            if !self.zones.covers(&name) {
                trace!(%name, "name outside configured zones");
                continue;
            }

            if let Err(e) = self.cache.ensure_fresh(Instant::now()).await {
                warn!(error = %e, "unable to refresh clients, serving cached records");
            }

            match self.cache.lookup(query.name(), rtype) {
                Some(record) => {
                    debug!(%name, ?rtype, address = %record.address, "answering");
                    answers.push(record.to_record());
                }
                None => debug!(%name, ?rtype, "no matching client"),
            }
        }

        answers
    }
}
