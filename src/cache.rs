//! TTL-driven cache of synthesized records.
//!
//! Readers see an immutable [`RecordSnapshot`] that is swapped whole after a
//! successful refresh. Refreshes are serialized by an async mutex that also
//! guards the refresh deadline, so the staleness check and the refresh form
//! one critical section: callers queued behind an in-flight refresh find the
//! cache fresh once they get the lock and do not refresh again.
//!
//! A refresh runs on its own task that owns the lock. Dropping the caller
//! that started it does not cancel the directory fetch.

use std::sync::Arc;
use std::time::Duration;

use hickory_proto::rr::{LowerName, RecordType};
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::DirectoryError;
use crate::metrics::{self, RefreshResult, Timer};
use crate::records::{synthesize, RecordSnapshot, SynthesizedRecord};
use crate::unifi::Directory;
use crate::zones::ZoneTable;

type SharedSnapshot = Arc<RwLock<Arc<RecordSnapshot>>>;

/// Cache of records derived from a [`Directory`].
pub struct RecordCache {
    directory: Arc<dyn Directory>,
    zones: Arc<ZoneTable>,
    ttl: Duration,
    snapshot: SharedSnapshot,
    /// Deadline of the next refresh; `None` means a refresh is due.
    next_refresh: Arc<Mutex<Option<Instant>>>,
}

impl RecordCache {
    /// Create an empty cache. The first [`ensure_fresh`](Self::ensure_fresh)
    /// call always refreshes.
    pub fn new(directory: Arc<dyn Directory>, zones: Arc<ZoneTable>, ttl: Duration) -> Self {
        Self {
            directory,
            zones,
            ttl,
            snapshot: Arc::new(RwLock::new(Arc::new(RecordSnapshot::default()))),
            next_refresh: Arc::new(Mutex::new(None)),
        }
    }

    /// Refresh from the directory if the deadline has passed at `now`.
    ///
    /// Returns `Ok(true)` if a refresh ran. On error the cached records and
    /// the deadline are left untouched, so the next call retries.
    pub async fn ensure_fresh(&self, now: Instant) -> Result<bool, DirectoryError> {
        let next_refresh = self.next_refresh.clone().lock_owned().await;
        if matches!(*next_refresh, Some(deadline) if now < deadline) {
            return Ok(false);
        }

        let task = tokio::spawn(refresh(
            self.directory.clone(),
            self.zones.clone(),
            self.snapshot.clone(),
            next_refresh,
            now + self.ttl,
        ));
        match task.await {
            Ok(result) => result.map(|()| true),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(DirectoryError::RefreshCancelled),
        }
    }

    /// First record of `rtype` named `fqdn`, compared case-insensitively.
    pub fn lookup(&self, fqdn: &LowerName, rtype: RecordType) -> Option<SynthesizedRecord> {
        self.snapshot.read().find(fqdn, rtype).cloned()
    }

    /// Current record set.
    pub fn snapshot(&self) -> Arc<RecordSnapshot> {
        self.snapshot.read().clone()
    }

    /// Number of cached A records.
    pub fn a_count(&self) -> usize {
        self.snapshot.read().a.len()
    }

    /// Number of cached AAAA records.
    pub fn aaaa_count(&self) -> usize {
        self.snapshot.read().aaaa.len()
    }

    /// Emit current state metrics.
    pub fn emit_metrics(&self) {
        let snapshot = self.snapshot();
        metrics::record_record_counts(snapshot.a.len(), snapshot.aaaa.len());
    }
}

async fn refresh(
    directory: Arc<dyn Directory>,
    zones: Arc<ZoneTable>,
    snapshot: SharedSnapshot,
    mut next_refresh: OwnedMutexGuard<Option<Instant>>,
    deadline: Instant,
) -> Result<(), DirectoryError> {
    debug!("refreshing client records");
    let timer = Timer::start();
    let clients = match directory.fetch_clients().await {
        Ok(clients) => clients,
        Err(e) => {
            metrics::record_refresh(RefreshResult::Failure, timer.elapsed());
            return Err(e);
        }
    };

    let fresh = Arc::new(synthesize(&clients, &zones));
    info!(
        clients = clients.len(),
        records = fresh.len(),
        a = fresh.a.len(),
        aaaa = fresh.aaaa.len(),
        "refreshed client records"
    );
    metrics::record_refresh(RefreshResult::Success, timer.elapsed());
    metrics::record_record_counts(fresh.a.len(), fresh.aaaa.len());

    *snapshot.write() = fresh;
    *next_refresh = Some(deadline);
    Ok(())
}
