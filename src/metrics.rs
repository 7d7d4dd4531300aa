//! Metrics instrumentation for unifi-names-dns.
//!
//! All metrics are prefixed with `unifi_names.`

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Outcome of a DNS request as seen by this engine.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// At least one record was found and a reply was written.
    Answered,
    /// Nothing matched; the request went to the next handler.
    Passed,
}

/// Record a handled DNS request.
pub fn record_query(result: QueryResult, duration: Duration) {
    let result_str = match result {
        QueryResult::Answered => "answered",
        QueryResult::Passed => "passed",
    };

    counter!("unifi_names.query.count", "result" => result_str).increment(1);
    histogram!("unifi_names.query.duration.seconds").record(duration.as_secs_f64());
}

/// Outcome of a directory refresh.
#[derive(Debug, Clone, Copy)]
pub enum RefreshResult {
    /// Records were replaced.
    Success,
    /// The fetch failed; records were kept.
    Failure,
}

/// Record a directory refresh attempt.
pub fn record_refresh(result: RefreshResult, duration: Duration) {
    let result_str = match result {
        RefreshResult::Success => "success",
        RefreshResult::Failure => "failure",
    };

    counter!("unifi_names.refresh.count", "result" => result_str).increment(1);
    histogram!("unifi_names.refresh.duration.seconds").record(duration.as_secs_f64());
}

/// Record the number of cached records per type.
pub fn record_record_counts(a: usize, aaaa: usize) {
    gauge!("unifi_names.state.records.count", "type" => "a").set(a as f64);
    gauge!("unifi_names.state.records.count", "type" => "aaaa").set(aaaa as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
