//! Per-worker operability counters, exported through the same
//! `metrics-runtime` sink the teacher's runners (`dd-runner.rs`,
//! `sga-runner.rs`) use for batch/total counters, plus the CSV pipeline in
//! `util::metrics` for offline inspection.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics_runtime::Sink;

/// plain `AtomicU64` counters, one per drop/expiry/contention condition
/// named in the error-handling policy table (spec §7)
#[derive(Default)]
pub struct Metrics {
    dropped_sends: AtomicU64,
    dropped_receives: AtomicU64,
    malformed_records: AtomicU64,
    expired_partials: AtomicU64,
    expired_requests: AtomicU64,
    duplicate_responses: AtomicU64,
    edges_ingested: AtomicU64,
    matches_completed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dropped_send(&self) {
        self.dropped_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_receive(&self) {
        self.dropped_receives.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_record(&self) {
        self.malformed_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired_partial(&self) {
        self.expired_partials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired_request(&self) {
        self.expired_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_response(&self) {
        self.duplicate_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_edge_ingested(&self) {
        self.edges_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match_completed(&self) {
        self.matches_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// pushes a snapshot of every counter into the sink, mirroring the
    /// teacher's `sink.record_value(name, value)` reporting calls
    pub fn report(&self, sink: &mut Sink) {
        sink.record_value("dropped-sends", self.dropped_sends.load(Ordering::Relaxed));
        sink.record_value("dropped-receives", self.dropped_receives.load(Ordering::Relaxed));
        sink.record_value("malformed-records", self.malformed_records.load(Ordering::Relaxed));
        sink.record_value("expired-partials", self.expired_partials.load(Ordering::Relaxed));
        sink.record_value("expired-requests", self.expired_requests.load(Ordering::Relaxed));
        sink.record_value("duplicate-responses", self.duplicate_responses.load(Ordering::Relaxed));
        sink.record_value("edges-ingested", self.edges_ingested.load(Ordering::Relaxed));
        sink.record_value("matches-completed", self.matches_completed.load(Ordering::Relaxed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering as O;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let metrics = Metrics::new();
        assert_eq!(metrics.dropped_sends.load(O::Relaxed), 0);
        metrics.record_dropped_send();
        metrics.record_dropped_send();
        assert_eq!(metrics.dropped_sends.load(O::Relaxed), 2);
    }

    #[test]
    fn counters_are_independent() {
        let metrics = Metrics::new();
        metrics.record_malformed_record();
        metrics.record_expired_partial();
        metrics.record_expired_partial();
        assert_eq!(metrics.malformed_records.load(O::Relaxed), 1);
        assert_eq!(metrics.expired_partials.load(O::Relaxed), 2);
        assert_eq!(metrics.dropped_receives.load(O::Relaxed), 0);
    }
}
