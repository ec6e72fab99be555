//! 4.H Edge-request protocol: a worker that cannot locally satisfy a partial
//! match's next edge asks the peer owning the missing endpoint for matching
//! edges, and suppresses duplicate answers with a TTL'd [`TemporalSet`],
//! grounded in `original_source/SamSrc/sam/TemporalSet.hpp`.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

use crate::util::types::{TimeRange, VertexType};

/// a request for edges matching a (possibly partially known) endpoint pair
/// and time window, routed to the worker owning the known endpoint
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeRequest {
    pub source: Option<VertexType>,
    pub target: Option<VertexType>,
    pub start_range: TimeRange,
    pub end_range: TimeRange,
    pub return_worker: u32,
}

impl EdgeRequest {
    /// the request expires once `now` exceeds the end of its end-time window
    pub fn is_expired(&self, now: f64) -> bool {
        match self.end_range.hi {
            Some(hi) => now > hi,
            None => false,
        }
    }
}

/// an edge-request answer, fingerprinted so duplicate deliveries of the same
/// (request, edge) pair can be dropped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResponseFingerprint {
    pub request_fingerprint: u64,
    pub edge_id: u64,
}

/// a TTL'd set used to suppress duplicate `(requestFingerprint, edgeId)`
/// deliveries; entries older than their insertion TTL are dropped lazily on
/// the next touch rather than swept proactively
pub struct TemporalSet<T: Eq + Hash + Clone> {
    entries: Mutex<HashMap<T, f64>>,
}

impl<T: Eq + Hash + Clone> Default for TemporalSet<T> {
    fn default() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl<T: Eq + Hash + Clone> TemporalSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// inserts `item` if it (or an earlier copy of it) hasn't already been
    /// seen within its TTL; returns `true` if this is the first sighting
    pub fn insert_if_absent(&self, item: T, now: f64, ttl: f64) -> bool {
        let mut entries = self.entries.lock();
        entries.retain(|_, expire_at| *expire_at >= now);
        if entries.contains_key(&item) {
            false
        } else {
            entries.insert(item, now + ttl);
            true
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// a stable fingerprint for an `EdgeRequest`, used as the first half of a
/// `ResponseFingerprint`
pub fn fingerprint(request: &EdgeRequest) -> u64 {
    let mut hasher = DefaultHasher::new();
    request.source.hash(&mut hasher);
    request.target.hash(&mut hasher);
    request.start_range.lo.map(|v| v.to_bits()).hash(&mut hasher);
    request.start_range.hi.map(|v| v.to_bits()).hash(&mut hasher);
    request.end_range.lo.map(|v| v.to_bits()).hash(&mut hasher);
    request.end_range.hi.map(|v| v.to_bits()).hash(&mut hasher);
    request.return_worker.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> EdgeRequest {
        EdgeRequest { source: Some("a".to_string()), target: None, start_range: TimeRange::bounded(0.0, 10.0), end_range: TimeRange::bounded(0.0, 20.0), return_worker: 1 }
    }

    #[test]
    fn request_expires_past_its_end_range() {
        let request = sample_request();
        assert!(!request.is_expired(19.0));
        assert!(request.is_expired(20.1));
    }

    #[test]
    fn temporal_set_suppresses_duplicates_within_ttl() {
        let set: TemporalSet<ResponseFingerprint> = TemporalSet::new();
        let item = ResponseFingerprint { request_fingerprint: 1, edge_id: 1 };

        assert!(set.insert_if_absent(item, 0.0, 10.0));
        assert!(!set.insert_if_absent(item, 5.0, 10.0));
    }

    #[test]
    fn temporal_set_allows_reinsert_after_ttl_expires() {
        let set: TemporalSet<ResponseFingerprint> = TemporalSet::new();
        let item = ResponseFingerprint { request_fingerprint: 1, edge_id: 1 };

        assert!(set.insert_if_absent(item, 0.0, 10.0));
        assert!(set.insert_if_absent(item, 11.0, 10.0));
    }

    #[test]
    fn fingerprint_is_stable_for_equal_requests() {
        assert_eq!(fingerprint(&sample_request()), fingerprint(&sample_request()));
    }
}
