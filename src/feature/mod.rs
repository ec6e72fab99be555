//! 4.A Feature map: a concurrent, striped associative store keyed by
//! `(recordKey, featureId)`.

use std::collections::HashMap;
use std::hash::{BuildHasherDefault, Hash, Hasher};

use hashers::fx_hash::FxHasher;
use parking_lot::RwLock;
use thiserror::Error;

/// one of the feature variants a sliding-window operator can publish
#[derive(Clone, Debug, PartialEq)]
pub enum Feature {
    Single(f64),
    Boolean(bool),
    TopK { keys: Vec<String>, frequencies: Vec<f64> },
    Map(HashMap<String, Feature>),
}

impl Feature {
    /// checks the `TopKFeature` invariant: frequencies in [0,1], non-increasing,
    /// `|keys| == |frequencies|`
    pub fn is_valid_topk(&self) -> bool {
        match self {
            Feature::TopK { keys, frequencies } => {
                keys.len() == frequencies.len()
                    && frequencies.iter().all(|f| (0.0..=1.0).contains(f))
                    && frequencies.windows(2).all(|w| w[0] >= w[1])
            }
            _ => true,
        }
    }

    /// merges another feature into `self` in place, used by `updateInsert`.
    /// MapFeatures merge per sub-key with last-write-wins; every other
    /// variant is simply replaced.
    fn merge_from(&mut self, other: Feature) {
        match (self, other) {
            (Feature::Map(existing), Feature::Map(incoming)) => {
                for (key, value) in incoming {
                    existing.insert(key, value);
                }
            }
            (slot, other) => {
                *slot = other;
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeatureError {
    #[error("no feature at key/id")]
    NotFound,
}

type FxMap<K, V> = HashMap<K, V, BuildHasherDefault<FxHasher>>;

/// one independently-locked slot of the feature map
struct Stripe {
    entries: FxMap<(String, String), Feature>,
}

impl Stripe {
    fn new() -> Self {
        Self { entries: FxMap::default() }
    }
}

/// Process-wide keyed feature store, striped over a fixed-capacity array of
/// locks (no resizing — capacity is configured up front). Readers and
/// writers serialize per stripe; different stripes never block each other.
pub struct FeatureMap {
    stripes: Vec<RwLock<Stripe>>,
}

impl FeatureMap {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut stripes = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            stripes.push(RwLock::new(Stripe::new()));
        }
        Self { stripes }
    }

    fn stripe_of(&self, key: &str, id: &str) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        id.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    /// atomic write; replaces an existing feature, merging `Map` variants
    pub fn update_insert(&self, key: &str, id: &str, feature: Feature) {
        let idx = self.stripe_of(key, id);
        let mut stripe = self.stripes[idx].write();
        let entry_key = (key.to_string(), id.to_string());
        match stripe.entries.get_mut(&entry_key) {
            Some(existing) => existing.merge_from(feature),
            None => {
                stripe.entries.insert(entry_key, feature);
            }
        }
    }

    /// reads a snapshot of the feature at `(key, id)`
    pub fn at(&self, key: &str, id: &str) -> Result<Feature, FeatureError> {
        let idx = self.stripe_of(key, id);
        let stripe = self.stripes[idx].read();
        stripe.entries.get(&(key.to_string(), id.to_string())).cloned().ok_or(FeatureError::NotFound)
    }

    pub fn exists(&self, key: &str, id: &str) -> bool {
        let idx = self.stripe_of(key, id);
        let stripe = self.stripes[idx].read();
        stripe.entries.contains_key(&(key.to_string(), id.to_string()))
    }

    /// reads the feature at `(key, id)` and applies `f` to it while the
    /// stripe lock is held
    pub fn evaluate<R>(&self, key: &str, id: &str, f: impl FnOnce(&Feature) -> R) -> Result<R, FeatureError> {
        let idx = self.stripe_of(key, id);
        let stripe = self.stripes[idx].read();
        stripe.entries.get(&(key.to_string(), id.to_string())).map(f).ok_or(FeatureError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn missing_feature_is_not_found() {
        let map = FeatureMap::new(4);
        assert_eq!(map.at("k", "id"), Err(FeatureError::NotFound));
        assert!(!map.exists("k", "id"));
    }

    #[test]
    fn update_insert_replaces_scalar() {
        let map = FeatureMap::new(4);
        map.update_insert("k", "sum", Feature::Single(1.0));
        map.update_insert("k", "sum", Feature::Single(2.0));
        assert_eq!(map.at("k", "sum"), Ok(Feature::Single(2.0)));
    }

    #[test]
    fn update_insert_merges_map_features() {
        let map = FeatureMap::new(4);
        let mut first = HashMap::new();
        first.insert("a".to_string(), Feature::Single(1.0));
        map.update_insert("k", "proj", Feature::Map(first));

        let mut second = HashMap::new();
        second.insert("b".to_string(), Feature::Single(2.0));
        map.update_insert("k", "proj", Feature::Map(second));

        let merged = map.at("k", "proj").unwrap();
        match merged {
            Feature::Map(m) => {
                assert_eq!(m.get("a"), Some(&Feature::Single(1.0)));
                assert_eq!(m.get("b"), Some(&Feature::Single(2.0)));
            }
            _ => panic!("expected Map feature"),
        }
    }

    #[test]
    fn topk_invariant_checker() {
        let valid = Feature::TopK { keys: vec!["a".into(), "b".into()], frequencies: vec![0.6, 0.4] };
        assert!(valid.is_valid_topk());

        let invalid = Feature::TopK { keys: vec!["a".into(), "b".into()], frequencies: vec![0.4, 0.6] };
        assert!(!invalid.is_valid_topk());
    }

    #[test]
    fn concurrent_updates_to_distinct_keys_do_not_lose_writes() {
        let map = Arc::new(FeatureMap::new(8));
        let mut handles = Vec::new();
        for i in 0..50 {
            let map = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                map.update_insert(&format!("k{}", i), "v", Feature::Single(i as f64));
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        for i in 0..50 {
            assert_eq!(map.at(&format!("k{}", i), "v"), Ok(Feature::Single(i as f64)));
        }
    }
}
