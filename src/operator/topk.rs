//! `TopK` (spec §4.B): heavy-hitters over a basic rolling window of the last
//! `window` items, grounded in `original_source/SamSrc/sam/TopK.hpp`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::edge::Edge;
use crate::feature::{Feature, FeatureMap};

use super::{Operator, Striped};

/// which string-valued position `TopK` groups by
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringSource {
    Label(usize),
    Extra(usize),
}

impl StringSource {
    fn extract(&self, edge: &Edge) -> Option<String> {
        match self {
            StringSource::Label(pos) => edge.label.get(*pos).map(|s| s.to_string()),
            StringSource::Extra(idx) => edge.tuple.extra.get(*idx).map(|v| v.as_str()),
        }
    }
}

#[derive(Default)]
struct RollingCounts {
    window: VecDeque<String>,
    counts: HashMap<String, u64>,
}

pub struct TopK {
    features: Arc<FeatureMap>,
    feature_id: String,
    source: StringSource,
    window: usize,
    k: usize,
    state: Striped<RollingCounts>,
}

impl TopK {
    pub fn new(features: Arc<FeatureMap>, feature_id: impl Into<String>, source: StringSource, window: usize, k: usize, capacity: usize) -> Self {
        Self { features, feature_id: feature_id.into(), source, window: window.max(1), k: k.max(1), state: Striped::new(capacity) }
    }
}

impl Operator for TopK {
    fn consume(&self, key: &str, edge: &Edge) {
        let item = match self.source.extract(edge) {
            Some(s) => s,
            None => return,
        };

        let feature = self.state.with_mut(key, |state| {
            state.window.push_back(item.clone());
            *state.counts.entry(item).or_insert(0) += 1;

            while state.window.len() > self.window {
                if let Some(evicted) = state.window.pop_front() {
                    if let Some(count) = state.counts.get_mut(&evicted) {
                        *count -= 1;
                        if *count == 0 {
                            state.counts.remove(&evicted);
                        }
                    }
                }
            }

            let total = state.window.len() as f64;
            let mut ranked: Vec<(String, u64)> = state.counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            ranked.truncate(self.k);

            let keys = ranked.iter().map(|(k, _)| k.clone()).collect();
            let frequencies = ranked.iter().map(|(_, c)| *c as f64 / total).collect();
            Feature::TopK { keys, frequencies }
        });

        self.features.update_insert(key, &self.feature_id, feature);
    }
}
