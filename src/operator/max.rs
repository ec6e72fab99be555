//! `Max` (spec §4.B): exact rolling maximum over the last `window` items,
//! grounded in `original_source/SamSrc/sam/Max.hpp`. A monotonic deque keeps
//! the maximum queryable in O(1) while eviction stays O(1) amortized.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::edge::Edge;
use crate::feature::{Feature, FeatureMap};

use super::{Operator, Source, Striped};

#[derive(Default)]
struct RollingMax {
    /// (insertion sequence, value) for every item still in the window
    window: VecDeque<(u64, f64)>,
    /// (insertion sequence, value) of window items in decreasing value order;
    /// the front is always the current max
    monotonic: VecDeque<(u64, f64)>,
    next_id: u64,
}

pub struct Max {
    features: Arc<FeatureMap>,
    feature_id: String,
    source: Source,
    window: usize,
    state: Striped<RollingMax>,
}

impl Max {
    pub fn new(features: Arc<FeatureMap>, feature_id: impl Into<String>, source: Source, window: usize, capacity: usize) -> Self {
        Self { features, feature_id: feature_id.into(), source, window: window.max(1), state: Striped::new(capacity) }
    }
}

impl Operator for Max {
    fn consume(&self, key: &str, edge: &Edge) {
        let value = match self.source.extract(edge) {
            Some(v) => v,
            None => return,
        };

        let max = self.state.with_mut(key, |state| {
            let id = state.next_id;
            state.next_id += 1;

            while state.monotonic.back().map_or(false, |(_, v)| *v <= value) {
                state.monotonic.pop_back();
            }
            state.monotonic.push_back((id, value));
            state.window.push_back((id, value));

            while state.window.len() > self.window {
                if let Some((evicted_id, _)) = state.window.pop_front() {
                    if state.monotonic.front().map_or(false, |(front_id, _)| *front_id == evicted_id) {
                        state.monotonic.pop_front();
                    }
                }
            }

            state.monotonic.front().map(|(_, v)| *v).unwrap_or(f64::NEG_INFINITY)
        });

        self.features.update_insert(key, &self.feature_id, Feature::Single(max));
    }
}
