//! `CountDistinct` (spec §4.B): count of distinct watched-field values over a
//! rolling window of the last `window` items, grounded in
//! `original_source/SamSrc/sam/CountDistinct.hpp`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::edge::Edge;
use crate::feature::{Feature, FeatureMap};

use super::{Operator, Source, Striped};

#[derive(Default)]
struct RollingDistinct {
    window: VecDeque<u64>,
    counts: HashMap<u64, u64>,
}

pub struct CountDistinct {
    features: Arc<FeatureMap>,
    feature_id: String,
    source: Source,
    window: usize,
    state: Striped<RollingDistinct>,
}

impl CountDistinct {
    pub fn new(features: Arc<FeatureMap>, feature_id: impl Into<String>, source: Source, window: usize, capacity: usize) -> Self {
        Self { features, feature_id: feature_id.into(), source, window: window.max(1), state: Striped::new(capacity) }
    }
}

impl Operator for CountDistinct {
    fn consume(&self, key: &str, edge: &Edge) {
        let value = match self.source.extract(edge) {
            Some(v) => v,
            None => return,
        };
        // floats bucketed to bit pattern so identical values hash identically
        // without pulling in a float-keyed hash map
        let bucket = value.to_bits();

        let distinct = self.state.with_mut(key, |state| {
            state.window.push_back(bucket);
            *state.counts.entry(bucket).or_insert(0) += 1;

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

            state.counts.len() as f64
        });

        self.features.update_insert(key, &self.feature_id, Feature::Single(distinct));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{Label, Tuple};

    #[test]
    fn counts_distinct_values_in_the_window() {
        let features = Arc::new(FeatureMap::new(2));
        let op = CountDistinct::new(Arc::clone(&features), "distinct", Source::Duration, 10, 2);

        for duration in [1.0, 2.0, 1.0, 3.0, 1.0] {
            let edge = Edge::new(0, 0, Label::empty(), Tuple::new("a", "b", 1.0, duration));
            op.consume("a", &edge);
        }

        assert_eq!(features.at("a", "distinct"), Ok(Feature::Single(3.0)));
    }

    #[test]
    fn old_values_drop_out_of_the_window() {
        let features = Arc::new(FeatureMap::new(2));
        let op = CountDistinct::new(Arc::clone(&features), "distinct", Source::Duration, 2, 2);

        for duration in [1.0, 2.0, 3.0] {
            let edge = Edge::new(0, 0, Label::empty(), Tuple::new("a", "b", 1.0, duration));
            op.consume("a", &edge);
        }

        // window holds only the last two inserts (2.0, 3.0)
        assert_eq!(features.at("a", "distinct"), Ok(Feature::Single(2.0)));
    }
}
