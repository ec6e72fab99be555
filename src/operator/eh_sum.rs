//! `ExponentialHistogramSum` (spec §4.B): approximate windowed sum of a
//! watched field, grounded in
//! `original_source/SamSrc/sam/ExponentialHistogramSum.hpp`.

use std::sync::Arc;

use crate::edge::Edge;
use crate::feature::{Feature, FeatureMap};

use super::eh::ExponentialHistogram;
use super::{Operator, Source, Striped};

pub struct ExponentialHistogramSum {
    features: Arc<FeatureMap>,
    feature_id: String,
    source: Source,
    k: u64,
    window: u64,
    state: Striped<ExponentialHistogram<f64>>,
}

impl Default for ExponentialHistogram<f64> {
    fn default() -> Self {
        ExponentialHistogram::new(4, u64::MAX)
    }
}

impl ExponentialHistogramSum {
    pub fn new(features: Arc<FeatureMap>, feature_id: impl Into<String>, source: Source, k: u64, window: u64, capacity: usize) -> Self {
        Self { features, feature_id: feature_id.into(), source, k, window, state: Striped::new(capacity) }
    }
}

impl Operator for ExponentialHistogramSum {
    fn consume(&self, key: &str, edge: &Edge) {
        let value = match self.source.extract(edge) {
            Some(v) => v,
            None => return,
        };
        let estimate = self.state.with_mut(key, |eh| {
            if eh.bucket_count() == 0 {
                *eh = ExponentialHistogram::new(self.k, self.window);
            }
            eh.insert(value);
            eh.estimate()
        });
        self.features.update_insert(key, &self.feature_id, Feature::Single(estimate));
    }
}
