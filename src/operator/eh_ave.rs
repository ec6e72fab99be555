//! `ExponentialHistogramAve` (spec §4.B): approximate windowed mean of a
//! watched field, grounded in
//! `original_source/SamSrc/sam/ExponentialHistogramAve.hpp`. Tracks sum and
//! count in parallel exponential histograms and divides the two estimates.

use std::sync::Arc;

use crate::edge::Edge;
use crate::feature::{Feature, FeatureMap};

use super::eh::ExponentialHistogram;
use super::{Operator, Source, Striped};

struct SumCount {
    sum: ExponentialHistogram<f64>,
    count: ExponentialHistogram<f64>,
}

impl Default for SumCount {
    fn default() -> Self {
        Self { sum: ExponentialHistogram::new(4, u64::MAX), count: ExponentialHistogram::new(4, u64::MAX) }
    }
}

pub struct ExponentialHistogramAve {
    features: Arc<FeatureMap>,
    feature_id: String,
    source: Source,
    k: u64,
    window: u64,
    state: Striped<SumCount>,
}

impl ExponentialHistogramAve {
    pub fn new(features: Arc<FeatureMap>, feature_id: impl Into<String>, source: Source, k: u64, window: u64, capacity: usize) -> Self {
        Self { features, feature_id: feature_id.into(), source, k, window, state: Striped::new(capacity) }
    }
}

impl Operator for ExponentialHistogramAve {
    fn consume(&self, key: &str, edge: &Edge) {
        let value = match self.source.extract(edge) {
            Some(v) => v,
            None => return,
        };
        let average = self.state.with_mut(key, |state| {
            if state.sum.bucket_count() == 0 {
                state.sum = ExponentialHistogram::new(self.k, self.window);
                state.count = ExponentialHistogram::new(self.k, self.window);
            }
            state.sum.insert(value);
            state.count.insert(1.0);
            let count = state.count.estimate();
            if count <= 0.0 {
                0.0
            } else {
                state.sum.estimate() / count
            }
        });
        self.features.update_insert(key, &self.feature_id, Feature::Single(average));
    }
}
