//! `ExponentialHistogramVariance` (spec §4.B): approximate windowed variance
//! of a watched field, grounded in
//! `original_source/SamSrc/sam/ExponentialHistogramVariance.hpp`. Tracks sum,
//! sum-of-squares and count, and applies `E[x^2] - E[x]^2`.

use std::sync::Arc;

use crate::edge::Edge;
use crate::feature::{Feature, FeatureMap};

use super::eh::ExponentialHistogram;
use super::{Operator, Source, Striped};

struct Moments {
    sum: ExponentialHistogram<f64>,
    sum_sq: ExponentialHistogram<f64>,
    count: ExponentialHistogram<f64>,
}

impl Default for Moments {
    fn default() -> Self {
        Self {
            sum: ExponentialHistogram::new(4, u64::MAX),
            sum_sq: ExponentialHistogram::new(4, u64::MAX),
            count: ExponentialHistogram::new(4, u64::MAX),
        }
    }
}

pub struct ExponentialHistogramVariance {
    features: Arc<FeatureMap>,
    feature_id: String,
    source: Source,
    k: u64,
    window: u64,
    state: Striped<Moments>,
}

impl ExponentialHistogramVariance {
    pub fn new(features: Arc<FeatureMap>, feature_id: impl Into<String>, source: Source, k: u64, window: u64, capacity: usize) -> Self {
        Self { features, feature_id: feature_id.into(), source, k, window, state: Striped::new(capacity) }
    }
}

impl Operator for ExponentialHistogramVariance {
    fn consume(&self, key: &str, edge: &Edge) {
        let value = match self.source.extract(edge) {
            Some(v) => v,
            None => return,
        };
        let variance = self.state.with_mut(key, |moments| {
            if moments.sum.bucket_count() == 0 {
                moments.sum = ExponentialHistogram::new(self.k, self.window);
                moments.sum_sq = ExponentialHistogram::new(self.k, self.window);
                moments.count = ExponentialHistogram::new(self.k, self.window);
            }
            moments.sum.insert(value);
            moments.sum_sq.insert(value * value);
            moments.count.insert(1.0);
            let count = moments.count.estimate();
            if count <= 0.0 {
                0.0
            } else {
                let mean = moments.sum.estimate() / count;
                let mean_sq = moments.sum_sq.estimate() / count;
                (mean_sq - mean * mean).max(0.0)
            }
        });
        self.features.update_insert(key, &self.feature_id, Feature::Single(variance));
    }
}
