//! `SimpleSum` (spec §4.B): exact rolling sum over the last `window` items
//! (no sketch approximation), grounded in
//! `original_source/SamSrc/sam/SimpleSum.hpp`.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::edge::Edge;
use crate::feature::{Feature, FeatureMap};

use super::{Operator, Source, Striped};

#[derive(Default)]
struct RollingSum {
    window: VecDeque<f64>,
    total: f64,
}

pub struct SimpleSum {
    features: Arc<FeatureMap>,
    feature_id: String,
    source: Source,
    window: usize,
    state: Striped<RollingSum>,
}

impl SimpleSum {
    pub fn new(features: Arc<FeatureMap>, feature_id: impl Into<String>, source: Source, window: usize, capacity: usize) -> Self {
        Self { features, feature_id: feature_id.into(), source, window: window.max(1), state: Striped::new(capacity) }
    }
}

impl Operator for SimpleSum {
    fn consume(&self, key: &str, edge: &Edge) {
        let value = match self.source.extract(edge) {
            Some(v) => v,
            None => return,
        };

        let total = self.state.with_mut(key, |state| {
            state.window.push_back(value);
            state.total += value;
            while state.window.len() > self.window {
                if let Some(evicted) = state.window.pop_front() {
                    state.total -= evicted;
                }
            }
            state.total
        });

        self.features.update_insert(key, &self.feature_id, Feature::Single(total));
    }
}
