//! `JaccardIndex` (spec §4.B): similarity between the rolling neighbor sets of
//! an edge's two endpoints, grounded in
//! `original_source/SamSrc/sam/JaccardIndex.hpp`. Each endpoint accumulates a
//! rolling set of the vertices it has been seen adjacent to; every edge
//! publishes the Jaccard similarity of its endpoints' current sets.
//!
//! Reads both endpoints' sets before taking either's lock, then updates each
//! independently -- this trades a stale read (the just-inserted edge can miss
//! the freshest neighbor on one side) for never holding two stripe locks at
//! once.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::edge::Edge;
use crate::feature::{Feature, FeatureMap};
use crate::util::types::VertexType;

use super::Striped;
use crate::operator::Operator;

#[derive(Default)]
struct RollingNeighbors {
    window: VecDeque<VertexType>,
    neighbors: HashSet<VertexType>,
}

impl RollingNeighbors {
    fn snapshot(&self) -> HashSet<VertexType> {
        self.neighbors.clone()
    }

    fn insert(&mut self, neighbor: VertexType, window: usize) {
        self.window.push_back(neighbor.clone());
        self.neighbors.insert(neighbor);
        while self.window.len() > window {
            if let Some(evicted) = self.window.pop_front() {
                if !self.window.contains(&evicted) {
                    self.neighbors.remove(&evicted);
                }
            }
        }
    }
}

pub struct JaccardIndex {
    features: Arc<FeatureMap>,
    feature_id: String,
    window: usize,
    state: Striped<RollingNeighbors>,
}

impl JaccardIndex {
    pub fn new(features: Arc<FeatureMap>, feature_id: impl Into<String>, window: usize, capacity: usize) -> Self {
        Self { features, feature_id: feature_id.into(), window: window.max(1), state: Striped::new(capacity) }
    }

    fn similarity(a: &HashSet<VertexType>, b: &HashSet<VertexType>) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 0.0;
        }
        let intersection = a.intersection(b).count() as f64;
        let union = a.union(b).count() as f64;
        if union == 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

impl Operator for JaccardIndex {
    fn consume(&self, key: &str, edge: &Edge) {
        let source = edge.source().clone();
        let target = edge.target().clone();

        let source_set = self.state.with_mut(&source, |state| state.snapshot());
        let target_set = self.state.with_mut(&target, |state| state.snapshot());
        let similarity = Self::similarity(&source_set, &target_set);

        self.state.with_mut(&source, |state| state.insert(target.clone(), self.window));
        self.state.with_mut(&target, |state| state.insert(source.clone(), self.window));

        self.features.update_insert(key, &self.feature_id, Feature::Single(similarity));
    }
}
