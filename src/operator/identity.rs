//! `IdentityOperator` (spec §4.B): republishes the watched field unchanged,
//! grounded in `original_source/SamSrc/sam/Identity.hpp`.

use std::sync::Arc;

use crate::edge::Edge;
use crate::feature::{Feature, FeatureMap};

use super::{Operator, Source};

pub struct Identity {
    features: Arc<FeatureMap>,
    feature_id: String,
    source: Source,
}

impl Identity {
    pub fn new(features: Arc<FeatureMap>, feature_id: impl Into<String>, source: Source) -> Self {
        Self { features, feature_id: feature_id.into(), source }
    }
}

impl Operator for Identity {
    fn consume(&self, key: &str, edge: &Edge) {
        if let Some(value) = self.source.extract(edge) {
            self.features.update_insert(key, &self.feature_id, Feature::Single(value));
        }
    }
}
