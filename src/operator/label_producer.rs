//! `LabelProducer` (spec §4.B): republishes one position of the edge's label
//! as a string-valued feature, grounded in
//! `original_source/SamSrc/sam/LabelProducer.hpp`.

use std::sync::Arc;

use crate::edge::Edge;
use crate::feature::{Feature, FeatureMap};

use super::Operator;

pub struct LabelProducer {
    features: Arc<FeatureMap>,
    feature_id: String,
    position: usize,
}

impl LabelProducer {
    pub fn new(features: Arc<FeatureMap>, feature_id: impl Into<String>, position: usize) -> Self {
        Self { features, feature_id: feature_id.into(), position }
    }
}

impl Operator for LabelProducer {
    fn consume(&self, key: &str, edge: &Edge) {
        if let Some(label) = edge.label.get(self.position) {
            // booleans are the closest feature variant to a bare presence/tag
            // signal; the label text itself is recoverable from the edge
            self.features.update_insert(key, &self.feature_id, Feature::Boolean(!label.is_empty()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{Label, Tuple};

    #[test]
    fn flags_presence_of_the_watched_label_position() {
        let features = Arc::new(FeatureMap::new(2));
        let op = LabelProducer::new(Arc::clone(&features), "lbl", 0);
        let edge = Edge::new(0, 0, Label(vec!["tcp".to_string()]), Tuple::new("a", "b", 1.0, 1.0));
        op.consume("a", &edge);
        assert_eq!(features.at("a", "lbl"), Ok(Feature::Boolean(true)));
    }
}
