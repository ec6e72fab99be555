//! 4.G Partial-match table: the state machine that grows a query's edges one
//! match at a time. A fresh edge either seeds a brand-new partial match
//! against the query's first edge, or extends an existing partial found by
//! indexing on whichever endpoint the next query edge shares with an
//! already-bound variable. Matches sharing a variable across edges must
//! agree on its bound value; new variables bind freely on first sight.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use hashers::fx_hash::FxHasher;
use parking_lot::Mutex;

use crate::edge::Edge;
use crate::feature::FeatureMap;
use crate::query::SubgraphQuery;
use crate::util::types::VertexType;

/// one in-progress attempt to match a `SubgraphQuery`, with its bound
/// variables and the edges matched so far
#[derive(Clone)]
pub struct PartialMatch {
    query: Arc<SubgraphQuery>,
    matched_edges: Vec<Edge>,
    variable_bindings: HashMap<String, VertexType>,
    expire_at: f64,
}

impl PartialMatch {
    /// attempts to start a new partial match from `edge` against the query's
    /// first (earliest-starting) edge
    fn seed(query: Arc<SubgraphQuery>, edge: &Edge, features: &FeatureMap) -> Option<Self> {
        let first = query.edges.first()?;
        if !first.start_time_range.contains(edge.time()) || !first.end_time_range.contains(edge.end_time()) {
            return None;
        }
        let mut bindings = HashMap::new();
        bindings.insert(first.source.clone(), edge.source().clone());
        bindings.insert(first.target.clone(), edge.target().clone());
        if !satisfies_all(&query, &bindings, features) {
            return None;
        }
        Some(Self { expire_at: edge.time() + query.max_time_extent, query, matched_edges: vec![edge.clone()], variable_bindings: bindings })
    }

    fn next_edge(&self) -> Option<&crate::query::EdgeDescription> {
        self.query.edges.get(self.matched_edges.len())
    }

    pub fn is_complete(&self) -> bool {
        self.matched_edges.len() == self.query.edges.len()
    }

    pub fn matched_edges(&self) -> &[Edge] {
        &self.matched_edges
    }

    pub fn bindings(&self) -> &HashMap<String, VertexType> {
        &self.variable_bindings
    }

    /// the vertex the next query edge must touch, used to decide whether a
    /// cross-worker edge request is needed to make progress
    pub fn pending_vertex(&self) -> Option<VertexType> {
        self.index_key()
    }

    /// the vertex value that indexes this (incomplete) match in the table:
    /// whichever of the next edge's two endpoints is already bound
    fn index_key(&self) -> Option<VertexType> {
        let next = self.next_edge()?;
        self.variable_bindings.get(&next.source).or_else(|| self.variable_bindings.get(&next.target)).cloned()
    }

    /// attempts to extend this match with `edge` against the next query edge.
    /// Fails if the time range rejects it, a shared variable disagrees, or a
    /// newly-bound variable fails one of its vertex constraints.
    fn try_extend(&self, edge: &Edge, features: &FeatureMap) -> Option<Self> {
        let next = self.next_edge()?;
        if !next.start_time_range.contains(edge.time()) || !next.end_time_range.contains(edge.end_time()) {
            return None;
        }
        let mut bindings = self.variable_bindings.clone();
        if !bind(&mut bindings, &next.source, edge.source()) {
            return None;
        }
        if !bind(&mut bindings, &next.target, edge.target()) {
            return None;
        }
        if !satisfies_all(&self.query, &bindings, features) {
            return None;
        }
        let mut matched_edges = self.matched_edges.clone();
        matched_edges.push(edge.clone());
        let expire_at = self.expire_at.max(edge.time() + self.query.max_time_extent);
        Some(Self { query: Arc::clone(&self.query), matched_edges, variable_bindings: bindings, expire_at })
    }
}

fn bind(bindings: &mut HashMap<String, VertexType>, variable: &str, value: &VertexType) -> bool {
    match bindings.get(variable) {
        Some(existing) => existing == value,
        None => {
            bindings.insert(variable.to_string(), value.clone());
            true
        }
    }
}

/// re-checks every bound variable's vertex constraints. Cheap to re-check
/// already-satisfied bindings rather than tracking which ones are newly
/// bound this step -- constraints are rare and idempotent.
fn satisfies_all(query: &SubgraphQuery, bindings: &HashMap<String, VertexType>, features: &FeatureMap) -> bool {
    bindings.iter().all(|(variable, vertex)| query.check_vertex(variable, vertex, features))
}

/// striped index of in-progress partial matches, keyed by the bound vertex
/// value each is waiting on next
pub struct PartialMatchTable {
    stripes: Vec<Mutex<HashMap<VertexType, Vec<PartialMatch>>>>,
}

impl PartialMatchTable {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut stripes = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            stripes.push(Mutex::new(HashMap::new()));
        }
        Self { stripes }
    }

    fn stripe_of(&self, vertex: &VertexType) -> usize {
        let mut hasher = FxHasher::default();
        vertex.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    fn add(&self, partial: PartialMatch) {
        debug_assert!(!partial.is_complete());
        if let Some(key) = partial.index_key() {
            let idx = self.stripe_of(&key);
            self.stripes[idx].lock().entry(key).or_insert_with(Vec::new).push(partial);
        }
    }

    /// seeds a new partial match against `query` and extends every
    /// in-progress match waiting on `edge`'s endpoints. `completed` holds
    /// every newly completed match; `pending` holds every newly created or
    /// extended match that is still incomplete (already reinserted into the
    /// table), so a caller can decide whether a cross-worker edge request is
    /// needed to make further progress on it.
    pub fn process(&self, query: &Arc<SubgraphQuery>, edge: &Edge, now: f64, features: &FeatureMap) -> ProcessOutcome {
        let mut completed = Vec::new();
        let mut pending = Vec::new();

        for endpoint in [edge.source().clone(), edge.target().clone()] {
            let idx = self.stripe_of(&endpoint);
            let extended: Vec<PartialMatch> = {
                let mut stripe = self.stripes[idx].lock();
                match stripe.get_mut(&endpoint) {
                    Some(bucket) => {
                        bucket.retain(|p| p.expire_at >= now);
                        bucket.iter().filter_map(|p| p.try_extend(edge, features)).collect()
                    }
                    None => Vec::new(),
                }
            };
            for ext in extended {
                if ext.is_complete() {
                    completed.push(ext);
                } else {
                    pending.push(ext.clone());
                    self.add(ext);
                }
            }
        }

        if let Some(seed) = PartialMatch::seed(Arc::clone(query), edge, features) {
            if seed.is_complete() {
                completed.push(seed);
            } else {
                pending.push(seed.clone());
                self.add(seed);
            }
        }

        ProcessOutcome { completed, pending }
    }
}

/// outcome of feeding one edge into the table against one query
pub struct ProcessOutcome {
    pub completed: Vec<PartialMatch>,
    pub pending: Vec<PartialMatch>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{Label, Tuple};
    use crate::query::{SubgraphQueryBuilder, VertexConstraintExpression};
    use crate::util::types::TimeRange;

    fn edge(id: u64, source: &str, target: &str, time: f64) -> Edge {
        Edge::new(id, 0, Label::empty(), Tuple::new(source, target, time, 0.0))
    }

    fn edge_with_duration(id: u64, source: &str, target: &str, time: f64, duration: f64) -> Edge {
        Edge::new(id, 0, Label::empty(), Tuple::new(source, target, time, duration))
    }

    fn no_features() -> FeatureMap {
        FeatureMap::new(2)
    }

    #[test]
    fn single_edge_query_completes_immediately() {
        let mut builder = SubgraphQueryBuilder::new();
        builder.add_time_edge("e1", "x", "y", TimeRange::bounded(0.0, 100.0), TimeRange::UNBOUNDED);
        let query = Arc::new(builder.finalize(50.0).unwrap());

        let table = PartialMatchTable::new(4);
        let completed = table.process(&query, &edge(0, "a", "b", 1.0), 1.0, &no_features()).completed;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].bindings().get("x"), Some(&"a".to_string()));
    }

    #[test]
    fn two_edge_chain_completes_once_the_shared_vertex_matches() {
        let mut builder = SubgraphQueryBuilder::new();
        builder.add_time_edge("e1", "x", "y", TimeRange::bounded(0.0, 100.0), TimeRange::UNBOUNDED);
        builder.add_time_edge("e2", "y", "z", TimeRange::bounded(0.0, 100.0), TimeRange::UNBOUNDED);
        let query = Arc::new(builder.finalize(50.0).unwrap());

        let table = PartialMatchTable::new(4);
        let features = no_features();
        assert!(table.process(&query, &edge(0, "a", "b", 1.0), 1.0, &features).completed.is_empty());

        let completed = table.process(&query, &edge(1, "b", "c", 2.0), 2.0, &features).completed;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].matched_edges().len(), 2);
        assert_eq!(completed[0].bindings().get("z"), Some(&"c".to_string()));
    }

    #[test]
    fn edge_not_touching_the_bound_vertex_does_not_extend() {
        let mut builder = SubgraphQueryBuilder::new();
        builder.add_time_edge("e1", "x", "y", TimeRange::bounded(0.0, 100.0), TimeRange::UNBOUNDED);
        builder.add_time_edge("e2", "y", "z", TimeRange::bounded(0.0, 100.0), TimeRange::UNBOUNDED);
        let query = Arc::new(builder.finalize(50.0).unwrap());

        let table = PartialMatchTable::new(4);
        let features = no_features();
        table.process(&query, &edge(0, "a", "b", 1.0), 1.0, &features);

        // edge between "d" and "c" touches neither endpoint of the a->b seed
        let completed = table.process(&query, &edge(1, "d", "c", 2.0), 2.0, &features).completed;
        assert!(completed.is_empty());
    }

    #[test]
    fn shared_variable_must_agree_across_edges() {
        let mut builder = SubgraphQueryBuilder::new();
        builder.add_time_edge("e1", "x", "y", TimeRange::bounded(0.0, 100.0), TimeRange::UNBOUNDED);
        builder.add_time_edge("e2", "y", "z", TimeRange::bounded(0.0, 100.0), TimeRange::UNBOUNDED);
        builder.add_time_edge("e3", "z", "x", TimeRange::bounded(0.0, 100.0), TimeRange::UNBOUNDED);
        let query = Arc::new(builder.finalize(50.0).unwrap());

        let table = PartialMatchTable::new(4);
        let features = no_features();
        table.process(&query, &edge(0, "a", "b", 1.0), 1.0, &features);
        table.process(&query, &edge(1, "b", "c", 2.0), 2.0, &features);

        // closes the triangle back to a different vertex than "x" == "a"
        let completed = table.process(&query, &edge(2, "c", "d", 3.0), 3.0, &features).completed;
        assert!(completed.is_empty());

        // the true triangle edge closes it
        let completed = table.process(&query, &edge(3, "c", "a", 4.0), 4.0, &features).completed;
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn expired_partials_are_not_extended() {
        let mut builder = SubgraphQueryBuilder::new();
        builder.add_time_edge("e1", "x", "y", TimeRange::bounded(0.0, 100.0), TimeRange::UNBOUNDED);
        builder.add_time_edge("e2", "y", "z", TimeRange::bounded(0.0, 100.0), TimeRange::UNBOUNDED);
        let query = Arc::new(builder.finalize(1.0).unwrap());

        let table = PartialMatchTable::new(4);
        let features = no_features();
        table.process(&query, &edge(0, "a", "b", 1.0), 1.0, &features);

        // far beyond max_time_extent past the seed
        let completed = table.process(&query, &edge(1, "b", "c", 500.0), 500.0, &features).completed;
        assert!(completed.is_empty());
    }

    #[test]
    fn vertex_constraint_blocks_seeding_until_satisfied() {
        let mut builder = SubgraphQueryBuilder::new();
        builder.add_time_edge("e1", "x", "y", TimeRange::bounded(0.0, 100.0), TimeRange::UNBOUNDED);
        builder.add_vertex_constraint("x", VertexConstraintExpression::In { feature_id: "top".to_string() });
        let query = Arc::new(builder.finalize(50.0).unwrap());

        let table = PartialMatchTable::new(4);
        let features = no_features();
        assert!(table.process(&query, &edge(0, "a", "b", 1.0), 1.0, &features).completed.is_empty());

        features.update_insert("", "top", crate::feature::Feature::TopK { keys: vec!["a".to_string()], frequencies: vec![1.0] });
        let completed = table.process(&query, &edge(1, "a", "b", 2.0), 2.0, &features).completed;
        assert_eq!(completed.len(), 1);
    }

    /// a nonzero-duration edge can satisfy `start_time_range` while its
    /// `end_time()` (`time + duration`) falls outside `end_time_range` --
    /// the start-range check alone would wrongly accept it.
    #[test]
    fn end_time_range_rejects_what_start_range_alone_would_accept() {
        let mut builder = SubgraphQueryBuilder::new();
        builder.add_time_edge("e1", "x", "y", TimeRange::bounded(0.0, 10.0), TimeRange::bounded(0.0, 10.0));
        let query = Arc::new(builder.finalize(5.0).unwrap());

        let table = PartialMatchTable::new(4);
        let features = no_features();

        // time=5.0 is within [0, 10], but end_time() = 5.0 + 20.0 = 25.0 is not
        let completed = table.process(&query, &edge_with_duration(0, "a", "b", 5.0, 20.0), 5.0, &features).completed;
        assert!(completed.is_empty(), "edge should have been rejected by the end-range check");

        // a duration short enough to keep end_time() inside the range still seeds
        let completed = table.process(&query, &edge_with_duration(1, "a", "b", 5.0, 2.0), 5.0, &features).completed;
        assert_eq!(completed.len(), 1);
    }
}
