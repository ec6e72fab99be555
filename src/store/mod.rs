//! 4.E Local edge store: two symmetric striped adjacency indices (by source,
//! by target), each stripe holding one lock over a set of per-vertex edge
//! lists. Grounded in the watermark-driven expiry sweep of the teacher's
//! deleted `graph::Graph`/`GraphNode` adjacency structure, generalized from a
//! single timely-worker-local index to the spec's striped-lock design.
//!
//! Per-vertex edge lists are kept in insertion-time order, which is also time
//! order for any one vertex's own edges in a well-behaved stream -- this lets
//! eviction scan only from the front instead of needing a priority queue per
//! stripe.

use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use hashers::fx_hash::FxHasher;
use parking_lot::Mutex;

use crate::edge::Edge;
use crate::util::types::VertexType;

struct IndexedEdgeStore {
    stripes: Vec<Mutex<HashMap<VertexType, VecDeque<Edge>>>>,
}

impl IndexedEdgeStore {
    fn new(capacity: usize) -> Self {
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

    fn sweep(list: &mut VecDeque<Edge>, now: f64, window: f64) {
        while let Some(front) = list.front() {
            if now - front.end_time() > window {
                list.pop_front();
            } else {
                break;
            }
        }
    }

    fn add(&self, vertex: &VertexType, edge: Edge, now: f64, window: f64) {
        let idx = self.stripe_of(vertex);
        let mut stripe = self.stripes[idx].lock();
        let list = stripe.entry(vertex.clone()).or_insert_with(VecDeque::new);
        list.push_back(edge);
        Self::sweep(list, now, window);
    }

    fn find(&self, vertex: &VertexType, now: f64, window: f64, mut visit: impl FnMut(&Edge)) {
        let idx = self.stripe_of(vertex);
        let mut stripe = self.stripes[idx].lock();
        if let Some(list) = stripe.get_mut(vertex) {
            Self::sweep(list, now, window);
            for edge in list.iter() {
                visit(edge);
            }
        }
    }

    fn count(&self) -> usize {
        self.stripes.iter().map(|s| s.lock().values().map(|l| l.len()).sum::<usize>()).sum()
    }
}

/// the local, per-worker copy of the streaming edge set, indexed both by
/// source (CSR) and by target (CSC) so either endpoint can be matched in
/// O(1) expected time
pub struct LocalEdgeStore {
    by_source: IndexedEdgeStore,
    by_target: IndexedEdgeStore,
    window: f64,
}

impl LocalEdgeStore {
    pub fn new(capacity: usize, window: f64) -> Self {
        Self { by_source: IndexedEdgeStore::new(capacity), by_target: IndexedEdgeStore::new(capacity), window }
    }

    /// inserts `edge` into both indices, sweeping each affected vertex's list
    /// for edges that have aged out of the window
    pub fn add(&self, edge: Edge, now: f64) {
        self.by_source.add(edge.source(), edge.clone(), now, self.window);
        let target = edge.target().clone();
        self.by_target.add(&target, edge, now, self.window);
    }

    pub fn find_by_source(&self, vertex: &VertexType, now: f64, visit: impl FnMut(&Edge)) {
        self.by_source.find(vertex, now, self.window, visit);
    }

    pub fn find_by_target(&self, vertex: &VertexType, now: f64, visit: impl FnMut(&Edge)) {
        self.by_target.find(vertex, now, self.window, visit);
    }

    /// total live edges, counted from the source index only -- each physical
    /// edge is stored once per index, so counting both would double it
    pub fn count_edges(&self) -> usize {
        self.by_source.count()
    }
}
