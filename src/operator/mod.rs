//! 4.B Sliding-window feature operators and the `MinPQIndex` eviction helper
//! they are all built on.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::BuildHasherDefault;
use std::hash::{Hash, Hasher};

use hashers::fx_hash::FxHasher;
use parking_lot::Mutex;
use priority_queue::PriorityQueue;

use crate::edge::Edge;

/// Per-key state striped over a fixed-capacity array of locks, shared by
/// every sliding-window operator to hold its (sketch, last value, ...)
/// per grouping key. Mirrors `feature::FeatureMap`'s striping but keyed by a
/// single string and generic over the per-key state type.
pub struct Striped<S> {
    stripes: Vec<Mutex<HashMap<String, S, BuildHasherDefault<FxHasher>>>>,
}

impl<S: Default> Striped<S> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut stripes = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            stripes.push(Mutex::new(HashMap::default()));
        }
        Self { stripes }
    }

    fn stripe_of(&self, key: &str) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    /// runs `f` against the state for `key`, creating it with `S::default()`
    /// on first use
    pub fn with_mut<R>(&self, key: &str, f: impl FnOnce(&mut S) -> R) -> R {
        let idx = self.stripe_of(key);
        let mut stripe = self.stripes[idx].lock();
        let entry = stripe.entry(key.to_string()).or_insert_with(S::default);
        f(entry)
    }
}

pub mod count_distinct;
pub mod eh;
pub mod eh_ave;
pub mod eh_sum;
pub mod eh_variance;
pub mod identity;
pub mod jaccard;
pub mod label_producer;
pub mod max;
pub mod simple_sum;
pub mod topk;

/// which numeric tuple position an operator reads its input value from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Time,
    Duration,
    Extra(usize),
}

impl Source {
    pub fn extract(&self, edge: &Edge) -> Option<f64> {
        match self {
            Source::Time => Some(edge.tuple.time),
            Source::Duration => Some(edge.tuple.duration),
            Source::Extra(idx) => edge.tuple.extra.get(*idx).and_then(|v| v.as_f64()),
        }
    }
}

/// A sliding-window feature operator: consumes one edge at a time, keyed by
/// whichever tuple position the pipeline configured it to watch, and
/// publishes into a `FeatureMap` under its own feature id. `terminate`
/// flushes any buffered state on shutdown (spec §4.B/§5's drain phase).
pub trait Operator: Send + Sync {
    fn consume(&self, key: &str, edge: &Edge);
    fn terminate(&self) {}
}

/// custom struct to store entries in PriorityQueue
/// The goal is to enable key-based lookups for complex object stored in a PriorityQueue
#[derive(Clone, Debug)]
struct PQEntry<K: Copy + PartialEq + Clone + Debug + Hash + Default, V: Clone + Debug> {
    key: K,
    entry: Option<V>,
}

impl<K, V> PQEntry<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
    pub fn create_key(entry_key: K) -> Self {
        Self { key: entry_key, entry: None }
    }

    pub fn swap_key(&mut self, new_key: K) {
        self.key = new_key
    }

    pub fn create_entry(entry_key: K, value: V) -> Self {
        Self { key: entry_key, entry: Some(value) }
    }

    pub fn get_key(&self) -> K
    where {
        self.key
    }

    pub fn drain(self) -> V {
        self.entry.unwrap()
    }

    pub fn get_entry(&self) -> &V {
        self.entry.as_ref().unwrap()
    }

    pub fn get_entry_mut(&mut self) -> &mut V {
        self.entry.as_mut().unwrap()
    }
}

impl<K, V> Default for PQEntry<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
    fn default() -> Self {
        Self { key: K::default(), entry: None }
    }
}

impl<K, V> PartialEq for PQEntry<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }

    fn ne(&self, other: &Self) -> bool {
        self.key != other.key
    }
}

impl<K, V> Eq for PQEntry<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
}

impl<K, V> Hash for PQEntry<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state)
    }

    fn hash_slice<H: Hasher>(data: &[Self], state: &mut H)
    where
        Self: Sized,
    {
        for piece in data {
            piece.hash(state)
        }
    }
}

/// Helper struct for PQIndex used in sliding-window operator implementations.
/// It is a min priority-queue backed by an indexmap that provides efficient key-lookups.
/// Being backed by PQ, it supports efficient (logn) operations to pop, push and change priority.
/// It uses `PQEntry` type to enable key based lookups.
/// It uses `FxHasher` as the default hash function.
#[derive(Clone, Debug)]
pub struct MinPQIndex<K: Copy + PartialEq + Clone + Debug + Hash + Default, V: Clone + Debug> {
    index: PriorityQueue<PQEntry<K, V>, Reverse<u64>, BuildHasherDefault<FxHasher>>,
    index_key: PQEntry<K, V>,
}

impl<K, V> Default for MinPQIndex<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
    fn default() -> Self {
        Self { index: PriorityQueue::with_hasher(BuildHasherDefault::<FxHasher>::default()), index_key: PQEntry::default() }
    }
}

impl<K, V> MinPQIndex<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
    /// insert a new element with given priority - log(n)
    pub fn push(&mut self, key: K, value: V, priority: u64) -> Option<u64> {
        let entry = PQEntry::create_entry(key, value);
        self.index.push(entry, Reverse(priority)).map(|Reverse(ts)| ts)
    }

    /// arbitrary changes to the priority of the given item - log(n)
    pub fn change_priority(&mut self, key: &K, new_priority: u64) -> Option<u64> {
        self.index_key.swap_key(*key);
        self.index.change_priority(&self.index_key, Reverse(new_priority)).map(|Reverse(ts)| ts)
    }

    /// retrieve the value and its priority for a given key
    pub fn get(&self, key: &K) -> Option<(&V, u64)> {
        self.index.get(&PQEntry::create_key(*key)).map(|(val, Reverse(ts))| (val.get_entry(), *ts))
    }

    /// retrieve the mutable value and its priority for a given key
    pub fn get_mut(&mut self, key: &K) -> Option<(&mut V, u64)> {
        self.index_key.swap_key(*key);
        self.index.get_mut(&self.index_key).map(|map_entry| (map_entry.0.get_entry_mut(), (map_entry.1).0))
    }

    /// decrease the priority of the given key only if its priority is larger than the argument
    pub fn try_decrease_priority(&mut self, key: &K, priority: u64) {
        self.index_key.swap_key(*key);
        if self.index.get_priority(&self.index_key).map_or(false, |Reverse(p)| *p > priority) {
            self.index.change_priority(&self.index_key, Reverse(priority));
        }
    }

    /// iterate over (key ,value, priority) triples in an arbitrary order
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = (K, &'a V, u64)> {
        self.index.iter().map(|(entry, Reverse(p))| (entry.get_key(), entry.get_entry(), *p))
    }

    /// iterate over (value, priority) tuples in an arbitrary order
    pub fn value_iterator<'a>(&'a self) -> impl Iterator<Item = (&'a V, u64)> {
        self.index.iter().map(|(entry, Reverse(p))| (entry.get_entry(), *p))
    }

    /// retrieve reference to entry with the min priority
    pub fn peek(&self) -> Option<(K, &V, u64)> {
        self.index.peek().map(|(val, Reverse(ts))| (val.get_key(), val.get_entry(), *ts))
    }

    /// extract min priority element -- log(n)
    pub fn pop(&mut self) -> Option<(K, V, u64)> {
        self.index.pop().map(|(val, Reverse(ts))| (val.get_key(), val.drain(), ts))
    }

    /// remove the entry with the given key
    pub fn remove(&mut self, key: &K) -> Option<(V, u64)> {
        self.index_key.swap_key(*key);
        self.index.remove(&self.index_key).map(|(val, Reverse(ts))| (val.drain(), ts))
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }
}
