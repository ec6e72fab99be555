//! Exponential Histogram (EH) sketch shared by the `eh_sum`, `eh_ave` and
//! `eh_variance` operators: an approximate sliding-window aggregate with
//! bounded memory, grounded in `original_source/SamSrc/sam/ExponentialHistogram*.hpp`'s
//! bucket-merge contract.
//!
//! Each insert starts its own bucket of size 1. Whenever more than `k/2+2`
//! buckets of the same size exist (`k+2` when that size is 1), the two oldest
//! such buckets merge into one bucket of double size. Buckets older than `n`
//! inserts are dropped before a read, and the sum of every remaining bucket's
//! value is taken as the window estimate.

use std::collections::VecDeque;

/// a value an exponential histogram can merge two buckets of
pub trait EhValue: Copy {
    fn zero() -> Self;
    fn merge(a: Self, b: Self) -> Self;
}

impl EhValue for f64 {
    fn zero() -> Self {
        0.0
    }

    fn merge(a: Self, b: Self) -> Self {
        a + b
    }
}

#[derive(Clone, Copy, Debug)]
struct Bucket<T: EhValue> {
    /// insertion sequence number of the newest element folded into this bucket
    id: u64,
    size: u64,
    value: T,
}

pub struct ExponentialHistogram<T: EhValue> {
    k: u64,
    window: u64,
    next_id: u64,
    buckets: VecDeque<Bucket<T>>,
}

impl<T: EhValue> ExponentialHistogram<T> {
    /// `k` controls the approximation error (smaller k, smaller buckets, more memory);
    /// `window` is the number of most recent inserts retained
    pub fn new(k: u64, window: u64) -> Self {
        Self { k: k.max(1), window: window.max(1), next_id: 0, buckets: VecDeque::new() }
    }

    pub fn insert(&mut self, value: T) {
        let id = self.next_id;
        self.next_id += 1;
        self.buckets.push_back(Bucket { id, size: 1, value });
        self.compress();
        self.evict();
    }

    fn max_buckets_of_size(&self, size: u64) -> usize {
        let limit = if size == 1 { self.k + 2 } else { self.k / 2 + 2 };
        limit as usize
    }

    /// merges the two oldest buckets of any size that has overflowed its limit
    fn compress(&mut self) {
        loop {
            let mut merged_any = false;
            let mut size = 1u64;
            while size <= self.next_id.max(1) {
                let indices: Vec<usize> =
                    self.buckets.iter().enumerate().filter(|(_, b)| b.size == size).map(|(i, _)| i).collect();
                if indices.len() > self.max_buckets_of_size(size) {
                    let (oldest, second) = (indices[0], indices[1]);
                    let a = self.buckets[oldest];
                    let b = self.buckets[second];
                    let merged = Bucket { id: b.id, size: a.size + b.size, value: T::merge(a.value, b.value) };
                    self.buckets.remove(second);
                    self.buckets.remove(oldest);
                    // re-insert sorted by id (oldest first); merged bucket keeps the
                    // newer of the two ids, so it sorts back in at `second`'s old spot
                    let pos = self.buckets.iter().position(|b| b.id > merged.id).unwrap_or(self.buckets.len());
                    self.buckets.insert(pos, merged);
                    merged_any = true;
                }
                size *= 2;
            }
            if !merged_any {
                break;
            }
        }
    }

    fn evict(&mut self) {
        let cutoff = self.next_id.saturating_sub(self.window);
        while let Some(front) = self.buckets.front() {
            if front.id < cutoff {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    /// the windowed aggregate estimate: the sum of every surviving bucket's value
    pub fn estimate(&self) -> T {
        let mut total = T::zero();
        for bucket in &self.buckets {
            total = T::merge(total, bucket.value);
        }
        total
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
