//! Priority frontier of pending targets

use crate::queue::CrawlTarget;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Heap entry ordering targets for dispatch
#[derive(Debug, Clone)]
struct Queued(CrawlTarget);

// Higher priority pops first; equal priorities pop in submission order
impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.sequence.cmp(&self.0.sequence))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority == other.0.priority && self.0.sequence == other.0.sequence
    }
}

impl Eq for Queued {}

/// Pending targets, highest priority first
#[derive(Debug, Default)]
pub struct Frontier {
    heap: BinaryHeap<Queued>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, target: CrawlTarget) {
        self.heap.push(Queued(target));
    }

    pub fn pop(&mut self) -> Option<CrawlTarget> {
        self.heap.pop().map(|queued| queued.0)
    }

    /// Pops up to `size` targets in dispatch order
    pub fn pop_batch(&mut self, size: usize) -> Vec<CrawlTarget> {
        std::iter::from_fn(|| self.pop()).take(size).collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Removes every pending target
    pub fn drain_all(&mut self) -> Vec<CrawlTarget> {
        self.heap.drain().map(|queued| queued.0).collect()
    }
}
