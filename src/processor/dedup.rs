//! Bounded membership windows used to drop already-seen content references and
//! records.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

/// Insertion-ordered set with a fixed capacity and FIFO eviction.
///
/// Membership is answered from a hash index; eviction order comes from a queue
/// of the same keys. Both hold a shared `Arc<T>`, so each entry is allocated
/// once. Re-inserting a present value is a no-op and does not move it towards
/// the back of the queue.
#[derive(Debug)]
pub struct DedupWindow<T: ?Sized> {
    capacity: usize,
    order: VecDeque<Arc<T>>,
    index: HashSet<Arc<T>>,
}

impl<T: Eq + Hash + ?Sized> DedupWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            index: HashSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, value: &T) -> bool {
        self.index.contains(value)
    }

    /// Inserts `value`, evicting the oldest entry once the window is full.
    /// Returns `false` when the value was already present.
    pub fn insert(&mut self, value: impl Into<Arc<T>>) -> bool {
        let value = value.into();
        if self.index.contains(&value) {
            return false;
        }

        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.index.remove(&oldest);
            }
        }

        self.index.insert(Arc::clone(&value));
        self.order.push_back(value);
        true
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().map(|value| value.as_ref())
    }
}

impl<T, V> Extend<V> for DedupWindow<T>
where
    T: Eq + Hash + ?Sized,
    V: Into<Arc<T>>,
{
    fn extend<I: IntoIterator<Item = V>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}
