//! Concurrency-safe set of order numbers currently owned by a worker.
//!
//! An element is present iff exactly one worker owns the order. Backed by
//! `dashmap::DashSet` for lock-free, linearizable test-and-add/remove.

use dashmap::DashSet;

pub struct InFlightSet {
    inner: DashSet<String>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self {
            inner: DashSet::new(),
        }
    }

    /// Atomically add `number` iff absent. Returns `true` if this call added
    /// it (the caller now owns it), `false` if another worker already does.
    pub fn try_add(&self, number: &str) -> bool {
        self.inner.insert(number.to_string())
    }

    pub fn remove(&self, number: &str) {
        self.inner.remove(number);
    }

    pub fn contains(&self, number: &str) -> bool {
        self.inner.contains(number)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl Default for InFlightSet {
    fn default() -> Self {
        Self::new()
    }
}
