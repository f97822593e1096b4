//! Connection identifier allocation
//!
//! Every pool owns one [`IdAllocator`] holding the identifiers `1..=max_pool_size`.
//! A new connection takes the lowest unused identifier and gives it back when it
//! is evicted, so live connections never share an identifier.

use crossbeam_skiplist::SkipSet;

/// Concurrent allocator of connection identifiers.
///
/// Both sets are lock-free ordered skip lists; taking the lowest identifier is a
/// single atomic `pop_front`.
#[derive(Debug)]
pub struct IdAllocator {
    unused: SkipSet<usize>,
    used: SkipSet<usize>,
    capacity: usize,
}

impl IdAllocator {
    /// Create an allocator owning the identifiers `1..=capacity`.
    pub fn new(capacity: usize) -> Self {
        let unused = SkipSet::new();
        for id in 1..=capacity {
            unused.insert(id);
        }
        Self {
            unused,
            used: SkipSet::new(),
            capacity,
        }
    }

    /// Take the lowest unused identifier, or `None` when all are in use.
    pub(crate) fn acquire(&self) -> Option<usize> {
        let entry = self.unused.pop_front()?;
        let id = *entry.value();
        self.used.insert(id);
        Some(id)
    }

    /// Give an identifier back to the unused set.
    pub(crate) fn release(&self, id: usize) {
        if self.used.remove(&id).is_some() {
            self.unused.insert(id);
        } else {
            tracing::warn!(connection_id = id, "released an identifier that was not in use");
        }
    }

    /// Number of identifiers managed by this allocator.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Identifiers currently held by live connections, ascending.
    pub fn used(&self) -> Vec<usize> {
        self.used.iter().map(|entry| *entry.value()).collect()
    }

    /// Identifiers available for new connections, ascending.
    pub fn unused(&self) -> Vec<usize> {
        self.unused.iter().map(|entry| *entry.value()).collect()
    }

    pub fn in_use(&self) -> usize {
        self.used.len()
    }
}
