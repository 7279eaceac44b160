//! Bounded dedup set for paid-out source transactions.
//!
//! The relayer must remember every source transaction it has already paid so
//! that rescans never pay twice. Memory and the state file must not grow
//! without limit, so the set keeps at most `capacity` identifiers and evicts
//! the oldest insertion first.
//!
//! The capacity is the replay window: an event whose id has been evicted and
//! whose block is rescanned (e.g. by a forced rescan) would be paid again.
//! Size it well above the number of payouts expected between rescans.

use std::collections::{HashSet, VecDeque};

/// Default number of identifiers remembered.
pub const DEFAULT_PROCESSED_CAPACITY: usize = 2000;

/// Insertion-ordered set of identifiers with a hard capacity.
///
/// - **Membership:** O(1) through the `HashSet` index.
/// - **Eviction:** when an insert would exceed capacity, the oldest
///   identifier (front of the ring) is removed first.
/// - **Re-insert:** inserting an id that is already present is a no-op and
///   does not refresh its age.
#[derive(Debug, Clone)]
pub struct BoundedIdSet {
    order: VecDeque<String>,
    index: HashSet<String>,
    capacity: usize,
}

impl BoundedIdSet {
    /// Create an empty set. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            index: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Build from identifiers listed oldest first, keeping the newest
    /// `capacity` of them. Duplicates keep their first position.
    pub fn from_ids<I>(ids: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut set = Self::new(capacity);
        for id in ids {
            set.insert(id);
        }
        set
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Insert an id. Returns `true` if it was not already present.
    pub fn insert(&mut self, id: String) -> bool {
        if self.index.contains(&id) {
            return false;
        }

        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(evicted) => {
                    self.index.remove(&evicted);
                }
                None => break,
            }
        }

        self.index.insert(id.clone());
        self.order.push_back(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Identifiers oldest first, as persisted.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }
}

impl PartialEq for BoundedIdSet {
    fn eq(&self, other: &Self) -> bool {
        self.capacity == other.capacity && self.order == other.order
    }
}

impl Eq for BoundedIdSet {}
