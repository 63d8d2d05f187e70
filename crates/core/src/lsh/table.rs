//! One LSH hash table: bucket key → set of member ids.

use std::collections::{HashMap, HashSet};

/// Bucket storage for a single table. Has no knowledge of other tables.
#[derive(Debug, Default, Clone)]
pub struct HashTable {
    buckets: HashMap<u32, HashSet<u64>>,
}

impl HashTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id` to the bucket for `key`. Re-inserting the same pair is a no-op.
    pub fn insert(&mut self, key: u32, id: u64) {
        self.buckets.entry(key).or_default().insert(id);
    }

    /// Members of the bucket for `key`; empty when the bucket does not exist.
    pub fn candidates(&self, key: u32) -> impl Iterator<Item = u64> + '_ {
        self.buckets.get(&key).into_iter().flatten().copied()
    }

    /// Returns `true` if `id` is a member of the bucket for `key`.
    pub fn contains(&self, key: u32, id: u64) -> bool {
        self.buckets.get(&key).is_some_and(|b| b.contains(&id))
    }

    /// Number of non-empty buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Size of the most populated bucket (0 when empty).
    pub fn largest_bucket(&self) -> usize {
        self.buckets.values().map(HashSet::len).max().unwrap_or(0)
    }

    /// Total number of (key, id) memberships.
    pub fn entry_count(&self) -> usize {
        self.buckets.values().map(HashSet::len).sum()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
