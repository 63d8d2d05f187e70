//! Authoritative id → vector storage with brute-force top-k ranking.
//!
//! [`ExactStore`] is the source of truth for persistence, for exact search,
//! and for re-ranking LSH candidates. Both ranking paths share one bounded
//! max-heap so exact and approximate results are directly comparable.

use crate::distance::{cosine_distance_prenorm, norm};
use crate::error::{IndexError, IndexResult};
use ordered_float::OrderedFloat;
use std::collections::{BinaryHeap, HashMap};

/// A ranked search hit: id and cosine distance to the query (lower = closer).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: u64,
    pub distance: f32,
}

/// A stored vector with its L2 norm precomputed at insert time.
#[derive(Debug, Clone)]
struct Record {
    vector: Vec<f32>,
    norm: f64,
}

/// A heap entry ordered by (distance, id). The max-heap keeps the current
/// worst of the best `k` on top so it can be evicted in O(log k).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResultEntry {
    distance: OrderedFloat<f32>,
    id: u64,
}

impl Ord for ResultEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance
            .cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for ResultEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded top-k selector. Smallest distances win; ties go to the smaller id.
struct TopK {
    k: usize,
    heap: BinaryHeap<ResultEntry>,
}

impl TopK {
    fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    #[inline]
    fn push(&mut self, id: u64, distance: f32) {
        let entry = ResultEntry {
            distance: OrderedFloat(distance),
            id,
        };
        if self.heap.len() < self.k {
            self.heap.push(entry);
        } else if let Some(worst) = self.heap.peek() {
            if entry < *worst {
                self.heap.pop();
                self.heap.push(entry);
            }
        }
    }

    fn into_sorted(self) -> Vec<Neighbor> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|e| Neighbor {
                id: e.id,
                distance: e.distance.into_inner(),
            })
            .collect()
    }
}

/// Exclusive owner of every inserted vector.
#[derive(Debug, Clone)]
pub struct ExactStore {
    dimension: usize,
    records: HashMap<u64, Record>,
}

impl ExactStore {
    /// Creates an empty store for vectors of length `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: HashMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.records.contains_key(&id)
    }

    /// Stores `vector` under `id`. Checks dimension first, then uniqueness.
    pub fn insert(&mut self, id: u64, vector: Vec<f32>) -> IndexResult<()> {
        IndexError::check_dimension(self.dimension, vector.len())?;
        if self.records.contains_key(&id) {
            return Err(IndexError::DuplicateId(id));
        }
        let norm = norm(&vector);
        self.records.insert(id, Record { vector, norm });
        Ok(())
    }

    /// Borrows the vector stored under `id`.
    pub fn get(&self, id: u64) -> IndexResult<&[f32]> {
        self.records
            .get(&id)
            .map(|r| r.vector.as_slice())
            .ok_or(IndexError::NotFound(id))
    }

    /// Copies every record into an owned map.
    pub fn get_all(&self) -> HashMap<u64, Vec<f32>> {
        self.records
            .iter()
            .map(|(&id, r)| (id, r.vector.clone()))
            .collect()
    }

    /// Iterates over all records in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[f32])> + '_ {
        self.records.iter().map(|(&id, r)| (id, r.vector.as_slice()))
    }

    /// Record ids in ascending order.
    pub fn sorted_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.records.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The `k` records closest to `query` over the whole store.
    ///
    /// Returns fewer than `k` entries when the store is smaller than `k`.
    pub fn scan_top_k(&self, query: &[f32], k: usize) -> IndexResult<Vec<Neighbor>> {
        IndexError::check_dimension(self.dimension, query.len())?;
        let query_norm = norm(query);
        let mut top = TopK::new(k);
        for (&id, record) in &self.records {
            top.push(
                id,
                cosine_distance_prenorm(query, &record.vector, query_norm, record.norm),
            );
        }
        Ok(top.into_sorted())
    }

    /// The `k` closest records among `candidates`. Unknown ids are skipped.
    pub fn rank<I>(&self, query: &[f32], candidates: I, k: usize) -> IndexResult<Vec<Neighbor>>
    where
        I: IntoIterator<Item = u64>,
    {
        IndexError::check_dimension(self.dimension, query.len())?;
        let query_norm = norm(query);
        let mut top = TopK::new(k);
        for id in candidates {
            if let Some(record) = self.records.get(&id) {
                top.push(
                    id,
                    cosine_distance_prenorm(query, &record.vector, query_norm, record.norm),
                );
            }
        }
        Ok(top.into_sorted())
    }

    /// Approximate heap footprint of the stored records in bytes.
    pub fn estimate_memory_bytes(&self) -> usize {
        // Vec header + norm + key + hash bucket overhead per record.
        self.records.len() * (self.dimension * 4 + 24 + 8 + 8 + 16)
    }
}
