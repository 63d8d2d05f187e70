//! The vector index: LSH tables plus an exact store behind one lock.
//!
//! [`IndexData`] owns the hyperplanes, the per-table buckets, and every
//! record. [`VectorIndex`] is a cheap-to-clone handle to an
//! `Arc<RwLock<IndexData>>`: `insert` and `load` take the write lock, every
//! other operation takes the read lock, so concurrent readers always observe
//! a whole insert or none of it.

use crate::config::IndexConfig;
use crate::error::{IndexError, IndexResult};
use crate::lsh::{HashTable, Hasher};
use crate::storage::persistence::{self, DecodedIndex};
use crate::storage::{ExactStore, Neighbor};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Size and occupancy figures for an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub records: usize,
    pub dimension: usize,
    pub num_tables: usize,
    pub num_bits: usize,
    /// Non-empty buckets, one entry per table.
    pub occupied_buckets: Vec<usize>,
    /// Most populated bucket across all tables.
    pub largest_bucket: usize,
    pub estimated_memory_bytes: usize,
}

/// Internal index state, protected by a `RwLock`.
#[derive(Debug)]
pub struct IndexData {
    pub config: IndexConfig,
    pub hasher: Hasher,
    pub tables: Vec<HashTable>,
    pub store: ExactStore,
}

fn check_k(k: usize) -> IndexResult<()> {
    if k == 0 {
        return Err(IndexError::InvalidArgument("k must be greater than 0".into()));
    }
    Ok(())
}

fn check_finite(vector: &[f32], what: &str) -> IndexResult<()> {
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(IndexError::InvalidArgument(format!(
            "{} contains a non-finite component",
            what
        )));
    }
    Ok(())
}

impl IndexData {
    /// Creates an empty index and generates its hyperplanes from `config.seed`.
    pub fn new(config: IndexConfig) -> IndexResult<Self> {
        config.validate()?;
        let hasher = Hasher::generate(
            config.dimension,
            config.num_tables,
            config.num_bits,
            config.seed,
        );
        Ok(Self {
            config,
            hasher,
            tables: vec![HashTable::new(); config.num_tables],
            store: ExactStore::new(config.dimension),
        })
    }

    /// Builds an index from decoded file contents, recomputing every bucket.
    pub fn from_decoded(decoded: DecodedIndex) -> IndexResult<Self> {
        let DecodedIndex {
            config,
            hasher,
            records,
        } = decoded;
        let mut data = Self {
            config,
            hasher,
            tables: vec![HashTable::new(); config.num_tables],
            store: ExactStore::new(config.dimension),
        };
        for (id, vector) in records {
            data.insert(id, vector).map_err(|e| match e {
                IndexError::DuplicateId(id) => {
                    IndexError::format(format!("duplicate record id {}", id))
                }
                IndexError::InvalidArgument(msg) => {
                    IndexError::format(format!("record {}: {}", id, msg))
                }
                other => other,
            })?;
        }
        Ok(data)
    }

    /// Inserts one record into the store and every table.
    ///
    /// Validation order: dimension, finite components, duplicate id. Nothing
    /// is mutated unless all checks pass.
    pub fn insert(&mut self, id: u64, vector: Vec<f32>) -> IndexResult<()> {
        IndexError::check_dimension(self.config.dimension, vector.len())?;
        check_finite(&vector, &format!("vector for id {}", id))?;
        if self.store.contains(id) {
            return Err(IndexError::DuplicateId(id));
        }
        let keys = self.hasher.signatures(&vector)?;
        self.store.insert(id, vector)?;
        for (table, key) in self.tables.iter_mut().zip(keys) {
            table.insert(key, id);
        }
        Ok(())
    }

    /// One-bucket-per-table LSH search: union the matching bucket of every table,
    /// then rank the union exactly.
    pub fn query(&self, vector: &[f32], k: usize) -> IndexResult<Vec<Neighbor>> {
        check_k(k)?;
        IndexError::check_dimension(self.config.dimension, vector.len())?;
        check_finite(vector, "query vector")?;
        let keys = self.hasher.signatures(vector)?;
        if self.store.is_empty() {
            return Ok(Vec::new());
        }
        let mut candidates: HashSet<u64> = HashSet::new();
        for (table, key) in self.tables.iter().zip(keys) {
            candidates.extend(table.candidates(key));
        }
        tracing::debug!(
            candidates = candidates.len(),
            records = self.store.len(),
            k,
            "LSH candidate set"
        );
        self.store.rank(vector, candidates, k)
    }

    /// Brute-force search over every record.
    pub fn exact_query(&self, vector: &[f32], k: usize) -> IndexResult<Vec<Neighbor>> {
        check_k(k)?;
        IndexError::check_dimension(self.config.dimension, vector.len())?;
        check_finite(vector, "query vector")?;
        self.store.scan_top_k(vector, k)
    }

    /// Validate internal invariants.
    ///
    /// Checks that the hasher and store agree with the config, that there is
    /// one table per configured table, and that every record sits in exactly
    /// the bucket its vector hashes to in every table.
    pub fn validate(&self) -> Result<(), String> {
        let cfg = &self.config;
        if self.hasher.dim() != cfg.dimension
            || self.hasher.num_tables() != cfg.num_tables
            || self.hasher.num_bits() != cfg.num_bits
        {
            return Err(format!(
                "hasher shape ({}, {}, {}) != config ({}, {}, {})",
                self.hasher.dim(),
                self.hasher.num_tables(),
                self.hasher.num_bits(),
                cfg.dimension,
                cfg.num_tables,
                cfg.num_bits
            ));
        }
        if self.store.dimension() != cfg.dimension {
            return Err(format!(
                "store dimension {} != config dimension {}",
                self.store.dimension(),
                cfg.dimension
            ));
        }
        if self.tables.len() != cfg.num_tables {
            return Err(format!(
                "tables length {} != num_tables {}",
                self.tables.len(),
                cfg.num_tables
            ));
        }

        // Each table holds exactly one membership per record.
        for (t, table) in self.tables.iter().enumerate() {
            if table.entry_count() != self.store.len() {
                return Err(format!(
                    "table {} has {} memberships for {} records",
                    t,
                    table.entry_count(),
                    self.store.len()
                ));
            }
        }

        // ...and that membership is the bucket the vector hashes to.
        for (id, vector) in self.store.iter() {
            let keys = self.hasher.signatures(vector).map_err(|e| e.to_string())?;
            for (t, (table, key)) in self.tables.iter().zip(keys).enumerate() {
                if !table.contains(key, id) {
                    return Err(format!(
                        "id {} missing from bucket {:#x} of table {}",
                        id, key, t
                    ));
                }
            }
        }

        Ok(())
    }

    /// Occupancy and memory figures.
    pub fn stats(&self) -> IndexStats {
        let occupied_buckets: Vec<usize> =
            self.tables.iter().map(HashTable::bucket_count).collect();
        let largest_bucket = self
            .tables
            .iter()
            .map(HashTable::largest_bucket)
            .max()
            .unwrap_or(0);

        let mut memory = self.store.estimate_memory_bytes();
        memory += self.hasher.planes().len() * 4;
        for table in &self.tables {
            // id (8) + set slot overhead per membership, key + set header per bucket.
            memory += table.entry_count() * 16 + table.bucket_count() * 56;
        }

        IndexStats {
            records: self.store.len(),
            dimension: self.config.dimension,
            num_tables: self.config.num_tables,
            num_bits: self.config.num_bits,
            occupied_buckets,
            largest_bucket,
            estimated_memory_bytes: memory,
        }
    }
}

/// A thread-safe LSH vector index.
///
/// All operations acquire either a read or write lock on the internal
/// [`IndexData`]. Cloning a `VectorIndex` produces a new handle to the same
/// shared data.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    pub data: Arc<RwLock<IndexData>>,
}

impl VectorIndex {
    /// Creates an empty index with the default hyperplane seed.
    pub fn new(dimension: usize, num_tables: usize, num_bits: usize) -> IndexResult<Self> {
        Self::with_config(IndexConfig::new(dimension, num_tables, num_bits))
    }

    /// Creates an empty index from a full configuration.
    pub fn with_config(config: IndexConfig) -> IndexResult<Self> {
        let data = IndexData::new(config)?;
        tracing::debug!(
            dimension = config.dimension,
            num_tables = config.num_tables,
            num_bits = config.num_bits,
            "Created LSH index"
        );
        Ok(Self {
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Opens an index file, adopting the parameters it declares.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let decoded = persistence::read_index(path.as_ref(), None)?;
        let data = IndexData::from_decoded(decoded)?;
        data.validate().map_err(IndexError::FormatError)?;
        Ok(Self {
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Inserts `vector` under `id`. All-or-nothing.
    pub fn insert(&self, id: u64, vector: Vec<f32>) -> IndexResult<()> {
        self.data.write().insert(id, vector)
    }

    /// Approximate top-`k` ids by cosine distance. May return fewer than `k`
    /// (or none) when the matching buckets are sparse.
    pub fn query(&self, vector: &[f32], k: usize) -> IndexResult<Vec<u64>> {
        Ok(ids(self.query_scored(vector, k)?))
    }

    /// Like [`query`](Self::query) but keeps the distances.
    pub fn query_scored(&self, vector: &[f32], k: usize) -> IndexResult<Vec<Neighbor>> {
        self.data.read().query(vector, k)
    }

    /// Exact top-`k` ids by cosine distance over every record.
    pub fn exact_query(&self, vector: &[f32], k: usize) -> IndexResult<Vec<u64>> {
        Ok(ids(self.exact_query_scored(vector, k)?))
    }

    /// Like [`exact_query`](Self::exact_query) but keeps the distances.
    pub fn exact_query_scored(&self, vector: &[f32], k: usize) -> IndexResult<Vec<Neighbor>> {
        self.data.read().exact_query(vector, k)
    }

    /// Returns a copy of the vector stored under `id`.
    pub fn get(&self, id: u64) -> IndexResult<Vec<f32>> {
        self.data.read().store.get(id).map(<[f32]>::to_vec)
    }

    /// Returns a copy of every record.
    pub fn get_all(&self) -> HashMap<u64, Vec<f32>> {
        self.data.read().store.get_all()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.read().store.len()
    }

    /// Returns `true` if no record has been inserted.
    pub fn is_empty(&self) -> bool {
        self.data.read().store.is_empty()
    }

    pub fn config(&self) -> IndexConfig {
        self.data.read().config
    }

    pub fn dimension(&self) -> usize {
        self.data.read().config.dimension
    }

    pub fn num_tables(&self) -> usize {
        self.data.read().config.num_tables
    }

    pub fn num_bits(&self) -> usize {
        self.data.read().config.num_bits
    }

    pub fn stats(&self) -> IndexStats {
        self.data.read().stats()
    }

    /// Validate internal invariants. See [`IndexData::validate`].
    pub fn validate(&self) -> Result<(), String> {
        self.data.read().validate()
    }

    /// Writes the full index state to `path`.
    ///
    /// Encoding happens under the read lock; the file write happens after it
    /// is released.
    pub fn save(&self, path: impl AsRef<Path>) -> IndexResult<()> {
        let path = path.as_ref();
        let (bytes, records) = {
            let data = self.data.read();
            (persistence::encode_index(&data)?, data.store.len())
        };
        persistence::write_atomic(path, &bytes)?;
        tracing::info!(
            "Saved index to {:?} ({} records, {} bytes)",
            path,
            records,
            bytes.len()
        );
        Ok(())
    }

    /// Replaces the whole index state with the contents of `path`.
    ///
    /// The file must declare this index's dimension (`InvalidDimension`
    /// otherwise, before any record is read) and its table and bit counts
    /// (`FormatError` otherwise). Decoding and bucket rebuilding happen
    /// before the write lock is taken; the swap itself is atomic. On error
    /// the index is unchanged.
    pub fn load(&self, path: impl AsRef<Path>) -> IndexResult<()> {
        let path = path.as_ref();
        let current = self.config();
        let decoded = persistence::read_index(path, Some(current.dimension))?;
        if decoded.config.num_tables != current.num_tables
            || decoded.config.num_bits != current.num_bits
        {
            tracing::warn!(
                "Rejecting index file {:?}: tables/bits ({}, {}) != ({}, {})",
                path,
                decoded.config.num_tables,
                decoded.config.num_bits,
                current.num_tables,
                current.num_bits
            );
            return Err(IndexError::format(format!(
                "file declares num_tables={} num_bits={}, index has num_tables={} num_bits={}",
                decoded.config.num_tables,
                decoded.config.num_bits,
                current.num_tables,
                current.num_bits
            )));
        }

        let loaded = IndexData::from_decoded(decoded)?;
        loaded
            .validate()
            .map_err(|e| IndexError::format(format!("index validation failed: {}", e)))?;
        let records = loaded.store.len();
        *self.data.write() = loaded;

        tracing::info!("Loaded index from {:?} ({} records)", path, records);
        Ok(())
    }
}

fn ids(neighbors: Vec<Neighbor>) -> Vec<u64> {
    neighbors.into_iter().map(|n| n.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_embedding(dim: usize, seed: usize) -> Vec<f32> {
        (0..dim)
            .map(|j| (((seed + 1) * 2654435761 + j * 40503) & 0xFFFF) as f32 / 65535.0 - 0.5)
            .collect()
    }

    fn small_index() -> VectorIndex {
        let index = VectorIndex::new(4, 2, 2).unwrap();
        index.insert(1, vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        index.insert(2, vec![0.0, 1.0, 0.0, 0.0]).unwrap();
        index.insert(3, vec![1.0, 0.0, 0.0, 0.01]).unwrap();
        index
    }

    // ── Construction ───────────────────────────────────────────────────

    #[test]
    fn test_new_index_is_empty() {
        let index = VectorIndex::new(8, 4, 6).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert_eq!(index.dimension(), 8);
        assert_eq!(index.num_tables(), 4);
        assert_eq!(index.num_bits(), 6);
        assert!(index.validate().is_ok());
    }

    #[test]
    fn test_new_rejects_bad_parameters() {
        assert!(matches!(
            VectorIndex::new(0, 8, 16),
            Err(IndexError::InvalidArgument(_))
        ));
        assert!(matches!(
            VectorIndex::new(4, 0, 16),
            Err(IndexError::InvalidArgument(_))
        ));
        assert!(matches!(
            VectorIndex::new(4, 8, 0),
            Err(IndexError::InvalidArgument(_))
        ));
    }

    // ── Insert ─────────────────────────────────────────────────────────

    #[test]
    fn test_insert_populates_every_table() {
        let index = small_index();
        assert_eq!(index.len(), 3);
        let stats = index.stats();
        assert_eq!(stats.records, 3);
        assert_eq!(stats.occupied_buckets.len(), 2);
        assert!(stats.largest_bucket >= 1);
        let data = index.data.read();
        for table in &data.tables {
            assert_eq!(table.entry_count(), 3);
        }
        assert!(data.validate().is_ok());
    }

    #[test]
    fn test_insert_wrong_dimension_leaves_index_unchanged() {
        let index = small_index();
        let err = index.insert(4, vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::InvalidDimension {
                expected: 4,
                actual: 2
            }
        ));
        assert_eq!(index.len(), 3);
        assert!(index.validate().is_ok());
    }

    #[test]
    fn test_insert_duplicate_keeps_first_vector() {
        let index = small_index();
        let err = index.insert(1, vec![0.0, 0.0, 1.0, 0.0]).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateId(1)));
        assert_eq!(index.get(1).unwrap(), vec![1.0, 0.0, 0.0, 0.0]);
        assert!(index.validate().is_ok());
    }

    #[test]
    fn test_dimension_checked_before_duplicate() {
        let index = small_index();
        let err = index.insert(1, vec![1.0]).unwrap_err();
        assert!(matches!(err, IndexError::InvalidDimension { .. }));
    }

    #[test]
    fn test_insert_rejects_non_finite() {
        let index = VectorIndex::new(2, 1, 2).unwrap();
        let err = index.insert(1, vec![f32::NAN, 0.0]).unwrap_err();
        assert!(matches!(err, IndexError::InvalidArgument(_)));
        assert!(index.is_empty());
    }

    // ── Queries ────────────────────────────────────────────────────────

    #[test]
    fn test_exact_query_example_scenario() {
        let index = small_index();
        assert_eq!(index.exact_query(&[1.0, 0.0, 0.0, 0.0], 2).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_query_self_retrieval() {
        let index = small_index();
        // The query hashes to the exact buckets id 1 lives in.
        let hits = index.query_scored(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_query_results_are_subset_of_exact_order() {
        let index = VectorIndex::new(16, 6, 4).unwrap();
        for i in 0..200 {
            index.insert(i, make_embedding(16, i as usize)).unwrap();
        }
        let q = make_embedding(16, 7);
        let approx = index.query_scored(&q, 10).unwrap();
        assert!(approx.len() <= 10);
        assert_eq!(approx[0].id, 7, "query vector is stored as id 7");
        for pair in approx.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        let exact = index.exact_query_scored(&q, 10).unwrap();
        assert_eq!(exact.len(), 10);
        // Approximate results can only be as good as exact ones.
        for (a, e) in approx.iter().zip(&exact) {
            assert!(a.distance >= e.distance - 1e-6);
        }
    }

    #[test]
    fn test_empty_index_queries_return_nothing() {
        let index = VectorIndex::new(4, 2, 2).unwrap();
        assert!(index.query(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());
        assert!(index.exact_query(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_query_rejects_zero_k() {
        let index = small_index();
        assert!(matches!(
            index.query(&[1.0, 0.0, 0.0, 0.0], 0),
            Err(IndexError::InvalidArgument(_))
        ));
        assert!(matches!(
            index.exact_query(&[1.0, 0.0, 0.0, 0.0], 0),
            Err(IndexError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_query_rejects_wrong_dimension() {
        let index = small_index();
        assert!(matches!(
            index.query(&[1.0, 0.0], 1),
            Err(IndexError::InvalidDimension { .. })
        ));
        assert!(matches!(
            index.exact_query(&[1.0, 0.0], 1),
            Err(IndexError::InvalidDimension { .. })
        ));
    }

    #[test]
    fn test_query_rejects_non_finite_vector() {
        let index = small_index();
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let q = [1.0, bad, 0.0, 0.0];
            assert!(matches!(
                index.query(&q, 2),
                Err(IndexError::InvalidArgument(_))
            ));
            assert!(matches!(
                index.exact_query(&q, 2),
                Err(IndexError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_self_retrieval_with_extreme_magnitudes() {
        for scale in [1e20f32, 1e-6, 1e-30, 1e30] {
            let index = VectorIndex::new(4, 2, 2).unwrap();
            index.insert(1, vec![0.0, 1.0, 0.0, 0.0]).unwrap();
            index.insert(2, vec![scale, 0.0, 0.0, 0.0]).unwrap();
            let q = [scale, 0.0, 0.0, 0.0];

            let exact = index.exact_query_scored(&q, 2).unwrap();
            assert_eq!(exact[0].id, 2, "scale {scale}");
            assert_eq!(exact[0].distance, 0.0, "scale {scale}");
            assert_eq!(exact[1].distance, 1.0, "scale {scale}");

            let approx = index.query_scored(&q, 1).unwrap();
            assert_eq!(approx[0].id, 2, "scale {scale}");
            assert_eq!(approx[0].distance, 0.0, "scale {scale}");
        }
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let index = small_index();
        assert!(matches!(index.get(42), Err(IndexError::NotFound(42))));
    }

    #[test]
    fn test_get_all_on_empty_index() {
        let index = VectorIndex::new(4, 2, 2).unwrap();
        assert!(index.get_all().is_empty());
    }

    #[test]
    fn test_clone_shares_state() {
        let index = VectorIndex::new(2, 1, 1).unwrap();
        let handle = index.clone();
        handle.insert(5, vec![0.3, 0.4]).unwrap();
        assert_eq!(index.len(), 1);
    }

    // ── validate ───────────────────────────────────────────────────────

    #[test]
    fn test_validate_detects_missing_membership() {
        let index = small_index();
        index.data.write().tables[1].clear();
        assert!(index.validate().is_err());
    }

    #[test]
    fn test_validate_detects_stray_membership() {
        let index = small_index();
        index.data.write().tables[0].insert(0, 999);
        assert!(index.validate().is_err());
    }

    #[test]
    fn test_stats_memory_grows_with_records() {
        let index = VectorIndex::new(8, 2, 4).unwrap();
        let before = index.stats().estimated_memory_bytes;
        index.insert(1, make_embedding(8, 1)).unwrap();
        assert!(index.stats().estimated_memory_bytes > before);
    }
}
