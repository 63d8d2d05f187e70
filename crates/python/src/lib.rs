//! Python bindings for lshdb via PyO3.
//!
//! Exposes `VectorDB` and `IndexInfo` classes in an `lsh_core` Python module.
//! `VectorDB(dim, tables, bits)` is the handle the serving layer creates once
//! and shares across request handlers; the heavy calls release the GIL.

use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::collections::HashMap;

use lshdb_core::config::{DEFAULT_NUM_BITS, DEFAULT_NUM_TABLES, DEFAULT_SEED};
use lshdb_core::{IndexConfig, IndexError, VectorIndex};

// ---------------------------------------------------------------------------
// Helper: IndexError → Python exception
// ---------------------------------------------------------------------------

fn to_py_err(e: IndexError) -> PyErr {
    match e {
        IndexError::NotFound(_) => PyKeyError::new_err(e.to_string()),
        IndexError::InvalidDimension { .. }
        | IndexError::DuplicateId(_)
        | IndexError::InvalidArgument(_) => PyValueError::new_err(e.to_string()),
        IndexError::FormatError(_) | IndexError::Io(_) => PyRuntimeError::new_err(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// IndexInfo
// ---------------------------------------------------------------------------

/// Size and occupancy figures for an index.
#[pyclass(frozen)]
struct IndexInfo {
    #[pyo3(get)]
    records: usize,
    #[pyo3(get)]
    dimension: usize,
    #[pyo3(get)]
    num_tables: usize,
    #[pyo3(get)]
    num_bits: usize,
    #[pyo3(get)]
    occupied_buckets: Vec<usize>,
    #[pyo3(get)]
    largest_bucket: usize,
    #[pyo3(get)]
    estimated_memory_bytes: usize,
}

#[pymethods]
impl IndexInfo {
    fn __repr__(&self) -> String {
        format!(
            "IndexInfo(records={}, dimension={}, tables={}, bits={}, largest_bucket={}, memory={})",
            self.records,
            self.dimension,
            self.num_tables,
            self.num_bits,
            self.largest_bucket,
            self.estimated_memory_bytes
        )
    }
}

// ---------------------------------------------------------------------------
// VectorDB
// ---------------------------------------------------------------------------

/// LSH vector index with exact re-ranking.
///
///     db = VectorDB(512, 8, 16)
///     db.insert(1, vec)
///     db.query(vec, 10)        # approximate
///     db.exact_query(vec, 10)  # brute force
///     db.save("data/vectors.bin")
#[pyclass]
struct VectorDB {
    index: VectorIndex,
}

#[pymethods]
impl VectorDB {
    /// Create an empty index.
    ///
    /// Args:
    ///     dim: Vector dimension.
    ///     tables: Number of hash tables (default 8).
    ///     bits: Hyperplanes per table, 1–32 (default 16).
    ///     seed: Hyperplane seed (optional).
    #[new]
    #[pyo3(signature = (dim, tables=DEFAULT_NUM_TABLES, bits=DEFAULT_NUM_BITS, seed=None))]
    fn new(dim: usize, tables: usize, bits: usize, seed: Option<u64>) -> PyResult<Self> {
        let config = IndexConfig::new(dim, tables, bits).with_seed(seed.unwrap_or(DEFAULT_SEED));
        let index = VectorIndex::with_config(config).map_err(to_py_err)?;
        Ok(Self { index })
    }

    /// Open an index file, adopting the parameters stored in it.
    #[staticmethod]
    fn open(py: Python<'_>, path: String) -> PyResult<Self> {
        let index = py
            .allow_threads(move || VectorIndex::open(path))
            .map_err(to_py_err)?;
        Ok(Self { index })
    }

    /// Insert a vector. Raises ValueError on a wrong length or a reused id.
    fn insert(&self, py: Python<'_>, id: u64, vector: Vec<f32>) -> PyResult<()> {
        let index = self.index.clone();
        py.allow_threads(move || index.insert(id, vector))
            .map_err(to_py_err)
    }

    /// Return the stored vector for `id`. Raises KeyError if absent.
    fn get(&self, id: u64) -> PyResult<Vec<f32>> {
        self.index.get(id).map_err(to_py_err)
    }

    /// Approximate top-k ids (LSH candidates re-ranked by cosine distance).
    #[pyo3(signature = (vector, k=10))]
    fn query(&self, py: Python<'_>, vector: Vec<f32>, k: usize) -> PyResult<Vec<u64>> {
        let index = self.index.clone();
        py.allow_threads(move || index.query(&vector, k))
            .map_err(to_py_err)
    }

    /// Exact top-k ids by brute-force cosine distance.
    #[pyo3(signature = (vector, k=10))]
    fn exact_query(&self, py: Python<'_>, vector: Vec<f32>, k: usize) -> PyResult<Vec<u64>> {
        let index = self.index.clone();
        py.allow_threads(move || index.exact_query(&vector, k))
            .map_err(to_py_err)
    }

    /// Approximate top-k as a list of (id, distance) tuples.
    #[pyo3(signature = (vector, k=10))]
    fn query_scored(
        &self,
        py: Python<'_>,
        vector: Vec<f32>,
        k: usize,
    ) -> PyResult<Vec<(u64, f32)>> {
        let index = self.index.clone();
        let hits = py
            .allow_threads(move || index.query_scored(&vector, k))
            .map_err(to_py_err)?;
        Ok(hits.into_iter().map(|n| (n.id, n.distance)).collect())
    }

    /// Exact top-k as a list of (id, distance) tuples.
    #[pyo3(signature = (vector, k=10))]
    fn exact_query_scored(
        &self,
        py: Python<'_>,
        vector: Vec<f32>,
        k: usize,
    ) -> PyResult<Vec<(u64, f32)>> {
        let index = self.index.clone();
        let hits = py
            .allow_threads(move || index.exact_query_scored(&vector, k))
            .map_err(to_py_err)?;
        Ok(hits.into_iter().map(|n| (n.id, n.distance)).collect())
    }

    /// Return every record as a dict {id: vector}.
    fn get_all(&self) -> HashMap<u64, Vec<f32>> {
        self.index.get_all()
    }

    /// Save the index to a binary file.
    fn save(&self, py: Python<'_>, path: String) -> PyResult<()> {
        let index = self.index.clone();
        py.allow_threads(move || index.save(path))
            .map_err(to_py_err)
    }

    /// Replace the index contents with a file saved by `save`.
    fn load(&self, py: Python<'_>, path: String) -> PyResult<()> {
        let index = self.index.clone();
        py.allow_threads(move || index.load(path))
            .map_err(to_py_err)
    }

    /// Occupancy and memory statistics.
    fn stats(&self) -> IndexInfo {
        let s = self.index.stats();
        IndexInfo {
            records: s.records,
            dimension: s.dimension,
            num_tables: s.num_tables,
            num_bits: s.num_bits,
            occupied_buckets: s.occupied_buckets,
            largest_bucket: s.largest_bucket,
            estimated_memory_bytes: s.estimated_memory_bytes,
        }
    }

    #[getter]
    fn dim(&self) -> usize {
        self.index.dimension()
    }

    fn __len__(&self) -> usize {
        self.index.len()
    }

    fn __repr__(&self) -> String {
        let config = self.index.config();
        format!(
            "VectorDB(dim={}, tables={}, bits={}, records={})",
            config.dimension,
            config.num_tables,
            config.num_bits,
            self.index.len()
        )
    }
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

#[pymodule]
fn lsh_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<VectorDB>()?;
    m.add_class::<IndexInfo>()?;
    Ok(())
}
