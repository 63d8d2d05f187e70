//! # lshdb-core
//!
//! Embeddable in-memory vector index for visual-similarity search. Approximate
//! nearest-neighbor retrieval uses random-hyperplane locality-sensitive
//! hashing; candidates are re-ranked exactly by cosine distance. A linear-scan
//! exact search provides ground truth, and the full state persists to a single
//! checksummed binary file.
//!
//! The crate is synchronous throughout. Concurrency comes from a shared
//! read/write lock, so it embeds as-is in Rust services and behind the PyO3
//! binding in `crates/python`.
//!
//! ```no_run
//! use lshdb_core::VectorIndex;
//!
//! let index = VectorIndex::new(512, 8, 16)?;
//! index.insert(1, vec![0.1; 512])?;
//! let approx = index.query(&[0.1; 512], 10)?;
//! let exact = index.exact_query(&[0.1; 512], 10)?;
//! index.save("data/vectors.bin")?;
//! # let _ = (approx, exact);
//! # Ok::<(), lshdb_core::IndexError>(())
//! ```

/// Configuration constants and per-index parameters.
pub mod config;
/// Cosine distance kernels.
pub mod distance;
/// Error types.
pub mod error;
/// The thread-safe vector index.
pub mod index;
/// Random-hyperplane LSH: hasher and hash tables.
pub mod lsh;
/// Storage layer: exact record store and binary index files.
pub mod storage;

pub use config::IndexConfig;
pub use error::{IndexError, IndexResult};
pub use index::{IndexStats, VectorIndex};
pub use storage::Neighbor;
