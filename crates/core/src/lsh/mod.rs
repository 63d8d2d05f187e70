//! Random-hyperplane locality-sensitive hashing.
//!
//! Each of `num_tables` tables partitions space with `num_bits` random
//! hyperplanes. Vectors with a small angle between them agree on most sign
//! bits and tend to share a bucket in at least one table. Buckets only produce
//! candidates; ranking happens against the exact store.

/// Hyperplane generation and signature computation.
pub mod hasher;
/// Per-table bucket storage.
pub mod table;

pub use hasher::Hasher;
pub use table::HashTable;
